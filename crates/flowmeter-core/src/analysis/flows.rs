use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use time::{OffsetDateTime, UtcOffset};
use time::macros::format_description;
use tracing::{debug, trace};

use crate::config::FlowTimeouts;
use crate::packet::{Direction, PacketRecord};

use super::session::{SessionKey, SessionKeyInfo};

/// A packet admitted to a flow, tagged with its direction in that flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowPacket {
    pub record: PacketRecord,
    pub direction: Direction,
    /// Capture timestamp in microseconds.
    pub timestamp: i64,
}

impl FlowPacket {
    pub fn new(record: PacketRecord, direction: Direction) -> Self {
        let timestamp = record.timestamp_micros();
        Self {
            record,
            direction,
            timestamp,
        }
    }
}

/// Which packets of a flow a statistic is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Forward,
    Backward,
    Combined,
}

impl Subset {
    pub const ALL: [Subset; 3] = [Subset::Forward, Subset::Backward, Subset::Combined];

    /// Column prefix for statistics over this subset.
    pub fn prefix(self) -> &'static str {
        match self {
            Subset::Forward => "Fwd",
            Subset::Backward => "Bwd",
            Subset::Combined => "Flow",
        }
    }
}

/// Time-bounded run of packets from one session.
///
/// Timestamps are in microseconds. Packets are kept in arrival order; the
/// forward and backward views index into the combined list.
#[derive(Debug, Clone)]
pub struct Flow {
    session_key: SessionKey,
    info: SessionKeyInfo,
    initial_timestamp: i64,
    last_timestamp: i64,
    packets: Vec<FlowPacket>,
    forward: Vec<usize>,
    backward: Vec<usize>,
    /// Manually assigned label; empty until something sets it.
    pub label: String,
}

impl Flow {
    pub fn new(session_key: SessionKey) -> Self {
        let info = session_key.info();
        Self {
            session_key,
            info,
            initial_timestamp: 0,
            last_timestamp: 0,
            packets: Vec::new(),
            forward: Vec::new(),
            backward: Vec::new(),
            label: String::new(),
        }
    }

    pub fn with_packet(session_key: SessionKey, packet: FlowPacket) -> Self {
        let mut flow = Self::new(session_key);
        flow.initial_timestamp = packet.timestamp;
        flow.last_timestamp = packet.timestamp;
        flow.push(packet);
        flow
    }

    /// Offer a packet to the flow.
    ///
    /// The packet is handed back when it falls outside the flow's timeouts
    /// or precedes the flow's first packet; the flow is then complete.
    pub fn admit(&mut self, packet: FlowPacket, timeouts: &FlowTimeouts) -> Result<(), FlowPacket> {
        if self.is_empty() {
            self.initial_timestamp = packet.timestamp;
            self.last_timestamp = packet.timestamp;
            self.push(packet);
            return Ok(());
        }
        if self.timed_out(packet.timestamp, timeouts) {
            return Err(packet);
        }
        self.last_timestamp = self.last_timestamp.max(packet.timestamp);
        self.push(packet);
        Ok(())
    }

    fn timed_out(&self, timestamp: i64, timeouts: &FlowTimeouts) -> bool {
        let since_start = timestamp - self.initial_timestamp;
        if since_start < 0 || since_start > timeouts.flow_timeout_us {
            return true;
        }
        timeouts.track_activity && timestamp - self.last_timestamp > timeouts.activity_timeout_us
    }

    fn push(&mut self, packet: FlowPacket) {
        let index = self.packets.len();
        match packet.direction {
            Direction::Forward => self.forward.push(index),
            Direction::Backward => self.backward.push(index),
        }
        self.packets.push(packet);
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub fn info(&self) -> &SessionKeyInfo {
        &self.info
    }

    pub fn protocol(&self) -> &str {
        &self.info.protocol
    }

    pub fn initial_timestamp(&self) -> i64 {
        self.initial_timestamp
    }

    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp
    }

    /// Duration in microseconds.
    pub fn duration(&self) -> i64 {
        self.last_timestamp - self.initial_timestamp
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration() as f64 / 1_000_000.0
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn packets(&self) -> &[FlowPacket] {
        &self.packets
    }

    pub fn forward(&self) -> impl Iterator<Item = &FlowPacket> + '_ {
        self.forward.iter().map(|&index| &self.packets[index])
    }

    pub fn backward(&self) -> impl Iterator<Item = &FlowPacket> + '_ {
        self.backward.iter().map(|&index| &self.packets[index])
    }

    pub fn subset(&self, subset: Subset) -> Vec<&FlowPacket> {
        match subset {
            Subset::Forward => self.forward().collect(),
            Subset::Backward => self.backward().collect(),
            Subset::Combined => self.packets.iter().collect(),
        }
    }

    /// Ordering by start time only.
    pub fn cmp_by_start(&self, other: &Flow) -> Ordering {
        self.initial_timestamp.cmp(&other.initial_timestamp)
    }

    pub fn readable_initial_timestamp(&self, offset: UtcOffset) -> Result<String, time::Error> {
        format_micros(self.initial_timestamp, offset)
    }

    pub fn readable_last_timestamp(&self, offset: UtcOffset) -> Result<String, time::Error> {
        format_micros(self.last_timestamp, offset)
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packets {} {}:{} -> {}:{} [{}, {}]",
            self.len(),
            self.info.protocol,
            self.info.src_ip,
            self.info.src_port,
            self.info.dst_ip,
            self.info.dst_port,
            self.initial_timestamp,
            self.last_timestamp
        )
    }
}

/// Format a microsecond timestamp as `YYYY-MM-DD HH:MM:SS.ffffff` in the
/// wall-clock time of `offset`.
pub fn format_micros(micros: i64, offset: UtcOffset) -> Result<String, time::Error> {
    let format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)?
        .to_offset(offset);
    Ok(datetime.format(&format)?)
}

/// Splits per-session packet streams into flows.
///
/// Holds at most one alive flow per session key. Packets are expected in
/// non-decreasing timestamp order within a session; a packet older than its
/// alive flow's first packet closes that flow and starts a new one.
#[derive(Debug)]
pub struct FlowSegmenter {
    timeouts: FlowTimeouts,
    alive: IndexMap<SessionKey, Flow>,
    completed: Vec<Flow>,
}

impl FlowSegmenter {
    pub fn new(timeouts: FlowTimeouts) -> Self {
        Self {
            timeouts,
            alive: IndexMap::new(),
            completed: Vec::new(),
        }
    }

    pub fn push(&mut self, key: SessionKey, packet: FlowPacket) {
        let Some(flow) = self.alive.get_mut(&key) else {
            trace!(session = %key, "new session");
            let flow = Flow::with_packet(key.clone(), packet);
            self.alive.insert(key, flow);
            return;
        };
        if let Err(packet) = flow.admit(packet, &self.timeouts) {
            let next = Flow::with_packet(key, packet);
            let done = std::mem::replace(flow, next);
            debug!(flow = %done, "flow timed out");
            self.completed.push(done);
        }
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Flush every alive flow and return all flows sorted by start time.
    ///
    /// The sort is stable: flows starting at the same microsecond keep their
    /// emission order, and alive flows flush in session first-seen order.
    pub fn finish(self) -> Vec<Flow> {
        let mut flows = self.completed;
        flows.extend(self.alive.into_values());
        flows.sort_by(Flow::cmp_by_start);
        flows
    }
}
