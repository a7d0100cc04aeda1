use std::fmt;

use crate::analysis::flows::{Flow, FlowPacket, Subset};

use super::{ConfigError, FeatureRow};

/// Small-sample policy for [`aggregate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatePolicy {
    /// Fewest values for min, max, sum and mean.
    pub min_sample: usize,
    /// Fewest values for the standard deviation; never below two.
    pub std_sample: usize,
    /// Value of any statistic whose sample is too small.
    pub default: f64,
}

impl Default for AggregatePolicy {
    fn default() -> Self {
        Self {
            min_sample: 1,
            std_sample: 2,
            default: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    pub std: f64,
}

impl Aggregate {
    fn filled(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value,
            mean: value,
            std: value,
        }
    }
}

/// Min, max, sum, mean and sample standard deviation of `values`.
///
/// ```
/// use flowmeter_core::features::{AggregatePolicy, aggregate};
///
/// let stats = aggregate(&[5.0], &AggregatePolicy::default());
/// assert_eq!((stats.min, stats.max, stats.sum, stats.mean), (5.0, 5.0, 5.0, 5.0));
/// assert_eq!(stats.std, 0.0);
/// ```
pub fn aggregate(values: &[f64], policy: &AggregatePolicy) -> Aggregate {
    let n = values.len();
    let mut stats = Aggregate::filled(policy.default);
    if n == 0 || n < policy.min_sample {
        return stats;
    }

    stats.min = values.iter().copied().fold(f64::INFINITY, f64::min);
    stats.max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    stats.sum = values.iter().sum();
    stats.mean = stats.sum / n as f64;

    if n >= policy.std_sample.max(2) {
        let squares: f64 = values.iter().map(|v| (v - stats.mean).powi(2)).sum();
        stats.std = (squares / (n - 1) as f64).sqrt();
    }
    stats
}

type PacketMeasure = Box<dyn Fn(&FlowPacket) -> f64 + Send + Sync>;
type ListMeasure = Box<dyn Fn(&[&FlowPacket]) -> Vec<f64> + Send + Sync>;

enum Measure {
    PerPacket(PacketMeasure),
    PerList(ListMeasure),
}

/// Aggregate statistics of one quantity over the forward, backward and
/// combined packets of a flow.
///
/// Writes `Fwd <base> Min` .. `Fwd <base> Std`, then the `Bwd` and `Flow`
/// groups.
pub struct DirectionalStat {
    base: String,
    measure: Measure,
    policy: AggregatePolicy,
    flow_sum: bool,
}

impl DirectionalStat {
    pub fn builder(base: impl Into<String>) -> DirectionalStatBuilder {
        DirectionalStatBuilder {
            base: base.into(),
            per_packet: None,
            per_list: None,
            policy: AggregatePolicy::default(),
            flow_sum: true,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn write(&self, flow: &Flow, row: &mut FeatureRow) {
        for subset in Subset::ALL {
            let packets = flow.subset(subset);
            let values = match &self.measure {
                Measure::PerPacket(measure) => packets.iter().map(|p| measure(p)).collect(),
                Measure::PerList(measure) => measure(&packets),
            };
            let stats = aggregate(&values, &self.policy);
            let prefix = format!("{} {}", subset.prefix(), self.base);
            row.insert(format!("{prefix} Min"), stats.min);
            row.insert(format!("{prefix} Max"), stats.max);
            if self.flow_sum || subset != Subset::Combined {
                row.insert(format!("{prefix} Sum"), stats.sum);
            }
            row.insert(format!("{prefix} Mean"), stats.mean);
            row.insert(format!("{prefix} Std"), stats.std);
        }
    }
}

impl fmt::Debug for DirectionalStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectionalStat")
            .field("base", &self.base)
            .field("policy", &self.policy)
            .field("flow_sum", &self.flow_sum)
            .finish_non_exhaustive()
    }
}

pub struct DirectionalStatBuilder {
    base: String,
    per_packet: Option<PacketMeasure>,
    per_list: Option<ListMeasure>,
    policy: AggregatePolicy,
    flow_sum: bool,
}

impl DirectionalStatBuilder {
    /// Measure each packet on its own.
    pub fn per_packet<F>(mut self, measure: F) -> Self
    where
        F: Fn(&FlowPacket) -> f64 + Send + Sync + 'static,
    {
        self.per_packet = Some(Box::new(measure));
        self
    }

    /// Derive the values from the whole packet list, e.g. pairwise deltas.
    pub fn per_list<F>(mut self, measure: F) -> Self
    where
        F: Fn(&[&FlowPacket]) -> Vec<f64> + Send + Sync + 'static,
    {
        self.per_list = Some(Box::new(measure));
        self
    }

    pub fn policy(mut self, policy: AggregatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drop the `Flow <base> Sum` column, for quantities where it equals
    /// the forward plus backward sums.
    pub fn without_flow_sum(mut self) -> Self {
        self.flow_sum = false;
        self
    }

    pub fn build(self) -> Result<DirectionalStat, ConfigError> {
        let measure = match (self.per_packet, self.per_list) {
            (Some(measure), None) => Measure::PerPacket(measure),
            (None, Some(measure)) => Measure::PerList(measure),
            (None, None) => return Err(ConfigError::MissingMeasure(self.base)),
            (Some(_), Some(_)) => return Err(ConfigError::AmbiguousMeasure(self.base)),
        };
        Ok(DirectionalStat {
            base: self.base,
            measure,
            policy: self.policy,
            flow_sum: self.flow_sum,
        })
    }
}

/// Per-direction count and rate of `base`, plus the forward/backward ratio.
///
/// Speeds are zero for a zero-length flow; the ratio is zero without
/// backward traffic.
pub fn count_and_rate<F>(row: &mut FeatureRow, flow: &Flow, base: &str, counter: F)
where
    F: Fn(&[&FlowPacket]) -> u64,
{
    let duration = flow.duration_secs();
    let mut counts = [0u64; 3];
    for (slot, subset) in counts.iter_mut().zip(Subset::ALL) {
        *slot = counter(&flow.subset(subset));
        let speed = if duration > 0.0 {
            *slot as f64 / duration
        } else {
            0.0
        };
        row.insert(format!("{} {base} Num", subset.prefix()), *slot as i64);
        row.insert(format!("{} {base} Speed", subset.prefix()), speed);
    }
    let [forward, backward, _] = counts;
    let ratio = if backward == 0 {
        0.0
    } else {
        forward as f64 / backward as f64
    };
    row.insert(format!("{base} Ratio"), ratio);
}
