use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use flowmeter_core::{
    AttackRecord, ExtractorKind, ExtractorRegistry, FeatureTable, FlowTimeouts,
    MeterConfig, MeterError, SessionDirection,
};
use glob::glob;
use serde::Serialize;
use time::UtcOffset;
use time::macros::format_description;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("FLOWMETER_BUILD_COMMIT"),
    " ",
    env!("FLOWMETER_BUILD_DATE"),
    ")"
);

const EXAMPLES: &str = "Examples:\n  flowmeter pcap extract capture.pcapng -o flows.csv\n  flowmeter pcap extract capture.pcap --labels attacks.json --format json --stdout\n  flowmeter extractors";

#[derive(Parser, Debug)]
#[command(name = "flowmeter")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Per-flow feature extraction for network captures.",
    long_about = None,
    after_help = EXAMPLES
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operations on PCAP/PCAPNG inputs.
    Pcap {
        #[command(subcommand)]
        command: PcapCommands,
    },
    /// List the built-in feature extractors and their columns.
    Extractors {
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PcapCommands {
    /// Segment a capture into flows and write one feature row per flow.
    #[command(after_help = EXAMPLES)]
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Path (or glob matching one file) to a .pcap or .pcapng capture
    input: PathBuf,

    /// Output table path
    #[arg(short = 'o', long, required_unless_present = "stdout")]
    output: Option<PathBuf>,

    /// Write the table to stdout
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// Output table format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// JSON run configuration; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Treat the two directions of an exchange as separate sessions
    #[arg(long)]
    unidirectional: bool,

    /// Maximum flow lifetime in microseconds
    #[arg(long, value_name = "US")]
    flow_timeout: Option<i64>,

    /// Also close flows after an inactivity gap
    #[arg(long)]
    track_activity: bool,

    /// Inactivity gap in microseconds (implies --track-activity)
    #[arg(long, value_name = "US")]
    activity_timeout: Option<i64>,

    /// JSON attack records used to fill the Label column
    #[arg(long, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Label for flows no attack record matches
    #[arg(long, value_name = "TEXT")]
    default_label: Option<String>,

    /// Capture-local UTC offset for readable timestamps and label windows
    #[arg(long, value_name = "+HH:MM", value_parser = parse_utc_offset, allow_hyphen_values = true)]
    utc_offset: Option<i32>,

    /// Skip a built-in extractor (repeatable)
    #[arg(long, value_name = "EXTRACTOR")]
    disable: Vec<ExtractorKind>,

    /// Suppress non-error output
    #[arg(long, conflicts_with = "verbose")]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Pcap { command } => match command {
            PcapCommands::Extract(args) => {
                init_logging(args.quiet, args.verbose);
                cmd_pcap_extract(args)
            }
        },
        Commands::Extractors { json } => {
            init_logging(false, 0);
            cmd_extractors(json)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

impl From<MeterError> for CliError {
    fn from(err: MeterError) -> Self {
        match err {
            MeterError::EmptyInput => CliError::new(
                "no flows were produced",
                Some("the capture holds no packets".to_string()),
            ),
            MeterError::Labels(err) => CliError::new(
                format!("invalid attack records: {err}"),
                Some("check the times and patterns in the --labels file".to_string()),
            ),
            other => CliError::new(format!("feature extraction failed: {other}"), None),
        }
    }
}

fn cmd_pcap_extract(args: ExtractArgs) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&args.input)?;
    validate_input_file(&resolved_input)?;
    let input_abs = fs::canonicalize(&resolved_input)
        .with_context(|| format!("Failed to resolve input path: {}", resolved_input.display()))?;

    let output = if args.stdout {
        None
    } else {
        let output = args.output.clone().ok_or_else(|| {
            CliError::new(
                "missing output path",
                Some("use -o/--output or --stdout".to_string()),
            )
        })?;
        ensure_distinct_output(&output, &input_abs)?;
        Some(output)
    };

    if args.pretty && args.format != OutputFormat::Json {
        return Err(CliError::new(
            "--pretty only applies to JSON output",
            Some("add --format json".to_string()),
        ));
    }

    let config = build_config(&args)?;
    let attacks = args.labels.as_deref().map(load_attack_records).transpose()?;
    debug!(?config, "run configuration");

    let table = flowmeter_core::extract_pcap_file(&resolved_input, &config, attacks.as_deref())?;
    info!(
        flows = table.rows.len(),
        columns = table.columns.len(),
        "feature table ready"
    );

    let rendered = render_table(&table, args.format, args.pretty)?;
    let Some(output) = output else {
        io::stdout()
            .write_all(&rendered)
            .context("Failed to write to stdout")?;
        return Ok(());
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    fs::write(&output, rendered)
        .with_context(|| format!("Failed to write table: {}", output.display()))?;

    if !args.quiet {
        eprintln!(
            "OK: {} flows written -> {}",
            table.rows.len(),
            output.display()
        );
    }
    Ok(())
}

fn ensure_distinct_output(output: &Path, input_abs: &Path) -> Result<(), CliError> {
    let parent = match output.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => return Ok(()),
    };
    // A directory that does not exist yet cannot hold the input.
    if !parent.exists() {
        return Ok(());
    }
    let output_dir = fs::canonicalize(parent)
        .with_context(|| format!("Failed to resolve output path: {}", output.display()))?;
    let target = output_dir.join(
        output
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid output path"))?,
    );
    if target == input_abs {
        return Err(CliError::new(
            format!("output path must differ from input: {}", output.display()),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

fn build_config(args: &ExtractArgs) -> Result<MeterConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str::<MeterConfig>(&text).map_err(|err| {
                CliError::new(
                    format!("invalid config file {}: {err}", path.display()),
                    Some("expected a JSON object such as {\"direction\": \"unidirectional\"}".to_string()),
                )
            })?
        }
        None => MeterConfig::default(),
    };

    if args.unidirectional {
        config.direction = SessionDirection::Unidirectional;
    }
    let FlowTimeouts {
        flow_timeout_us,
        activity_timeout_us,
        track_activity,
    } = config.timeouts;
    config.timeouts = FlowTimeouts {
        flow_timeout_us: args.flow_timeout.unwrap_or(flow_timeout_us),
        activity_timeout_us: args.activity_timeout.unwrap_or(activity_timeout_us),
        track_activity: track_activity || args.track_activity || args.activity_timeout.is_some(),
    };
    if config.timeouts.flow_timeout_us <= 0 || config.timeouts.activity_timeout_us <= 0 {
        return Err(CliError::new(
            "timeouts must be positive",
            Some("pass microseconds, e.g. --flow-timeout 5000000".to_string()),
        ));
    }
    if let Some(label) = &args.default_label {
        config.default_label = label.clone();
    }
    if let Some(offset) = args.utc_offset {
        config.utc_offset_secs = offset;
    }
    config.extractors.retain(|kind| !args.disable.contains(kind));
    if config.extractors.is_empty() {
        return Err(CliError::new(
            "every extractor is disabled",
            Some("run `flowmeter extractors` to see what is available".to_string()),
        ));
    }
    Ok(config)
}

fn parse_utc_offset(value: &str) -> Result<i32, String> {
    let format = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
    UtcOffset::parse(value, format)
        .map(UtcOffset::whole_seconds)
        .map_err(|err| format!("expected an offset such as +02:00 or -05:30 ({err})"))
}

fn load_attack_records(path: &Path) -> Result<Vec<AttackRecord>, CliError> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read attack records: {}", path.display()))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            format!("invalid attack records in {}: {err}", path.display()),
            Some("expected a JSON array of records with direction, protocol, src_ip, dst_ip, start_ts, end_ts, label and port_list".to_string()),
        )
    })
}

fn render_table(table: &FeatureTable, format: OutputFormat, pretty: bool) -> Result<Vec<u8>, CliError> {
    match format {
        OutputFormat::Json => {
            let json = if pretty {
                serde_json::to_vec_pretty(table)
            } else {
                serde_json::to_vec(table)
            };
            json.context("JSON serialization failed").map_err(Into::into)
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer
                .write_record(&table.columns)
                .context("CSV serialization failed")?;
            for record in table.text_rows() {
                writer
                    .write_record(&record)
                    .context("CSV serialization failed")?;
            }
            writer
                .into_inner()
                .map_err(|err| anyhow::anyhow!("CSV serialization failed: {}", err.error()))
                .map_err(Into::into)
        }
    }
}

#[derive(Debug, Serialize)]
struct ExtractorListing<'a> {
    name: &'a str,
    columns: &'a [String],
}

fn cmd_extractors(json: bool) -> Result<(), CliError> {
    let config = MeterConfig::default();
    let registry = ExtractorRegistry::from_config(&config, None)
        .context("Failed to build the extractor registry")?;
    let listing = ExtractorKind::ALL
        .iter()
        .filter_map(|kind| {
            registry
                .columns_of(kind.name())
                .map(|columns| ExtractorListing {
                    name: kind.name(),
                    columns,
                })
        })
        .collect::<Vec<_>>();

    if json {
        let text = serde_json::to_string_pretty(&listing).context("JSON serialization failed")?;
        println!("{text}");
        return Ok(());
    }
    for (index, entry) in listing.iter().enumerate() {
        println!("{}. {}:", index + 1, entry.name);
        println!("    {}", entry.columns.join("; "));
    }
    Ok(())
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "pcap" && ext != "pcapng" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .pcap or .pcapng file".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    let mut matches = Vec::new();
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern; expected .pcap or .pcapng".to_string()),
        )),
        1 => Ok(matches.remove(0)),
        count => {
            let listed = matches
                .iter()
                .take(3)
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let more = if count > 3 { ", ..." } else { "" };
            Err(CliError::new(
                format!("multiple files match pattern '{pattern}' ({count} matches); matches: {listed}{more}"),
                Some("pass a single capture file, or run once per file".to_string()),
            ))
        }
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
