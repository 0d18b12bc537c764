//! Processing Trace CLI Application
//!
//! Command-line front end of the proc-trace-core library:
//! - Loads state-change logs into an interval store on a writer thread
//! - Serves the time graph, statistics and value series views
//! - Prints them as text tables or JSON

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use proc_trace_core::{
    AnnotationProvider, ArrowProvider, EntityProvider, IntervalStore, ProcessingStatesProvider,
    ProcessingStatisticsProvider, ProcessingValuesProvider, ProgressMonitor, QueryParameters,
    RowProvider, SeriesKind, StatsConfig, StatsProvider, StyleRegistry, XyProvider,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

mod config;
mod ingest;
mod report;

use config::{AppConfig, OutputFormat};

/// Processing Trace - Inspect request/reply processing traces
#[derive(Parser, Debug)]
#[command(name = "proc-trace")]
#[command(
    about = "Reconstruct timelines, arrows and statistics from processing state logs",
    long_about = None
)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// State-change log file(s) in JSON-lines format (can be repeated)
    #[arg(short, long, value_name = "FILE")]
    input: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Output file for the report (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// First requested timestamp (default: trace start)
    #[arg(long, value_name = "T", allow_negative_numbers = true)]
    start: Option<i64>,

    /// Last requested timestamp (default: trace end)
    #[arg(long, value_name = "T", allow_negative_numbers = true)]
    end: Option<i64>,

    /// Number of requested timestamps between start and end
    #[arg(long, value_name = "N")]
    resolution: Option<usize>,

    /// Entity id to report on (can be repeated; default: all)
    #[arg(long = "select", value_name = "ID")]
    selected: Vec<i64>,

    /// Add the selection breakdown to the statistics tree
    #[arg(long)]
    filtered: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Entity hierarchy
    Tree,
    /// Timeline states of the selected entities
    Rows,
    /// Request/reply arrows
    Arrows,
    /// Hand-off annotations of the selected receivers
    Annotations,
    /// Statistics tree of the processed numbers
    Stats,
    /// Processed number series of the selected ids
    Series {
        /// One point per processing run instead of one value per timestamp
        #[arg(long)]
        scatter: bool,
    },
    /// Style table
    Styles,
}

/// Effective settings: command line flags over the config file
#[derive(Debug)]
struct Settings {
    inputs: Vec<PathBuf>,
    trace_name: String,
    start: Option<i64>,
    end: Option<i64>,
    resolution: usize,
    selected: Vec<i64>,
    filtered: bool,
    format: OutputFormat,
    output: Option<PathBuf>,
    wait_timeout: Duration,
}

impl Settings {
    fn resolve(args: &Args, config: AppConfig) -> Result<Self> {
        let inputs = if args.input.is_empty() {
            config.input.files
        } else {
            args.input.clone()
        };
        if inputs.is_empty() {
            bail!("No input given: use --input or set [input] files in the config file");
        }
        let trace_name = config.input.trace_name.unwrap_or_else(|| {
            inputs[0]
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "trace".to_string())
        });
        let resolution = args.resolution.unwrap_or(config.query.resolution);
        if resolution == 0 {
            bail!("Resolution must be at least 1");
        }
        let selected = if args.selected.is_empty() {
            config.query.selected
        } else {
            args.selected.clone()
        };
        Ok(Self {
            trace_name,
            start: args.start.or(config.query.start),
            end: args.end.or(config.query.end),
            resolution,
            selected,
            filtered: args.filtered || config.query.filtered,
            format: args.format.unwrap_or(config.output.format),
            output: args.output.clone().or(config.output.output_file),
            wait_timeout: Duration::from_millis(config.statistics.wait_timeout_ms),
            inputs,
        })
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Processing Trace CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using core library v{}", proc_trace_core::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    let settings = Settings::resolve(&args, config)?;
    log::debug!("Settings: {:?}", settings);

    let text = run(args.command, &settings)?;
    match &settings.output {
        Some(path) => {
            std::fs::write(path, text)?;
            log::info!("Report written to {:?}", path);
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// Load the inputs and render the report of `command`
fn run(command: Command, settings: &Settings) -> Result<String> {
    let trace = ingest::read_logs(settings.inputs.as_slice())?;
    let store = Arc::new(IntervalStore::new(settings.trace_name.clone(), trace.start_time()));

    // Detached: a slow writer must not hold back partial output
    let _writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || ingest::apply(&store, &trace))
    };
    if !store.wait_until_built(Some(settings.wait_timeout)) {
        if store.is_disposed() {
            // The writer logged the cause
            bail!("Input could not be loaded");
        }
        log::warn!(
            "Input not fully loaded after {:?}, reporting partial data up to {}",
            settings.wait_timeout,
            store.current_end_time()
        );
    }

    let start = settings.start.unwrap_or_else(|| store.start_time());
    let end = settings.end.unwrap_or_else(|| store.current_end_time());
    let mut params = QueryParameters::new()
        .with_time_range(start, end, settings.resolution)
        .with_filtered(settings.filtered);

    let styles = Arc::new(StyleRegistry::new());
    let states = ProcessingStatesProvider::new(Arc::clone(&store), styles);
    params = if settings.selected.is_empty() {
        let all: Vec<i64> = states
            .fetch_tree(&params)
            .model
            .map(|tree| {
                tree.entities
                    .into_iter()
                    .filter(|e| e.has_row_model)
                    .map(|e| e.id)
                    .collect()
            })
            .unwrap_or_default();
        params.with_selected_items(all)
    } else {
        params.with_selected_items(settings.selected.iter().copied())
    };

    let format = settings.format;
    let text = match command {
        Command::Tree => {
            report::render("Entities", &states.fetch_tree(&params), format, report::tree_txt)?
        }
        Command::Rows => {
            report::render("Rows", &states.fetch_rows(&params), format, report::rows_txt)?
        }
        Command::Arrows => {
            let arrows = states.fetch_arrows(&params);
            report::render("Arrows", &arrows, format, report::arrows_txt)?
        }
        Command::Annotations => report::render(
            "Annotations",
            &states.fetch_annotations(&params),
            format,
            report::annotations_txt,
        )?,
        Command::Stats => {
            let timeout_ms = settings.wait_timeout.as_millis() as u64;
            let config = StatsConfig::new().with_wait_timeout(timeout_ms);
            let provider = ProcessingStatisticsProvider::new(Arc::clone(&store), config);
            let monitor = ProgressMonitor::new();
            let tree = provider.fetch_statistics_tree(&params, &monitor);
            let stats = provider.fetch_statistics(&params, &monitor);
            match format {
                OutputFormat::Json => report::json_sections(vec![
                    ("tree", serde_json::to_value(&tree)?),
                    ("statistics", serde_json::to_value(&stats)?),
                ])?,
                OutputFormat::Txt => format!(
                    "{}\n{}",
                    report::render("Statistics", &tree, format, report::tree_txt)?,
                    report::render("Statistics by key", &stats, format, report::stats_txt)?
                ),
            }
        }
        Command::Series { scatter } => {
            let kind = if scatter {
                SeriesKind::Scatter
            } else {
                SeriesKind::Line
            };
            let provider = ProcessingValuesProvider::new(Arc::clone(&store), kind);
            let tree = provider.fetch_tree(&params);
            let series = provider.fetch_xy(&params);
            match format {
                OutputFormat::Json => report::json_sections(vec![
                    ("tree", serde_json::to_value(&tree)?),
                    ("series", serde_json::to_value(&series)?),
                ])?,
                OutputFormat::Txt => format!(
                    "{}\n{}",
                    report::render("Series tree", &tree, format, report::tree_txt)?,
                    report::render("Series", &series, format, report::series_txt)?
                ),
            }
        }
        Command::Styles => {
            report::render("Styles", &states.fetch_styles(), format, report::styles_txt)?
        }
    };
    Ok(text)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
