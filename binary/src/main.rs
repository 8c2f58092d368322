//! `dcr` - mine, simplify and check DCR graphs
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dcr_mining::conformance::ComparerOptions;
use dcr_mining::core::process_models::dcr::xml::export_dcr_result_xml;
use dcr_mining::{
    create_nests, discover_dcr_graph, remove_redundancy, verify_reduction,
    ContradictionMinerOptions, DcrGraph, Exportable, Importable, Log, QualityMeasures,
    RedundancyOptions, ViolationThreshold,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dcr")]
#[command(about = "Mine, simplify and check DCR graphs")]
#[command(version)]
struct Cli {
    /// Log debug output (overridden by `RUST_LOG`)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine a graph from an event log (.xes, .xes.gz or .json)
    Mine {
        /// Path to the event log
        #[arg(long)]
        log: PathBuf,

        /// Tolerated violating traces per relation (fraction of all traces)
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,

        /// Interpret the threshold as an absolute number of traces
        #[arg(long)]
        absolute: bool,

        /// Minimal number of activities per nest
        #[arg(long, default_value_t = 2)]
        min_nest_size: usize,

        /// Skip redundancy removal and nesting
        #[arg(long)]
        no_reduce: bool,

        /// Output path (.xml or .json); result XML is printed if omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Remove redundant relations and activities from a graph (.xml or .json)
    Reduce {
        /// Path to the graph
        #[arg(long)]
        graph: PathBuf,

        /// Check the reduced graph against the input up to this trace length
        #[arg(long)]
        verify_depth: Option<usize>,

        /// Output path (.xml or .json); result XML is printed if omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Compute fitness, precision and simplicity of a graph on a log
    Measure {
        /// Path to the graph
        #[arg(long)]
        graph: PathBuf,

        /// Path to the event log
        #[arg(long)]
        log: PathBuf,
    },

    /// Replay a trace on a graph
    Replay {
        /// Path to the graph
        #[arg(long)]
        graph: PathBuf,

        /// Comma separated activity identifiers
        #[arg(long, value_delimiter = ',')]
        trace: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Mine {
            log,
            threshold,
            absolute,
            min_nest_size,
            no_reduce,
            out,
        } => {
            let threshold = if absolute {
                ViolationThreshold::Absolute(threshold.max(0.0).round() as u64)
            } else {
                ViolationThreshold::Fraction(threshold)
            };
            mine(&log, threshold, min_nest_size, no_reduce, out.as_deref())
        }
        Commands::Reduce {
            graph,
            verify_depth,
            out,
        } => reduce(&graph, verify_depth, out.as_deref()),
        Commands::Measure { graph, log } => {
            let graph = import_graph(&graph)?;
            let log = import_log(&log)?;
            println!("{}", QualityMeasures::compute(&graph, &log).to_json());
            Ok(())
        }
        Commands::Replay { graph, trace } => {
            let graph = import_graph(&graph)?;
            let result = graph.replay(&trace);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

fn import_graph(path: &Path) -> Result<DcrGraph> {
    DcrGraph::import_from_path(path)
        .with_context(|| format!("Failed to import graph from {}", path.display()))
}

fn import_log(path: &Path) -> Result<Log> {
    Log::import_from_path(path)
        .with_context(|| format!("Failed to import log from {}", path.display()))
}

fn mine(
    log_path: &Path,
    threshold: ViolationThreshold,
    min_nest_size: usize,
    no_reduce: bool,
    out: Option<&Path>,
) -> Result<()> {
    let log = import_log(log_path)?;
    let options = ContradictionMinerOptions::with_threshold(threshold);
    let mined = discover_dcr_graph(&log, &options).context("Mining failed")?;
    let graph = if no_reduce {
        mined.graph
    } else {
        let (reduced, _) = remove_redundancy(&mined.graph, &RedundancyOptions::default())?;
        create_nests(&reduced, min_nest_size)?.0
    };
    let measures = QualityMeasures::compute(&graph, &log);
    write_output(&graph, &measures, out)
}

fn reduce(graph_path: &Path, verify_depth: Option<usize>, out: Option<&Path>) -> Result<()> {
    let graph = import_graph(graph_path)?;
    let options = RedundancyOptions::default();
    let (reduced, report) = match verify_depth {
        Some(max_depth) => {
            let comparer = ComparerOptions {
                max_depth,
                ..Default::default()
            };
            verify_reduction(&graph, &options, &comparer)?
        }
        None => remove_redundancy(&graph, &options)?,
    };
    for application in &report.applications {
        tracing::debug!(rule = %application.rule, relation = ?application.removed_relation, activity = ?application.removed_activity, "Applied rule");
    }
    write_output(&reduced, &QualityMeasures::simplicity_only(&reduced), out)
}

fn write_output(graph: &DcrGraph, measures: &QualityMeasures, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            graph
                .export_to_path(path)
                .with_context(|| format!("Failed to write graph to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote graph");
            println!("{}", measures.to_json());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            export_dcr_result_xml(graph, measures, &mut stdout)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}
