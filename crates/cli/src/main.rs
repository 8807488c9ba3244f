//! sinf - semantic influence batch driver
//!
//! Reads edge and attribute tables from CSV, runs the influence pipeline and
//! writes the augmented edge table, node summaries or retention statistics
//! back to CSV.

mod tables;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use sinf_common::{
    config::AppConfig,
    errors::InfluenceError,
    metrics::{self, STAGE_BUCKETS},
    telemetry,
};
use sinf_engine::{AugmentedEdgeTable, InfluencePipeline, NodeId, PipelineOutput};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "sinf", version, about = "Semantic influence between actors of a dynamic graph")]
struct Cli {
    /// Configuration file (defaults to config/default, config/{SINF_ENV}, config/local)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of parallel workers (overrides engine.n_workers)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Write the JSON run report here
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Write Prometheus text exposition here at exit
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute edge influence
    Edges {
        #[arg(long)]
        edges: PathBuf,
        #[arg(long)]
        attributes: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Aggregate an augmented edge table into node summaries
    Nodes {
        /// Edge table with an influence column
        #[arg(long)]
        edges: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Also compute peak count and standard deviation
        #[arg(long)]
        stats: bool,
    },
    /// Edge influence followed by node aggregation
    Run {
        #[arg(long)]
        edges: PathBuf,
        #[arg(long)]
        attributes: PathBuf,
        #[arg(long)]
        edges_out: PathBuf,
        #[arg(long)]
        nodes_out: PathBuf,
        #[arg(long)]
        stats: bool,
    },
    /// Retention transfer of selected nodes
    Retention {
        #[arg(long)]
        edges: PathBuf,
        #[arg(long)]
        attributes: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Node ids to report (default: every edge endpoint)
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<String>,
    },
}

fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sinf: {}", e);
            return ExitCode::from(e.code().exit_code() as u8);
        }
    };

    telemetry::init_tracing(&config.observability);
    info!("Starting sinf v{}", sinf_common::VERSION);

    let recorder = install_metrics();

    let result = execute(&cli, config);

    if let (Some(path), Some(handle)) = (&cli.metrics_out, &recorder) {
        if let Err(e) = std::fs::write(path, handle.render()) {
            warn!(error = %e, path = %path.display(), "Failed to write metrics");
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Run failed");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn load_config(cli: &Cli) -> sinf_common::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(&path.to_string_lossy())?,
        None => AppConfig::load()?,
    };
    if let Some(workers) = cli.workers {
        config.engine.n_workers = Some(workers);
    }
    config.checked()
}

fn install_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), STAGE_BUCKETS)
        .and_then(|builder| builder.install_recorder());

    match handle {
        Ok(handle) => {
            metrics::register_metrics();
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Metrics recorder not installed");
            None
        }
    }
}

fn execute(cli: &Cli, mut config: AppConfig) -> anyhow::Result<()> {
    match &cli.command {
        Command::Edges {
            edges,
            attributes,
            output,
        } => {
            let pipeline = InfluencePipeline::new(config)?;
            let inputs = pipeline.load_tables(
                &tables::read_table(edges, "edge")?,
                &tables::read_table(attributes, "attribute")?,
            )?;
            let out = pipeline.score_edges(&inputs)?;
            if let Some(scored) = &out.edges {
                tables::write_edges(output, scored, &pipeline.config().columns)?;
            }
            finish(cli, &out)
        }
        Command::Nodes { edges, output, stats } => {
            config.engine.compute_stats |= *stats;
            let pipeline = InfluencePipeline::new(config)?;
            let augmented = AugmentedEdgeTable::from_raw(
                &tables::read_table(edges, "augmented edge")?,
                &pipeline.config().columns,
            )?;
            let out = pipeline.aggregate_nodes(&augmented)?;
            if let Some(nodes) = &out.nodes {
                tables::write_nodes(output, nodes)?;
            }
            finish(cli, &out)
        }
        Command::Run {
            edges,
            attributes,
            edges_out,
            nodes_out,
            stats,
        } => {
            config.engine.compute_stats |= *stats;
            let pipeline = InfluencePipeline::new(config)?;
            let inputs = pipeline.load_tables(
                &tables::read_table(edges, "edge")?,
                &tables::read_table(attributes, "attribute")?,
            )?;
            let out = pipeline.run(&inputs)?;
            if let Some(scored) = &out.edges {
                tables::write_edges(edges_out, scored, &pipeline.config().columns)?;
            }
            if let Some(nodes) = &out.nodes {
                tables::write_nodes(nodes_out, nodes)?;
            }
            finish(cli, &out)
        }
        Command::Retention {
            edges,
            attributes,
            output,
            nodes,
        } => {
            let pipeline = InfluencePipeline::new(config)?;
            let inputs = pipeline.load_tables(
                &tables::read_table(edges, "edge")?,
                &tables::read_table(attributes, "attribute")?,
            )?;
            let selection = if nodes.is_empty() {
                None
            } else {
                Some(nodes.iter().map(|n| NodeId::parse(n)).collect())
            };
            let out = pipeline.retention(&inputs, selection)?;
            if let Some(rows) = &out.retention {
                tables::write_retention(output, rows)?;
            }
            finish(cli, &out)
        }
    }
}

fn finish(cli: &Cli, out: &PipelineOutput) -> anyhow::Result<()> {
    info!(
        run_id = %out.report.run_id,
        command = %out.report.command,
        elapsed_secs = out.report.elapsed_secs,
        "Done"
    );
    if let Some(path) = &cli.report {
        write_report(path, out)?;
    }
    Ok(())
}

fn write_report(path: &Path, out: &PipelineOutput) -> anyhow::Result<()> {
    tables::write_report(path, &out.report)
        .with_context(|| format!("writing run report to {}", path.display()))
}

/// Exit code of the engine error behind `err`, or 1
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<InfluenceError>())
        .map(|e| e.code().exit_code() as u8)
        .unwrap_or(1)
}
