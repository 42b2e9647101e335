use std::panic;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{BenchmarkPlan, Layout};
use crate::constants::DEFAULT_REPORT_METRICS;
use crate::core::metrics::Metric;
use crate::core::pipeline::{
    analysis::{self, Selection},
    planning, processing,
    scheduling::{self, ScheduleError, Scheduler, SchedulerOptions, Shard},
};
use crate::core::snapshot::ResultsSnapshot;
use crate::core::traits::store::ResultStore;
use crate::native::{
    catalog::FsInstanceCatalog,
    invocation::DriverInvocation,
    solver::ProcessSolver,
    store::{FsRecordSink, FsResultStore},
};

mod config;
mod constants;
mod core;
mod native;
#[cfg(test)]
mod stubs;

#[derive(Debug, Parser)]
#[command(name = "benchrunner", version, about = "Solver benchmark campaigns", long_about = None)]
struct Cli {
    /// Campaign directory holding instances/, results/ and derived outputs
    #[arg(long, global = true, env = "BENCHRUNNER_ROOT", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute the stages of a benchmark plan
    Run(RunArgs),
    /// Write one metrics record per stored run into processed_results/
    Process,
    /// Write one CSV report per suite into analysis/
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Plan file (JSON)
    #[arg(long)]
    plan: PathBuf,

    /// Only run the runs whose position modulo --shard-count equals this index
    #[arg(long, requires = "shard_count")]
    shard_index: Option<usize>,

    #[arg(long, requires = "shard_index")]
    shard_count: Option<usize>,

    /// Maximum number of runs per stage
    #[arg(long)]
    limit: Option<usize>,

    /// Overrides the plan's parallelism
    #[arg(long)]
    parallelism: Option<usize>,

    /// Re-execute runs that already have stored output
    #[arg(long)]
    no_prune: bool,

    /// Refresh processed_results/ after every stage
    #[arg(long)]
    process_between_stages: bool,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Keep configurations whose grouping key contains this text
    #[arg(long)]
    include: Vec<String>,

    /// Drop configurations whose grouping key contains this text
    #[arg(long)]
    exclude: Vec<String>,

    /// Metrics reported per configuration
    #[arg(long = "metric", value_delimiter = ',', default_value = DEFAULT_REPORT_METRICS)]
    metrics: Vec<Metric>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let layout = Layout::new(&cli.root);

    match cli.command {
        Command::Run(args) => run(&layout, args).await?,
        Command::Process => {
            processing::process_results(
                &FsResultStore::new(layout.results()),
                &FsRecordSink::new(layout.processed_results()),
            )
            .await?;
        }
        Command::Analyze(args) => {
            let selection = Selection {
                include: args.include,
                exclude: args.exclude,
            };
            let reports = analysis::analyze(
                &FsInstanceCatalog::new(layout.instances()),
                &FsResultStore::new(layout.results()),
                &selection,
                &args.metrics,
                &layout.analysis(),
            )
            .await?;
            tracing::info!("Wrote {} reports", reports.len());
        }
    }

    Ok(())
}

/// Executes the stages of the plan one after another. Every stage plans
/// against the results stored before it started.
#[tracing::instrument(skip(layout))]
async fn run(layout: &Layout, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let plan = BenchmarkPlan::load(&args.plan).await?;
    let shard = match (args.shard_index, args.shard_count) {
        (Some(index), Some(count)) => {
            Some(Shard::new(index, count).ok_or("--shard-index must be below --shard-count")?)
        }
        _ => None,
    };
    layout.empty_trash().await?;

    let store = Arc::new(FsResultStore::new(layout.results()));
    let sink = FsRecordSink::new(layout.processed_results());
    let catalog = FsInstanceCatalog::new(layout.instances());
    let scheduler = Scheduler::new(
        Arc::new(ProcessSolver::new(layout.root())),
        store.clone(),
        Arc::new(DriverInvocation::new(plan.solver.clone(), layout)),
        SchedulerOptions {
            parallelism: args.parallelism.unwrap_or(plan.parallelism),
            prune: plan.prune && !args.no_prune,
        },
    );

    for stage in &plan.stages {
        let configurations = stage.configurations();
        tracing::info!(
            "Stage {}: {} configurations",
            stage.name,
            configurations.len()
        );
        for configuration in &configurations {
            store.ensure_configuration(configuration).await?;
        }

        let snapshot = ResultsSnapshot::load(store.as_ref()).await?;
        let batch = planning::plan(&configurations, &catalog, &snapshot, &plan.dependencies)?;
        let runs = scheduling::select(batch.runs, shard, args.limit);

        tokio::select! {
            summary = scheduler.run_batch(runs) => {
                summary?;
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::warn!("Ctrl-C received, abandoning stage {}", stage.name);
                return Err(ScheduleError::Interrupted {
                    run: format!("stage {}", stage.name),
                }
                .into());
            }
        }

        if args.process_between_stages {
            processing::process_results(store.as_ref(), &sink).await?;
        }
    }

    Ok(())
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
