use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use nodegroup_guard::config::GuardConfig;
use nodegroup_guard::dry_run::DryRunAnalyzer;
use nodegroup_guard::fleet::{
    CachedImageResolver, CachedMetrics, ControlPlane, DataSource, FleetSnapshot, KubeControlPlane,
};
use nodegroup_guard::health::{Decision, HealthChecker};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "NODEGROUP_GUARD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(
        long,
        env = "NODEGROUP_GUARD_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text,
        global = true
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pre-flight health checks; exits non-zero on BLOCK
    Check(CheckArgs),
    /// Show what a rolling update would do to each node group
    DryRun(DryRunArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Cluster name
    #[arg(long, env = "NODEGROUP_GUARD_CLUSTER")]
    cluster: String,

    /// Fleet snapshot (YAML or JSON)
    #[arg(long, env = "NODEGROUP_GUARD_SNAPSHOT")]
    snapshot: PathBuf,

    /// Skip Kubernetes API checks
    #[arg(long)]
    no_kube: bool,

    /// Print the Prometheus text exposition after the summary
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics: bool,
}

#[derive(Parser, Debug)]
struct DryRunArgs {
    /// Cluster name
    #[arg(long, env = "NODEGROUP_GUARD_CLUSTER")]
    cluster: String,

    /// Fleet snapshot (YAML or JSON)
    #[arg(long, env = "NODEGROUP_GUARD_SNAPSHOT")]
    snapshot: PathBuf,

    /// Update even groups already on the latest image
    #[arg(long)]
    force: bool,

    /// Node groups to analyze; all groups when omitted
    nodegroups: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Commands::Version = args.command {
        println!("nodegroup-guard v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_tracing(args.log_format);
    let config = GuardConfig::load(args.config.as_deref()).context("loading configuration")?;

    match args.command {
        Commands::Check(check) => run_check(check, &config).await,
        Commands::DryRun(dry_run) => run_dry_run(dry_run, &config).await,
        Commands::Version => Ok(()),
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn control_plane(no_kube: bool) -> DataSource<Arc<dyn ControlPlane>> {
    if no_kube {
        return DataSource::unavailable("disabled with --no-kube");
    }
    match KubeControlPlane::try_default().await {
        Ok(cp) => {
            info!("Connected to Kubernetes cluster");
            DataSource::Available(Arc::new(cp))
        }
        Err(e) => {
            warn!("Kubernetes API unavailable: {}", e);
            DataSource::unavailable(e.to_string())
        }
    }
}

async fn run_check(args: CheckArgs, config: &GuardConfig) -> anyhow::Result<()> {
    let snapshot = Arc::new(
        FleetSnapshot::load(&args.snapshot)
            .with_context(|| format!("loading snapshot {}", args.snapshot.display()))?,
    );
    let metrics = Arc::new(CachedMetrics::new(snapshot.clone(), config.cache.metrics_ttl()));

    let checker = HealthChecker::new(snapshot, config.health.clone())
        .with_metrics(metrics)
        .with_control_plane_source(control_plane(args.no_kube).await);

    let summary = checker.run_health_checks(&args.cluster).await;
    println!("{summary}");

    #[cfg(feature = "metrics")]
    if args.metrics {
        print!("{}", nodegroup_guard::metrics::render());
    }

    if summary.decision == Decision::Block {
        bail!("health gate would block: {}", summary.reason());
    }
    Ok(())
}

async fn run_dry_run(args: DryRunArgs, config: &GuardConfig) -> anyhow::Result<()> {
    let snapshot = Arc::new(
        FleetSnapshot::load(&args.snapshot)
            .with_context(|| format!("loading snapshot {}", args.snapshot.display()))?,
    );
    let images = Arc::new(CachedImageResolver::new(snapshot.clone(), config.cache.image_ttl()));

    let report = DryRunAnalyzer::new(snapshot, images)
        .analyze(&args.cluster, &args.nodegroups, args.force)
        .await?;
    println!("{report}");
    Ok(())
}
