use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use mutex_lite::cluster::Cluster;
use mutex_lite::config::{ClockConfig, ClusterConfig};
use mutex_lite::dashboard::{run_dashboard, DashboardState};
use mutex_lite::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "mutex-lite")]
#[command(version)]
#[command(about = "Centralized mutual exclusion with coordinator failover")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an in-process cluster until the duration elapses or a signal arrives
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Nodes created at startup (the first one coordinates)
    #[arg(long, env = "MUTEX_INITIAL_NODES", default_value = "4")]
    initial_nodes: usize,

    /// Upper bound of the random node identity range
    #[arg(long, env = "MUTEX_MAX_NODE_ID", default_value = "100000")]
    max_node_id: u64,

    /// Seconds between new nodes joining
    #[arg(long, env = "MUTEX_GROWTH_INTERVAL_SECS", default_value = "40")]
    growth_interval_secs: u64,

    /// Seconds between simulated coordinator failures
    #[arg(long, env = "MUTEX_KILL_INTERVAL_SECS", default_value = "60")]
    kill_interval_secs: u64,

    /// Lower bound of a node's resource request interval, in seconds
    #[arg(long, default_value = "10")]
    request_min_secs: u64,

    /// Upper bound of a node's resource request interval, in seconds
    #[arg(long, default_value = "25")]
    request_max_secs: u64,

    /// Lower bound of a critical section, in seconds
    #[arg(long, default_value = "5")]
    hold_min_secs: u64,

    /// Upper bound of a critical section, in seconds
    #[arg(long, default_value = "15")]
    hold_max_secs: u64,

    /// Maximum initial clock skew of a node, in milliseconds
    #[arg(long, default_value = "2000")]
    max_skew_ms: i64,

    /// Seconds between clock synchronization rounds
    #[arg(long, default_value = "30")]
    clock_sync_secs: u64,

    /// Stop after this many seconds (0 runs until SIGINT/SIGTERM)
    #[arg(long, env = "MUTEX_DURATION_SECS", default_value = "300")]
    duration_secs: u64,

    /// Port for the HTTP dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,
}

impl RunArgs {
    fn to_config(&self) -> ClusterConfig {
        ClusterConfig {
            initial_nodes: self.initial_nodes,
            max_node_id: self.max_node_id,
            growth_interval_ms: secs_to_ms(self.growth_interval_secs),
            kill_interval_ms: secs_to_ms(self.kill_interval_secs),
            request_interval_min_ms: secs_to_ms(self.request_min_secs),
            request_interval_max_ms: secs_to_ms(self.request_max_secs),
            hold_min_ms: secs_to_ms(self.hold_min_secs),
            hold_max_ms: secs_to_ms(self.hold_max_secs),
            clock: ClockConfig {
                max_initial_skew_ms: self.max_skew_ms,
                sync_interval_ms: secs_to_ms(self.clock_sync_secs),
            },
            run_for: (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs)),
        }
    }
}

/// Oversized values saturate and are then rejected by `ClusterConfig::validate`.
fn secs_to_ms(secs: u64) -> u64 {
    secs.saturating_mul(1_000)
}

async fn run_cluster(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.to_config();
    let run_for = config.run_for;

    tracing::info!(
        initial_nodes = config.initial_nodes,
        growth_interval_ms = config.growth_interval_ms,
        kill_interval_ms = config.kill_interval_ms,
        run_for = ?run_for,
        "Initializing centralized mutex cluster"
    );

    let cluster = Cluster::new(config)?;
    let shutdown = install_shutdown_handler(run_for);

    if let Some(port) = args.dashboard_port {
        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        let state = DashboardState {
            cluster: cluster.clone(),
        };
        tokio::spawn(run_dashboard(addr, state, shutdown.clone()));
    }

    cluster.start().await?;
    shutdown.cancelled().await;
    cluster.shutdown().await;

    let snapshot = cluster.snapshot().await;
    tracing::info!(
        completed_sections = snapshot.resource.completed_sections,
        max_concurrent_holders = snapshot.resource.max_concurrent_holders,
        "Cluster finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Run(run_args) => run_cluster(run_args).await?,
    }

    Ok(())
}
