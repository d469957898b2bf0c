use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use swarm_core::Role;
use swarm_engine::node::{Node, NodeConfig};
use swarm_engine::scheduler::{DefaultPush, Edf, LegacyPull, RarestFirst, SchedulerKind, Splitter};
use swarm_engine::stats::StatsSink;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRole {
    Broadcaster,
    Viewer,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Broadcaster => Role::Broadcaster,
            CliRole::Viewer => Role::Viewer,
        }
    }
}

/// The five scheduler strategies, selectable from the command line. `LegacyPull` is
/// an alternative configuration, never combined with the `{Splitter, DefaultPush,
/// RarestFirst, Edf}` family.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliScheduler {
    Splitter,
    Push,
    RarestFirst,
    Edf,
    LegacyPull,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// A UDP mesh node for live peer-to-peer video relay.
#[derive(Parser, Debug)]
#[command(version, author, about)]
struct Opts {
    /// Whether this node is the stream's broadcaster or a viewer.
    #[arg(value_enum)]
    role: CliRole,

    /// UDP port to bind.
    port: u16,

    /// An existing swarm member to HANDSHAKE with at startup (host:port).
    #[arg(long, env = "SWARMCAST_BOOTSTRAP")]
    bootstrap: Option<SocketAddr>,

    /// Chunk-scheduling strategy. Defaults to `splitter` for a broadcaster and
    /// `push` for a viewer.
    #[arg(long, value_enum, env = "SWARMCAST_SCHEDULER")]
    scheduler: Option<CliScheduler>,

    /// Broadcaster-backoff probability used only by `--scheduler legacy-pull`.
    /// 0.3 is the default, 0.9 the more conservative variant.
    #[arg(long, default_value_t = swarm_engine::scheduler::DEFAULT_BACKOFF_PROBABILITY, env = "SWARMCAST_BACKOFF_PROBABILITY")]
    backoff_probability: f64,

    #[arg(value_enum, short = 'v', long = "log-level", default_value = "info", env = "SWARMCAST_LOG_LEVEL")]
    log_level: LogLevel,

    /// Heartbeat+Ping period in milliseconds.
    #[arg(long, default_value_t = 2000, env = "SWARMCAST_HEARTBEAT_MILLIS")]
    heartbeat_millis: u64,

    /// Bitmap-broadcast period in milliseconds.
    #[arg(long, default_value_t = 200, env = "SWARMCAST_BITMAP_MILLIS")]
    bitmap_millis: u64,

    /// Scheduler-tick period in milliseconds.
    #[arg(long, default_value_t = 100, env = "SWARMCAST_TICK_MILLIS")]
    tick_millis: u64,

    /// Peer-prune period in milliseconds.
    #[arg(long, default_value_t = 5000, env = "SWARMCAST_PRUNE_MILLIS")]
    prune_millis: u64,

    /// Peer-exchange (PEX) period in milliseconds.
    #[arg(long, default_value_t = 5000, env = "SWARMCAST_PEX_MILLIS")]
    pex_millis: u64,

    /// Viewer stats-report period in milliseconds.
    #[arg(long, default_value_t = 3000, env = "SWARMCAST_STATS_REPORT_MILLIS")]
    stats_report_millis: u64,

    /// Peer liveness timeout in milliseconds: peers silent for longer are pruned.
    #[arg(long, default_value_t = 5000, env = "SWARMCAST_LIVENESS_TIMEOUT_MILLIS")]
    liveness_timeout_millis: u64,
}

impl Opts {
    fn node_config(&self) -> NodeConfig {
        NodeConfig {
            heartbeat_period: Duration::from_millis(self.heartbeat_millis),
            bitmap_period: Duration::from_millis(self.bitmap_millis),
            tick_period: Duration::from_millis(self.tick_millis),
            prune_period: Duration::from_millis(self.prune_millis),
            pex_period: Duration::from_millis(self.pex_millis),
            stats_report_period: Duration::from_millis(self.stats_report_millis),
            liveness_timeout: Duration::from_millis(self.liveness_timeout_millis),
        }
    }

    fn scheduler_kind(&self, role: Role) -> SchedulerKind {
        let chosen = self.scheduler.unwrap_or(match role {
            Role::Broadcaster => CliScheduler::Splitter,
            Role::Viewer => CliScheduler::Push,
        });
        match chosen {
            CliScheduler::Splitter => SchedulerKind::Splitter(Splitter::new()),
            CliScheduler::Push => SchedulerKind::DefaultPush(DefaultPush::new()),
            CliScheduler::RarestFirst => SchedulerKind::RarestFirst(RarestFirst::new()),
            CliScheduler::Edf => SchedulerKind::Edf(Edf::new()),
            CliScheduler::LegacyPull => {
                SchedulerKind::LegacyPull(LegacyPull::new(self.backoff_probability))
            }
        }
    }
}

fn init_logging(level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("swarmcast={}", level.as_str())));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_logging(opts.log_level);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let token = CancellationToken::new();
    let result = rt.block_on(async_main(opts, token));
    if let Err(e) = result.as_ref() {
        error!("error running swarmcast: {e:#}");
    }
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn async_main(opts: Opts, shutdown: CancellationToken) -> anyhow::Result<()> {
    let role: Role = opts.role.into();
    let scheduler = opts.scheduler_kind(role);
    let scheduler_name = scheduler.name();

    info!(
        %role,
        port = opts.port,
        scheduler = scheduler_name,
        "starting swarmcast node"
    );

    let stats = Arc::new(StatsSink::new());
    let node = Node::bind(opts.port, role, scheduler, opts.node_config(), stats)
        .await
        .with_context(|| format!("failed to bind UDP socket on port {}", opts.port))?;

    if let Some(bootstrap) = opts.bootstrap {
        info!(%bootstrap, "sending initial HANDSHAKE");
        node.connect(bootstrap).await;
    } else if role == Role::Viewer {
        warn!("no --bootstrap given; this viewer will only join the swarm if discovered by PEX");
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received SIGINT, shutting down");
                shutdown.cancel();
            }
        });
    }

    node.run(shutdown).await.context("node run loop failed")?;
    Ok(())
}
