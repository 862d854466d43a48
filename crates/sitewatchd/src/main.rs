//! sitewatchd — the sitewatch daemon.
//!
//! Single binary that assembles every sitewatch subsystem:
//! - Store (redb file, or Redis with the `redis` feature)
//! - HTTP prober and notifier
//! - Serial scheduler, producer cron, change listener
//! - Status endpoint and kill switch
//!
//! # Usage
//!
//! ```text
//! sitewatchd run --config /etc/sitewatch/sitewatch.toml
//! sitewatchd seed --config /etc/sitewatch/sitewatch.toml
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use sitewatch_core::SitewatchConfig;
use sitewatch_notify::{LogNotifier, Notifier, WebhookNotifier};
use sitewatch_probe::{HttpProber, Prober};
use sitewatch_scheduler::{
    ChangeListener, CheckLifecycle, HealthPing, LifecycleConfig, ProducerCron, SchedulerResult,
    SerialScheduler,
};
use sitewatch_state::{RedbStore, Store};

const DEFAULT_LOG_FILTER: &str = "info,sitewatchd=debug,sitewatch=debug";
const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "sitewatchd", about = "sitewatch daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the producer, scheduler, and HTTP surface until shutdown.
    Run {
        /// Path to sitewatch.toml.
        #[arg(long, short, default_value = "sitewatch.toml")]
        config: PathBuf,
    },
    /// Write the configured sites to the job log if it is empty, then exit.
    Seed {
        /// Path to sitewatch.toml.
        #[arg(long, short, default_value = "sitewatch.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config } => run(&config).await,
        Command::Seed { config } => seed(&config).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<SitewatchConfig> {
    let config = SitewatchConfig::from_file(path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?;
    info!(path = %path.display(), sites = config.sites.len(), "configuration loaded");
    Ok(config)
}

// ── Store ──────────────────────────────────────────────────────────

async fn open_store(config: &SitewatchConfig) -> anyhow::Result<Arc<dyn Store>> {
    match &config.redis_connection {
        Some(url) => open_redis(url).await,
        None => {
            std::fs::create_dir_all(&config.data_dir)?;
            let db_path = config.data_dir.join("sitewatch.redb");
            let store = RedbStore::open(&db_path)?;
            info!(path = %db_path.display(), "redb store opened");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(feature = "redis")]
async fn open_redis(url: &str) -> anyhow::Result<Arc<dyn Store>> {
    let store = sitewatch_state::RedisStore::connect(url).await?;
    info!("redis store opened");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(_url: &str) -> anyhow::Result<Arc<dyn Store>> {
    anyhow::bail!("redis_connection is set but sitewatchd was built without the `redis` feature")
}

fn build_notifier(config: &SitewatchConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.notify.webhook {
        Some(url) => {
            info!(%url, "webhook notifier configured");
            Ok(Arc::new(WebhookNotifier::new(url.clone(), config.notify_timeout())?))
        }
        None => {
            info!("no webhook configured, notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// The lifecycle `run` drives: HTTP prober, configured notifier, optional
/// health ping. Adapters get the configured timeouts; the lifecycle adds
/// its grace on top.
fn build_lifecycle(config: &SitewatchConfig, store: Arc<dyn Store>) -> anyhow::Result<CheckLifecycle> {
    let prober: Arc<dyn Prober> = Arc::new(HttpProber::new(config.probe_timeout())?);
    let notifier = build_notifier(config)?;

    let mut lifecycle = CheckLifecycle::new(prober, store, notifier, LifecycleConfig::from_config(config));
    if let Some(url) = &config.healthchecker {
        lifecycle = lifecycle.with_health_ping(HealthPing::new(url.clone(), HEALTH_PING_TIMEOUT)?);
        info!(%url, "health check ping enabled");
    }
    Ok(lifecycle)
}

// ── Seed ───────────────────────────────────────────────────────────

async fn seed(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let store = open_store(&config).await?;
    let written = sitewatch_scheduler::seed(store.as_ref(), &config.sites).await?;
    info!(written, "seed finished");
    Ok(())
}

// ── Run ────────────────────────────────────────────────────────────

async fn run(path: &Path) -> anyhow::Result<()> {
    info!("sitewatch daemon starting");

    let config = Arc::new(load_config(path)?);
    let store = open_store(&config).await?;
    let lifecycle = build_lifecycle(&config, store.clone())?;

    let (scheduler, handle) = SerialScheduler::new(lifecycle);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ───────────────────────────────────────

    let scheduler_task = supervise("scheduler", shutdown_tx.clone(), scheduler.run(shutdown_rx.clone()));

    let cron = ProducerCron::new(config.sites.clone(), config.interval(), store.clone(), handle.clone());
    let cron_rx = shutdown_rx.clone();
    let cron_task = supervise("producer", shutdown_tx.clone(), async move { cron.run(cron_rx).await });

    let subscription = store.subscribe().await?;
    let listener = ChangeListener::new(handle);
    let listener_rx = shutdown_rx.clone();
    let listener_task = supervise("listener", shutdown_tx.clone(), async move {
        listener.run(subscription, listener_rx).await
    });

    // ── HTTP surface ───────────────────────────────────────────

    let status = sitewatch_api::status_router(config.clone(), store.clone());
    let status_addr = SocketAddr::from(([0, 0, 0, 0], config.status_port));
    let status_server = serve("status", status_addr, status, shutdown_rx.clone()).await?;

    let kill_server = match config.kill_port {
        Some(port) => {
            let router = sitewatch_api::kill_router(config.kill_secret.clone(), shutdown_tx.clone());
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            Some(serve("kill switch", addr, router, shutdown_rx.clone()).await?)
        }
        None => None,
    };

    // ── Wait for shutdown ──────────────────────────────────────

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
        _ = shutdown_requested(shutdown_rx.clone()) => info!("shutdown requested"),
    }
    let _ = shutdown_tx.send(true);

    let results = [
        ("scheduler", scheduler_task.await),
        ("producer", cron_task.await),
        ("listener", listener_task.await),
    ];
    let _ = status_server.await;
    if let Some(server) = kill_server {
        let _ = server.await;
    }

    for (name, result) in results {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(anyhow::anyhow!("{name} failed: {e}")),
            Err(e) => return Err(anyhow::anyhow!("{name} task panicked: {e}")),
        }
    }

    info!("sitewatch daemon stopped");
    Ok(())
}

/// Spawn a background task; a fatal error triggers shutdown for everyone.
fn supervise<F>(name: &'static str, shutdown: watch::Sender<bool>, task: F) -> JoinHandle<SchedulerResult<()>>
where
    F: Future<Output = SchedulerResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = task.await;
        if let Err(e) = &result {
            error!(task = name, error = %e, "background task failed, shutting down");
            let _ = shutdown.send(true);
        }
        result
    })
}

async fn serve(
    name: &'static str,
    addr: SocketAddr,
    router: axum::Router,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<JoinHandle<std::io::Result<()>>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, server = name, "listening");
    Ok(tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_requested(shutdown))
            .await
    }))
}

/// Resolves once the shutdown flag is set or its sender is gone.
async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
