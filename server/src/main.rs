mod config;
mod telemetry;

use anyhow::{Context, Result};
use airyra_http::AppState;
use airyra_store::StoreManager;
use clap::Parser;
use config::Config;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{init_telemetry, log_shutdown_info, log_startup_info};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "airyra-server")]
#[command(about = "Airyra task coordination server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "AIRYRA_PORT")]
    port: Option<u16>,

    /// Listen address override (default: 127.0.0.1)
    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Directory holding one database file per project
    /// (default: ~/.airyra/projects)
    #[arg(long, env = "AIRYRA_BASE_DIR")]
    base_dir: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Log level override
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(config_file) => Config::from_file(config_file)?,
        None => Config::from_env()?,
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref listen_addr) = cli.listen_addr {
        config.server.listen_addr = listen_addr.clone();
    }
    if let Some(ref base_dir) = cli.base_dir {
        config.storage.base_dir = Some(base_dir.clone());
    }
    if let Some(ref log_level) = cli.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

/// Periodically sweep audit entries older than the retention window from
/// every project store. The worker holds only the store-manager handle and
/// is aborted on shutdown.
fn spawn_audit_pruner(
    manager: Arc<StoreManager>,
    retention_days: u32,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days));

            let projects = match manager.list_projects().await {
                Ok(projects) => projects,
                Err(e) => {
                    warn!(error = %e, "audit prune could not list projects");
                    continue;
                }
            };

            for project in projects {
                let store = match manager.store_for(&project).await {
                    Ok(store) => store,
                    Err(e) => {
                        warn!(project, error = %e, "audit prune could not open store");
                        continue;
                    }
                };
                match store.prune_audit_log(cutoff).await {
                    Ok(0) => {}
                    Ok(removed) => info!(project, removed, "pruned old audit entries"),
                    Err(e) => warn!(project, error = %e, "audit prune failed"),
                }
            }
        }
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl+c");
        info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config = load_config(&cli).context("Failed to load configuration")?;

    init_telemetry(&config.logging).context("Failed to initialize telemetry")?;

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        std::process::exit(1);
    }

    log_startup_info(&config);

    // Failure to initialize the store manager is fatal
    let manager = StoreManager::new(config.base_dir())
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialize store manager: {e}"))?;
    let manager = Arc::new(manager);
    let state = AppState::new(manager.clone());

    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Airyra server listening");

    let pruner = if config.maintenance.audit_retention_days > 0 {
        Some(spawn_audit_pruner(
            manager.clone(),
            config.maintenance.audit_retention_days,
            config.maintenance.audit_prune_interval_secs,
        ))
    } else {
        None
    };

    // On the shutdown signal the server stops accepting connections and
    // drains in-flight requests; the drain itself is bounded below.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(airyra_http::serve(listener, state, async move {
        let _ = shutdown_rx.await;
    }));

    tokio::select! {
        result = &mut server => {
            // the listener died on its own; treat as an error path
            match result {
                Ok(Ok(())) => warn!("server loop exited before a shutdown signal"),
                Ok(Err(e)) => {
                    error!(error = %e, "server error");
                    manager.close().await;
                    std::process::exit(3);
                }
                Err(e) => {
                    error!(error = %e, "server task panicked");
                    manager.close().await;
                    std::process::exit(3);
                }
            }
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            let grace = Duration::from_secs(config.server.shutdown_grace_secs);
            match tokio::time::timeout(grace, &mut server).await {
                Ok(Ok(Ok(()))) => info!("in-flight requests drained"),
                Ok(Ok(Err(e))) => error!(error = %e, "server error during drain"),
                Ok(Err(e)) => error!(error = %e, "server task panicked during drain"),
                Err(_) => {
                    warn!(grace_secs = config.server.shutdown_grace_secs,
                        "drain window elapsed, aborting remaining requests");
                    server.abort();
                }
            }
        }
    }

    if let Some(pruner) = pruner {
        pruner.abort();
    }
    manager.close().await;
    log_shutdown_info();
    Ok(())
}
