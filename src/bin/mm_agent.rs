//! Market-making agent runner.
//!
//! Wiring only: loads configuration, installs signal handlers (Ctrl-C /
//! SIGTERM stop, SIGHUP reloads the market registry), and runs the core.
//! Without a live exchange client wired in, orders go to the dry-run
//! stub.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{watch, Notify};
use tracing::{info, warn};

use marketmaker::{init_tracing_with_level, AppConfig, TradingCore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        AppConfig::load(&config_path)
            .with_context(|| format!("loading configuration from {}", config_path))?
    } else {
        AppConfig::default()
    };

    init_tracing_with_level(&config.log_level);
    if !Path::new(&config_path).exists() {
        warn!("No configuration at {}, using defaults", config_path);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reload = Arc::new(Notify::new());

    spawn_signal_handlers(shutdown_tx, Arc::clone(&reload));

    let core = TradingCore::builder(config)
        .build()
        .context("building trading core")?;
    core.run(shutdown_rx, reload).await.context("core run")?;
    Ok(())
}

fn spawn_signal_handlers(shutdown_tx: watch::Sender<bool>, reload: Arc<Notify>) {
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        tokio::spawn(async move {
            let Ok(mut term) = signal(SignalKind::terminate()) else {
                return;
            };
            if term.recv().await.is_some() {
                info!("SIGTERM received, stopping");
                let _ = shutdown_tx.send(true);
            }
        });

        tokio::spawn(async move {
            let Ok(mut hup) = signal(SignalKind::hangup()) else {
                return;
            };
            while hup.recv().await.is_some() {
                info!("SIGHUP received, reloading market registry");
                reload.notify_one();
            }
        });
    }

    #[cfg(not(unix))]
    let _ = reload;
}
