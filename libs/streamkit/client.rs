//! Reconnecting stream task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::consumer::StreamConsumer;
use crate::{Result, StreamError};

/// Connection parameters for one stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    /// Interval for the application-level heartbeat (if the consumer
    /// provides a ping text).
    pub ping_interval: Duration,
    pub backoff: Backoff,
    /// Label used in log lines.
    pub name: String,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_interval: Duration::from_secs(5),
            backoff: Backoff::default(),
            name: name.into(),
        }
    }
}

/// Handle to a running stream task.
pub struct StreamHandle {
    connected: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    resubscribe: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Drop the current connection and reconnect with a freshly computed
    /// subscription payload. Used when the token universe changes.
    pub fn resubscribe(&self) {
        self.resubscribe.notify_one();
    }

    /// Signal shutdown and wait for the task to exit. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.await.map_err(|_| StreamError::TaskGone)?;
        }
        Ok(())
    }
}

/// Spawn the reconnect loop for `consumer` on a new tokio task.
pub fn spawn_stream<C: StreamConsumer>(config: StreamConfig, consumer: C) -> StreamHandle {
    let connected = Arc::new(AtomicBool::new(false));
    let resubscribe = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run_loop(
        config,
        consumer,
        Arc::clone(&connected),
        Arc::clone(&resubscribe),
        shutdown_rx,
    ));

    StreamHandle {
        connected,
        shutdown_tx,
        resubscribe,
        task: Mutex::new(Some(task)),
    }
}

async fn run_loop<C: StreamConsumer>(
    config: StreamConfig,
    mut consumer: C,
    connected: Arc<AtomicBool>,
    resubscribe: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    let mut ever_connected = false;

    loop {
        if *shutdown.borrow() {
            break;
        }

        match connect_async(config.url.as_str()).await {
            Ok((ws, _)) => {
                info!("[{}] Connected to {}", config.name, config.url);
                attempt = 0;
                connected.store(true, Ordering::Release);
                consumer.on_connected(ever_connected);
                ever_connected = true;

                let session = run_session(
                    &config,
                    ws,
                    &mut consumer,
                    &resubscribe,
                    &mut shutdown,
                )
                .await;

                connected.store(false, Ordering::Release);
                consumer.on_disconnected();

                match session {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Resubscribe => {
                        info!("[{}] Resubscribing with updated payload", config.name);
                        continue; // no backoff: deliberate reconnect
                    }
                    SessionEnd::Dropped(reason) => {
                        warn!("[{}] Connection lost: {}", config.name, reason);
                    }
                }
            }
            Err(e) => {
                warn!("[{}] Connect failed: {}", config.name, e);
            }
        }

        let delay = config.backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!("[{}] Reconnect attempt {} in {:?}", config.name, attempt, delay);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("[{}] Stream task exiting", config.name);
}

enum SessionEnd {
    Shutdown,
    Resubscribe,
    Dropped(String),
}

async fn run_session<C: StreamConsumer>(
    config: &StreamConfig,
    mut ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    consumer: &mut C,
    resubscribe: &Arc<Notify>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    if let Some(payload) = consumer.subscription() {
        if let Err(e) = ws.send(Message::Text(payload)).await {
            return SessionEnd::Dropped(format!("subscribe failed: {}", e));
        }
    }

    let mut heartbeat = tokio::time::interval(config.ping_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    heartbeat.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => consumer.on_text(&text),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws.send(Message::Pong(data)).await {
                            return SessionEnd::Dropped(format!("pong failed: {}", e));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return SessionEnd::Dropped("closed by peer".to_string());
                    }
                    Some(Ok(_)) => {} // binary / pong frames ignored
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                }
            }
            _ = heartbeat.tick() => {
                if let Some(text) = consumer.ping_text() {
                    if let Err(e) = ws.send(Message::Text(text)).await {
                        return SessionEnd::Dropped(format!("ping failed: {}", e));
                    }
                }
            }
            _ = resubscribe.notified() => {
                let _ = ws.close(None).await;
                return SessionEnd::Resubscribe;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = ws.close(None).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }
}
