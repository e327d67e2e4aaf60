//! Minimal reconnecting WebSocket client for exchange streams.
//!
//! Wraps `tokio-tungstenite` with the pieces every stream handler here
//! needs: exponential backoff with jitter, a text heartbeat, a
//! subscription payload re-sent on every (re)connect, and a handle for
//! graceful shutdown and forced resubscription.

mod backoff;
mod client;
mod consumer;

pub use backoff::Backoff;
pub use client::{spawn_stream, StreamConfig, StreamHandle};
pub use consumer::StreamConsumer;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("stream task already stopped")]
    TaskGone,
}

pub type Result<T> = std::result::Result<T, StreamError>;
