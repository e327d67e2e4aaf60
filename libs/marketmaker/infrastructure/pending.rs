//! Pending trade intents.
//!
//! Trade ids seen on the private stream but not yet reflected by an
//! authoritative pull. While any intent is pending for a token, a pull
//! merges average price only and leaves locally-accounted size alone.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

struct PendingIntent {
    token_id: String,
    expires_at: Instant,
}

pub struct PendingIntents {
    intents: DashMap<String, PendingIntent>,
    ttl: Duration,
}

impl PendingIntents {
    pub fn new(ttl: Duration) -> Self {
        Self {
            intents: DashMap::new(),
            ttl,
        }
    }

    /// Register an observed trade id. Returns false when the id was
    /// already tracked (duplicate stream delivery).
    pub fn insert(&self, trade_id: &str, token_id: &str) -> bool {
        let fresh = !self.intents.contains_key(trade_id);
        self.intents.insert(
            trade_id.to_string(),
            PendingIntent {
                token_id: token_id.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        fresh
    }

    /// Any unexpired intent outstanding for this token?
    pub fn has_token(&self, token_id: &str) -> bool {
        let now = Instant::now();
        self.intents
            .iter()
            .any(|e| e.token_id == token_id && e.expires_at > now)
    }

    /// Mark a trade id reconciled (seen in an authoritative pull).
    pub fn resolve(&self, trade_id: &str) {
        self.intents.remove(trade_id);
    }

    /// Drop expired intents, returning how many were swept.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.intents.len();
        self.intents.retain(|_, intent| intent.expires_at > now);
        let swept = before - self.intents.len();
        if swept > 0 {
            debug!("[Pending] Swept {} expired trade intents", swept);
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

impl Default for PendingIntents {
    /// 60 s expiry.
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
