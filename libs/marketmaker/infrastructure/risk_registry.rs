//! Durable per-market risk-off records.
//!
//! One JSON file per condition id under the state directory; absent file
//! means the market is active. Writes go to a temp file and are renamed
//! into place so a crash never leaves a torn record.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskOffReason {
    StopLoss,
    Volatility,
}

impl std::fmt::Display for RiskOffReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskOffReason::StopLoss => write!(f, "stop_loss"),
            RiskOffReason::Volatility => write!(f, "volatility"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskOffRecord {
    pub sleep_until: DateTime<Utc>,
    pub reason: RiskOffReason,
}

/// On-disk shape: epoch seconds keep the file trivially greppable.
#[derive(Serialize, Deserialize)]
struct PersistedRecord {
    sleep_until_epoch: i64,
    reason: RiskOffReason,
}

pub struct RiskOffRegistry {
    dir: PathBuf,
    records: RwLock<HashMap<String, RiskOffRecord>>,
}

impl RiskOffRegistry {
    /// Open the registry, creating the directory and loading any records
    /// persisted by a previous run.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut records = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_record(&path) {
                Ok((condition_id, record)) => {
                    records.insert(condition_id, record);
                }
                Err(e) => warn!("[RiskOff] Skipping unreadable {}: {}", path.display(), e),
            }
        }

        if !records.is_empty() {
            info!("[RiskOff] Loaded {} persisted records", records.len());
        }

        Ok(Self {
            dir,
            records: RwLock::new(records),
        })
    }

    pub fn get(&self, condition_id: &str) -> Option<RiskOffRecord> {
        self.records.read().get(condition_id).copied()
    }

    /// Is the market still sleeping at `now`?
    pub fn is_paused(&self, condition_id: &str, now: DateTime<Utc>) -> bool {
        self.get(condition_id)
            .map(|r| r.sleep_until > now)
            .unwrap_or(false)
    }

    /// Write a record, atomically replacing any prior one.
    pub fn trip(
        &self,
        condition_id: &str,
        reason: RiskOffReason,
        sleep_until: DateTime<Utc>,
    ) -> io::Result<()> {
        let record = RiskOffRecord { sleep_until, reason };
        let path = self.record_path(condition_id);
        let tmp = path.with_extension("json.tmp");

        let persisted = PersistedRecord {
            sleep_until_epoch: record.sleep_until.timestamp(),
            reason: record.reason,
        };
        let body = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;

        self.records
            .write()
            .insert(condition_id.to_string(), record);
        info!(
            "[RiskOff] {} paused until {} ({})",
            condition_id, record.sleep_until, reason
        );
        Ok(())
    }

    /// Remove an expired record; missing files are fine.
    pub fn clear(&self, condition_id: &str) -> io::Result<()> {
        self.records.write().remove(condition_id);
        match fs::remove_file(self.record_path(condition_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn record_path(&self, condition_id: &str) -> PathBuf {
        // Condition ids are hex strings, but keep the filename safe anyway.
        let safe: String = condition_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

fn load_record(path: &Path) -> Result<(String, RiskOffRecord), String> {
    let body = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let persisted: PersistedRecord = serde_json::from_str(&body).map_err(|e| e.to_string())?;
    let sleep_until = Utc
        .timestamp_opt(persisted.sleep_until_epoch, 0)
        .single()
        .ok_or_else(|| "bad epoch".to_string())?;
    let condition_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| "bad filename".to_string())?
        .to_string();
    Ok((
        condition_id,
        RiskOffRecord {
            sleep_until,
            reason: persisted.reason,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn trip_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let until = Utc::now() + Duration::hours(4);

        {
            let registry = RiskOffRegistry::open(dir.path()).unwrap();
            registry
                .trip("cond1", RiskOffReason::Volatility, until)
                .unwrap();
            assert!(registry.is_paused("cond1", Utc::now()));
        }

        // fresh open sees the persisted record
        let registry = RiskOffRegistry::open(dir.path()).unwrap();
        let record = registry.get("cond1").unwrap();
        assert_eq!(record.reason, RiskOffReason::Volatility);
        assert_eq!(record.sleep_until.timestamp(), until.timestamp());
    }

    #[test]
    fn expired_record_is_not_paused() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RiskOffRegistry::open(dir.path()).unwrap();
        registry
            .trip("cond1", RiskOffReason::StopLoss, Utc::now() - Duration::minutes(1))
            .unwrap();
        assert!(!registry.is_paused("cond1", Utc::now()));
    }

    #[test]
    fn clear_removes_record_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RiskOffRegistry::open(dir.path()).unwrap();
        registry
            .trip("cond1", RiskOffReason::StopLoss, Utc::now())
            .unwrap();

        registry.clear("cond1").unwrap();
        assert!(registry.get("cond1").is_none());
        // idempotent
        registry.clear("cond1").unwrap();

        let registry = RiskOffRegistry::open(dir.path()).unwrap();
        assert!(registry.get("cond1").is_none());
    }

    #[test]
    fn absent_market_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RiskOffRegistry::open(dir.path()).unwrap();
        assert!(!registry.is_paused("unknown", Utc::now()));
    }
}
