use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::CoreError;

/// Persisted state of the rate budget for the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Calls issued across all watchlists since `window_start`
    pub used: u32,
    /// Most recent reset instant the counter belongs to
    pub window_start: DateTime<Utc>,
    /// Calls issued per watchlist key since `window_start`
    #[serde(default)]
    pub per_watchlist: HashMap<String, u32>,
}

impl UsageSnapshot {
    pub fn empty(window_start: DateTime<Utc>) -> Self {
        Self {
            used: 0,
            window_start,
            per_watchlist: HashMap::new(),
        }
    }
}

/// Storage for the rate-budget counter, provided by the embedding application.
///
/// The core never touches disk; it hands the snapshot to this trait after
/// every change and reads it back once at startup.
pub trait UsageStore: Send + Sync {
    fn load(&self) -> Result<Option<UsageSnapshot>, CoreError>;
    fn save(&self, snapshot: &UsageSnapshot) -> Result<(), CoreError>;
}

/// Volatile store; usage is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    snapshot: Mutex<Option<UsageSnapshot>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot (e.g., one restored by the application).
    pub fn with_snapshot(snapshot: UsageSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }
}

impl UsageStore for InMemoryUsageStore {
    fn load(&self) -> Result<Option<UsageSnapshot>, CoreError> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| CoreError::Deserialization("usage store lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &UsageSnapshot) -> Result<(), CoreError> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| CoreError::Serialization("usage store lock poisoned".into()))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }
}
