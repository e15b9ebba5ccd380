//! Durable key-value store for otpgate.
//!
//! A thin, best-effort layer over a [`StorageBackend`] that adds:
//!
//! - **Namespacing**: every key is prefixed (default `otpgate_`) so the
//!   store can share a backend with unrelated data, and [`DurableStore::clear`]
//!   only touches its own keys.
//! - **Expiry**: values are written with an optional TTL and silently
//!   dropped on read once it has elapsed.
//! - **Failure absorption**: backend and serialization errors are logged
//!   and swallowed. The server is the source of truth; losing a cached
//!   session id only costs the user a fresh login.
//!
//! The session layer uses it for exactly one entry: the current session id,
//! kept for 24 hours.

mod backend;
mod clock;
mod error;

pub use backend::{FileStorage, MemoryStorage, StorageBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default key prefix.
pub const DEFAULT_NAMESPACE: &str = "otpgate_";

/// The on-disk envelope around every stored value.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry<T> {
    value: T,
    stored_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

/// Namespaced, TTL-aware wrapper over a [`StorageBackend`].
///
/// Cheap to clone; clones share the backend and clock.
#[derive(Clone)]
pub struct DurableStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    namespace: String,
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl DurableStore {
    /// Creates a store over `backend` with the default namespace and the
    /// system clock.
    pub fn new(backend: impl StorageBackend) -> Self {
        Self {
            backend: Arc::new(backend),
            clock: Arc::new(SystemClock),
            namespace: DEFAULT_NAMESPACE.to_owned(),
        }
    }

    /// An in-memory store. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Overrides the key prefix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Overrides the clock used for TTL bookkeeping.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Reads `key`, returning `None` if it is missing, expired, or unreadable.
    ///
    /// Expired entries are deleted as a side effect.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.namespaced(key);
        let raw = match self.backend.get_item(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %full_key, error = %e, "store read failed");
                return None;
            }
        };

        let entry: StoredEntry<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %full_key, error = %e, "dropping unreadable store entry");
                self.remove(key);
                return None;
            }
        };

        if let Some(expires_at) = entry.expires_at {
            if self.clock.now_ms() >= expires_at {
                debug!(key = %full_key, "store entry expired");
                self.remove(key);
                return None;
            }
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %full_key, error = %e, "store entry has unexpected shape");
                None
            }
        }
    }

    /// Writes `value` under `key`, expiring after `ttl` if given.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let full_key = self.namespaced(key);
        let now = self.clock.now_ms();
        let entry = StoredEntry {
            value,
            stored_at: now,
            expires_at: ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64)),
        };

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %full_key, error = %e, "store value not serializable");
                return;
            }
        };
        if let Err(e) = self.backend.set_item(&full_key, &raw) {
            warn!(key = %full_key, error = %e, "store write failed");
        }
    }

    /// Deletes `key`.
    pub fn remove(&self, key: &str) {
        let full_key = self.namespaced(key);
        if let Err(e) = self.backend.remove_item(&full_key) {
            warn!(key = %full_key, error = %e, "store delete failed");
        }
    }

    /// Deletes every key under this store's namespace. Other keys are left alone.
    pub fn clear(&self) {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "store key listing failed");
                return;
            }
        };
        for key in keys.iter().filter(|k| k.starts_with(&self.namespace)) {
            if let Err(e) = self.backend.remove_item(key) {
                warn!(%key, error = %e, "store delete failed");
            }
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}
