//! Namespaced expiring store over a [`StorageBackend`].

use crate::backend::{MemoryBackend, StorageBackend, StorageError};
use pwx_core::time::{days_to_ms, now_ms};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;

/// Stored envelope: value, optional absolute expiry, write timestamp.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<u64>,
    w: u64,
}

/// Share of namespaced entries evicted (oldest first) when a write hits
/// the quota.
const EVICTION_SHARE: f64 = 0.2;

pub struct LocalStore {
    backend: Rc<dyn StorageBackend>,
    namespace: String,
}

impl LocalStore {
    pub fn new(backend: Rc<dyn StorageBackend>, namespace: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
        }
    }

    /// Probe `backend` with a write/remove round trip; fall back to a
    /// fresh in-memory backend when the probe fails, so callers always get
    /// a working (possibly session-only) store.
    pub fn auto(backend: Rc<dyn StorageBackend>, namespace: &str) -> Self {
        let probe_key = format!("{namespace}-__probe__");
        match backend.set(&probe_key, "1") {
            Ok(()) => {
                backend.remove(&probe_key);
                Self::new(backend, namespace)
            }
            Err(_) => {
                log::warn!("pwx-storage: persistent store unavailable, using in-memory fallback");
                Self::new(Rc::new(MemoryBackend::new()), namespace)
            }
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}-{}", self.namespace, key)
    }

    fn prefix(&self) -> String {
        format!("{}-", self.namespace)
    }

    /// Read a value; expired entries are deleted and read as absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        let full = self.full_key(key);
        let raw = self.backend.get(&full)?;
        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(_) => {
                // Not ours or corrupted; drop it.
                self.backend.remove(&full);
                return None;
            }
        };
        if let Some(exp) = envelope.exp {
            if now_ms() > exp {
                self.backend.remove(&full);
                return None;
            }
        }
        Some(envelope.v)
    }

    /// Typed convenience over [`Self::get`].
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        serde_json::from_value(self.get(key)?).ok()
    }

    /// Write a value with an optional expiry in (fractional) days.
    ///
    /// On quota exhaustion the oldest ~20% of this namespace's entries are
    /// evicted and the write retried once; a second failure is swallowed
    /// with a warning, since personalization is best-effort.
    pub fn set(&self, key: &str, value: &Value, expire_days: Option<f64>) {
        let now = now_ms();
        let envelope = Envelope {
            v: value.clone(),
            exp: expire_days.map(|d| now + days_to_ms(d)),
            w: now,
        };
        let Ok(raw) = serde_json::to_string(&envelope) else {
            return;
        };
        let full = self.full_key(key);
        match self.backend.set(&full, &raw) {
            Ok(()) => {}
            Err(StorageError::QuotaExceeded) => {
                self.evict_oldest();
                if let Err(err) = self.backend.set(&full, &raw) {
                    log::warn!("pwx-storage: dropping write of {key:?} after eviction: {err}");
                }
            }
            Err(err) => {
                log::warn!("pwx-storage: dropping write of {key:?}: {err}");
            }
        }
    }

    pub fn set_serialize<T: Serialize>(&self, key: &str, value: &T, expire_days: Option<f64>) {
        if let Ok(v) = serde_json::to_value(value) {
            self.set(key, &v, expire_days);
        }
    }

    pub fn remove(&self, key: &str) {
        self.backend.remove(&self.full_key(key));
    }

    /// Remove every entry in this namespace.
    pub fn clear(&self) {
        for key in self.keys() {
            self.remove(&key);
        }
    }

    /// Keys in this namespace (without the namespace prefix), including
    /// not-yet-collected expired entries.
    pub fn keys(&self) -> Vec<String> {
        let prefix = self.prefix();
        self.backend
            .keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Evict the oldest ~20% (by write timestamp) of namespaced entries.
    fn evict_oldest(&self) {
        let prefix = self.prefix();
        let mut entries: Vec<(String, u64)> = self
            .backend
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| {
                let written = self
                    .backend
                    .get(&k)
                    .and_then(|raw| serde_json::from_str::<Envelope>(&raw).ok())
                    .map_or(0, |e| e.w);
                (k, written)
            })
            .collect();
        if entries.is_empty() {
            return;
        }
        entries.sort_by_key(|(_, w)| *w);
        let count = ((entries.len() as f64 * EVICTION_SHARE).ceil() as usize).max(1);
        for (key, _) in entries.into_iter().take(count) {
            self.backend.remove(&key);
        }
    }
}
