//! Raw string-to-string storage backends.

use std::cell::RefCell;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store rejected the write for lack of space.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    /// The store is unavailable (privacy mode, sandboxed frame, ...).
    #[error("storage unavailable")]
    Unavailable,
}

/// Flat string store in the shape of the Web Storage API.
pub trait StorageBackend {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str);
    /// All keys currently present, in unspecified order.
    fn keys(&self) -> Vec<String>;
}

/// Session-only fallback used when the persistent store is unavailable.
#[derive(Default)]
pub struct MemoryBackend {
    map: RefCell<BTreeMap<String, String>>,
    /// Optional byte budget so quota behavior is testable.
    capacity_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that rejects writes once stored bytes exceed `bytes`.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            map: RefCell::default(),
            capacity_bytes: Some(bytes),
        }
    }

    fn used_bytes(&self) -> usize {
        self.map
            .borrow()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.map.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(capacity) = self.capacity_bytes {
            let existing = self.map.borrow().get(key).map_or(0, String::len);
            let projected = self.used_bytes() - existing + key.len() + value.len();
            if projected > capacity {
                return Err(StorageError::QuotaExceeded);
            }
        }
        self.map
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.map.borrow_mut().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.map.borrow().keys().cloned().collect()
    }
}
