//! `window.localStorage` backend.

use crate::backend::{StorageBackend, StorageError};
use web_sys::Storage;

pub struct WebStorageBackend {
    storage: Storage,
}

impl WebStorageBackend {
    /// None when localStorage is disabled by the browser or host page.
    pub fn new() -> Option<Self> {
        let storage = web_sys::window()?.local_storage().ok()??;
        Some(Self { storage })
    }
}

impl StorageBackend for WebStorageBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok()?
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // Web Storage reports quota exhaustion as a DOMException on setItem.
        self.storage
            .set_item(key, value)
            .map_err(|_| StorageError::QuotaExceeded)
    }

    fn remove(&self, key: &str) {
        let _ = self.storage.remove_item(key);
    }

    fn keys(&self) -> Vec<String> {
        let len = self.storage.length().unwrap_or(0);
        (0..len)
            .filter_map(|i| self.storage.key(i).ok().flatten())
            .collect()
    }
}
