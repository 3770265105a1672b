//! # pwx-storage — Expiring Key/Value Storage
//!
//! Namespaced wrapper over a persistent browser store with read-time
//! expiry, quota eviction and an in-memory fallback. Personalization is
//! best-effort: a host page with storage disabled degrades every
//! capability to session-only rather than failing.

#![forbid(unsafe_code)]

mod backend;
mod store;
#[cfg(target_arch = "wasm32")]
mod web;

pub use backend::{MemoryBackend, StorageBackend, StorageError};
pub use store::LocalStore;
#[cfg(target_arch = "wasm32")]
pub use web::WebStorageBackend;
