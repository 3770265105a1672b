//! # pwx-personalization — client-local personalization state
//!
//! Product view journey, search history and A/B group assignment, all
//! persisted through [`pwx_storage::LocalStore`] with a 30-day expiry
//! from the last write. Everything here is best-effort: storage
//! failures degrade to session-only state and never surface to widget
//! code.

#![forbid(unsafe_code)]

mod abtest;
mod journey;
mod search;

pub use abtest::{ABTestManager, EntropyRng, Group, Rng};
pub use journey::{JourneyEntry, ProductTracker};
pub use search::{SearchHistoryEntry, SearchTracker};

/// Every personalization write renews this expiry.
pub(crate) const EXPIRY_DAYS: f64 = 30.0;
