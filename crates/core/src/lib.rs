//! # pwx-core — Shared Data Model & Utilities
//!
//! The leaf crate of the PWX widget runtime: server-sourced data shapes,
//! the pub/sub event bus every other component hangs off, attribute
//! coercion for the `data-pwx-*` DOM contract, and the runtime clock.

#![forbid(unsafe_code)]

pub mod attrs;
pub mod events;
pub mod time;
pub mod types;

pub use events::{EventEmitter, SubscriptionId};
pub use time::now_ms;
pub use types::{
    Placement, Product, StockStatus, Theme, WidgetData, WidgetDescriptor, WidgetState,
    WidgetTemplate,
};
