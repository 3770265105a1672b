//! # pwx-host — Host Page Abstraction
//!
//! The runtime never touches the browser directly: every DOM read/write,
//! timer and visibility signal goes through the traits in this crate. On
//! wasm32 the [`web`] module implements them over `web-sys`; natively the
//! [`mock`] module provides an in-memory host with an operation log so the
//! whole runtime is testable without a browser.
//!
//! Handles are plain `u32` ids into a host-side node registry; the runtime
//! holds no DOM references of its own.

#![forbid(unsafe_code)]

pub mod debounce;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod visibility;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use debounce::{Debounced, Throttled};
pub use visibility::VisibilitySource;

use pwx_core::types::InsertPosition;
use std::rc::Rc;

/// Handle to a host-page DOM node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Handle to a live host timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u32);

/// Page-level and delegated container events forwarded into the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Window resized; width in CSS pixels.
    Resize { width: u32 },
    /// Page scrolled; how far down, 0.0..=100.0.
    Scroll { percent: f32 },
    /// Pointer left the viewport through the top edge.
    ExitIntent,
    /// Click inside a bound container.
    ContainerClick { container: NodeId },
    /// Pointer entered (`entered: true`) or left a bound container.
    ContainerHover { container: NodeId, entered: bool },
    /// Click resolved to a product-bearing element inside a container.
    ProductClick { container: NodeId, product_id: String },
    /// Finger down inside a bound container; x in CSS pixels.
    TouchStart { container: NodeId, x: f32 },
    /// Finger lifted after a touch that started in a bound container.
    TouchEnd { container: NodeId, x: f32 },
    /// Click on an element carrying `data-pwx-action`.
    Action {
        container: NodeId,
        action: String,
        payload: Option<String>,
    },
}

pub type EventSink = Rc<dyn Fn(&HostEvent)>;

/// Everything the runtime needs from the page it runs inside.
///
/// All methods take `&self`; implementations use interior mutability
/// (single-threaded browser model). Operations on stale node ids are
/// silent no-ops, mirroring how detached DOM nodes behave.
pub trait HostPage {
    // ---- queries ------------------------------------------------------

    /// Elements matching `selector` under `root` (whole document if None),
    /// in DOM order.
    fn query(&self, root: Option<NodeId>, selector: &str) -> Vec<NodeId>;

    /// Create an empty `div` under the first match of `selector`.
    fn create_container(&self, selector: &str, position: InsertPosition) -> Option<NodeId>;

    fn attr(&self, node: NodeId, name: &str) -> Option<String>;
    fn attrs(&self, node: NodeId) -> Vec<(String, String)>;

    // ---- mutation -----------------------------------------------------

    fn set_attr(&self, node: NodeId, name: &str, value: &str);
    fn remove_attr(&self, node: NodeId, name: &str);
    fn add_class(&self, node: NodeId, class: &str);
    fn remove_class(&self, node: NodeId, class: &str);
    fn set_html(&self, node: NodeId, html: &str);
    fn clear_children(&self, node: NodeId);
    fn set_css_var(&self, node: NodeId, name: &str, value: &str);

    /// Inject a `<style>` element into the page head, keyed by element id.
    /// Returns false if a style with this id already exists.
    fn inject_style_once(&self, style_id: &str, css: &str) -> bool;

    // ---- shadow DOM ---------------------------------------------------

    fn supports_shadow_dom(&self) -> bool;
    /// Attach (or reuse) an open shadow root on `node` and set its HTML.
    fn set_shadow_html(&self, node: NodeId, html: &str);

    // ---- geometry -----------------------------------------------------

    fn viewport_width(&self) -> u32;
    /// Whether the node's box currently intersects the viewport.
    fn is_in_viewport(&self, node: NodeId) -> bool;

    // ---- events -------------------------------------------------------

    /// Install the runtime's event sink. Only one sink is active.
    fn set_event_sink(&self, sink: EventSink);
    /// Opt a container into delegated click/action events.
    fn bind_container_events(&self, node: NodeId);
    fn unbind_container_events(&self, node: NodeId);

    // ---- timers -------------------------------------------------------

    fn set_timeout(&self, ms: u64, callback: Box<dyn FnOnce()>) -> TimerId;
    fn set_interval(&self, ms: u64, callback: Rc<dyn Fn()>) -> TimerId;
    fn clear_timer(&self, timer: TimerId);

    // ---- page capabilities (Custom widget actions) --------------------

    fn navigate(&self, url: &str);
    fn copy_text(&self, text: &str);
    fn scroll_into_view(&self, selector: &str);

    // ---- page metadata (current-product detection) --------------------

    /// Host-page signals a product page may expose, probed in order by the
    /// RecentlyViewed widget: e-commerce globals, JSON-LD, data
    /// attributes, meta tags.
    fn page_product_id(&self) -> Option<String>;
}
