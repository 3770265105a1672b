//! Visibility signal behind a trait so the lazy-mount scheduler can be
//! driven by a real `IntersectionObserver` in the browser and by hand in
//! tests.

use crate::NodeId;
use std::rc::Rc;

pub type VisibilityHandler = Rc<dyn Fn(NodeId)>;

/// Source of "this node became visible" events.
///
/// Implementations must deliver at-least-once per observed node; the
/// consumer (the widget loader) is responsible for unobserving before it
/// acts, so duplicate deliveries are harmless.
pub trait VisibilitySource {
    fn observe(&self, node: NodeId);
    fn unobserve(&self, node: NodeId);
    /// Install the handler invoked for each intersecting node.
    fn set_handler(&self, handler: VisibilityHandler);
}

/// Hand-driven visibility source for tests and for hosts without
/// `IntersectionObserver` (everything mounts eagerly there, so the fake
/// is only ever fired explicitly).
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    #[derive(Default)]
    pub struct FakeVisibility {
        observed: RefCell<BTreeSet<NodeId>>,
        handler: RefCell<Option<VisibilityHandler>>,
    }

    impl FakeVisibility {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn observed(&self) -> Vec<NodeId> {
            self.observed.borrow().iter().copied().collect()
        }

        pub fn is_observed(&self, node: NodeId) -> bool {
            self.observed.borrow().contains(&node)
        }

        /// Fire the handler for `node` as the real observer would. The node
        /// stays observed; the consumer unobserves.
        pub fn fire(&self, node: NodeId) {
            let handler = self.handler.borrow().clone();
            if let Some(handler) = handler {
                handler(node);
            }
        }

        /// Fire for every currently observed node (a full intersection
        /// callback batch).
        pub fn fire_all(&self) {
            for node in self.observed() {
                self.fire(node);
            }
        }
    }

    impl VisibilitySource for FakeVisibility {
        fn observe(&self, node: NodeId) {
            self.observed.borrow_mut().insert(node);
        }

        fn unobserve(&self, node: NodeId) {
            self.observed.borrow_mut().remove(&node);
        }

        fn set_handler(&self, handler: VisibilityHandler) {
            *self.handler.borrow_mut() = Some(handler);
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeVisibility;
