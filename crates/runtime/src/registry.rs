//! Widget type registry: lowercase type name to behavior factory.

use pwx_widgets::WidgetBehavior;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type WidgetFactory = Rc<dyn Fn() -> Box<dyn WidgetBehavior>>;

#[derive(Default)]
pub struct WidgetRegistry {
    factories: RefCell<HashMap<String, WidgetFactory>>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a case-insensitive type name. Registering
    /// a name twice replaces the factory (host pages override built-ins
    /// this way) with a warning.
    pub fn register(&self, widget_type: &str, factory: WidgetFactory) {
        let key = widget_type.trim().to_ascii_lowercase();
        if key.is_empty() {
            log::warn!("pwx-runtime: ignoring registration with empty type name");
            return;
        }
        if self.factories.borrow_mut().insert(key.clone(), factory).is_some() {
            log::warn!("pwx-runtime: widget type {key:?} re-registered");
        }
    }

    pub fn contains(&self, widget_type: &str) -> bool {
        self.factories
            .borrow()
            .contains_key(&widget_type.trim().to_ascii_lowercase())
    }

    pub fn create(&self, widget_type: &str) -> Option<Box<dyn WidgetBehavior>> {
        self.factories
            .borrow()
            .get(&widget_type.trim().to_ascii_lowercase())
            .map(|factory| factory())
    }

    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.borrow().keys().cloned().collect();
        types.sort();
        types
    }
}
