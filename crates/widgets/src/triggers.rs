//! Open triggers and show-once suppression shared by the overlay
//! widgets (Popup, Slider).

use crate::settings::Settings;
use pwx_storage::LocalStore;
use serde_json::json;
use std::rc::Rc;

/// Suppression marks live a day; a dismissed overlay stays dismissed
/// for the visit, not forever.
const SUPPRESS_EXPIRY_DAYS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    Immediate,
    Delay(u64),
    ExitIntent,
    ScrollPercent(f32),
    Click,
}

impl Trigger {
    /// `trigger` setting: "immediate", "delay" (+ `triggerDelay` ms),
    /// "exit-intent", "scroll" (+ `triggerScroll` percent), or "click".
    /// Unknown values read as a delay.
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.str("trigger", "delay").as_str() {
            "immediate" => Trigger::Immediate,
            "exit-intent" => Trigger::ExitIntent,
            "click" => Trigger::Click,
            "scroll" => {
                Trigger::ScrollPercent(settings.f64("triggerScroll", 50.0).clamp(0.0, 100.0) as f32)
            }
            _ => Trigger::Delay(settings.u64("triggerDelay", 3000)),
        }
    }
}

/// Open/closed state machine with persisted show-once suppression.
pub struct TriggerController {
    trigger: Trigger,
    store: Rc<LocalStore>,
    suppress_key: String,
    show_once: bool,
    open: bool,
}

impl TriggerController {
    pub fn new(
        settings: &Settings,
        store: Rc<LocalStore>,
        suppress_key: impl Into<String>,
        show_once_default: bool,
    ) -> Self {
        Self {
            trigger: Trigger::from_settings(settings),
            store,
            suppress_key: suppress_key.into(),
            show_once: settings.bool("showOnce", show_once_default),
            open: false,
        }
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn suppressed(&self) -> bool {
        self.show_once && self.store.get(&self.suppress_key).is_some()
    }

    /// True exactly when this call transitioned closed -> open.
    pub fn open(&mut self) -> bool {
        if self.open || self.suppressed() {
            return false;
        }
        self.open = true;
        if self.show_once {
            self.store
                .set(&self.suppress_key, &json!(true), Some(SUPPRESS_EXPIRY_DAYS));
        }
        true
    }

    /// True exactly when this call transitioned open -> closed.
    pub fn close(&mut self) -> bool {
        std::mem::replace(&mut self.open, false)
    }

    pub fn wants_scroll_open(&self, percent: f32) -> bool {
        matches!(self.trigger, Trigger::ScrollPercent(threshold) if percent >= threshold)
            && !self.open
            && !self.suppressed()
    }

    pub fn wants_exit_open(&self) -> bool {
        self.trigger == Trigger::ExitIntent && !self.open && !self.suppressed()
    }

    pub fn wants_click_open(&self) -> bool {
        self.trigger == Trigger::Click && !self.open && !self.suppressed()
    }
}
