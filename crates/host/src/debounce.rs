//! Trailing-edge debounce and leading-edge throttle. The shared widget
//! resize handling debounces (a burst of resize events collapses into one
//! callback after the quiet period); the page scroll listener throttles.

use crate::{HostPage, TimerId};
use pwx_core::time::now_ms;
use std::cell::Cell;
use std::rc::Rc;

pub struct Debounced {
    host: Rc<dyn HostPage>,
    quiet_ms: u64,
    callback: Rc<dyn Fn()>,
    pending: Rc<Cell<Option<TimerId>>>,
}

impl Debounced {
    pub fn new(host: Rc<dyn HostPage>, quiet_ms: u64, callback: Rc<dyn Fn()>) -> Self {
        Self {
            host,
            quiet_ms,
            callback,
            pending: Rc::new(Cell::new(None)),
        }
    }

    /// Schedule the callback, cancelling any earlier pending schedule.
    pub fn call(&self) {
        if let Some(timer) = self.pending.take() {
            self.host.clear_timer(timer);
        }
        let callback = Rc::clone(&self.callback);
        let pending = Rc::clone(&self.pending);
        let timer = self.host.set_timeout(
            self.quiet_ms,
            Box::new(move || {
                pending.set(None);
                callback();
            }),
        );
        self.pending.set(Some(timer));
    }

    /// Cancel without firing. Safe to call when nothing is pending.
    pub fn cancel(&self) {
        if let Some(timer) = self.pending.take() {
            self.host.clear_timer(timer);
        }
    }
}

impl Drop for Debounced {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// At most one call per `interval_ms` window; calls inside the window are
/// dropped, not deferred.
pub struct Throttled {
    interval_ms: u64,
    last: Cell<Option<u64>>,
    callback: Rc<dyn Fn()>,
}

impl Throttled {
    pub fn new(interval_ms: u64, callback: Rc<dyn Fn()>) -> Self {
        Self {
            interval_ms,
            last: Cell::new(None),
            callback,
        }
    }

    pub fn call(&self) {
        let now = now_ms();
        let due = match self.last.get() {
            Some(last) => now.saturating_sub(last) >= self.interval_ms,
            None => true,
        };
        if due {
            self.last.set(Some(now));
            (self.callback)();
        }
    }
}
