//! Runtime clock. `web-time` maps to `Date.now()` on wasm32 and to the
//! system clock natively, so expiry math is identical in tests and in the
//! browser.

use web_time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Convert a fractional day count (the storage API's `expire_days`) to
/// milliseconds.
pub fn days_to_ms(days: f64) -> u64 {
    (days * 24.0 * 60.0 * 60.0 * 1000.0).max(0.0) as u64
}

/// Simple call-rate gate: `allow` returns true at most once per interval.
/// Pure and clock-driven so it is testable without timers.
#[derive(Debug)]
pub struct Throttle {
    interval_ms: u64,
    last: std::cell::Cell<Option<u64>>,
}

impl Throttle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last: std::cell::Cell::new(None),
        }
    }

    pub fn allow(&self, now: u64) -> bool {
        match self.last.get() {
            Some(last) if now.saturating_sub(last) < self.interval_ms => false,
            _ => {
                self.last.set(Some(now));
                true
            }
        }
    }
}
