//! Rate limit for event-driven refreshes.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Lets at most one caller through per window.
///
/// Callers inside the window are turned away, not queued.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last: Mutex<Option<Instant>>,
}

impl Debouncer {
    /// Creates a debouncer with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// The window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true and starts a new window if the previous one has ended.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match *last {
            Some(at) if now.duration_since(at) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
