//! Rolling-window rate tracker backing renewable resources.
//!
//! Capacity refills by window rotation rather than by an explicit refill
//! action: each `(principal, resource)` pair tracks a deque of
//! `(timestamp, amount)` consumption entries; entries older than the
//! window are dropped lazily on the next access.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
struct WindowState {
    capacity: Decimal,
    window: Duration,
    entries: VecDeque<(Instant, Decimal)>,
}

impl WindowState {
    fn prune(&mut self, now: Instant) {
        while let Some((ts, _)) = self.entries.front() {
            if now.duration_since(*ts) > self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn used(&self) -> Decimal {
        self.entries.iter().map(|(_, amt)| *amt).sum()
    }
}

/// Tracks renewable-resource consumption per `(principal, resource)` pair
/// within a configured rolling window.
#[derive(Debug, Default)]
pub struct RateTracker {
    windows: Mutex<HashMap<(String, String), WindowState>>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Registers (or re-registers) the capacity/window for a resource. Safe
    /// to call repeatedly; existing consumption history is preserved unless
    /// the window shrinks enough to prune it on next access.
    pub fn configure(
        &self,
        principal_id: &str,
        resource: &str,
        capacity: Decimal,
        window: Duration,
    ) {
        let key = (principal_id.to_string(), resource.to_string());
        let mut windows = self.windows.lock();
        windows
            .entry(key)
            .and_modify(|w| {
                w.capacity = capacity;
                w.window = window;
            })
            .or_insert_with(|| WindowState {
                capacity,
                window,
                entries: VecDeque::new(),
            });
    }

    /// Attempts to consume `amount` from the window. Succeeds iff the
    /// window still has headroom; on success the consumption is recorded
    /// immediately.
    pub fn consume(&self, principal_id: &str, resource: &str, amount: Decimal) -> bool {
        let key = (principal_id.to_string(), resource.to_string());
        let mut windows = self.windows.lock();
        let Some(state) = windows.get_mut(&key) else {
            return false;
        };
        let now = Instant::now();
        state.prune(now);
        if state.used() + amount > state.capacity {
            return false;
        }
        state.entries.push_back((now, amount));
        true
    }

    pub fn get_remaining(&self, principal_id: &str, resource: &str) -> Option<Decimal> {
        let key = (principal_id.to_string(), resource.to_string());
        let mut windows = self.windows.lock();
        let state = windows.get_mut(&key)?;
        state.prune(Instant::now());
        Some(state.capacity - state.used())
    }

    /// Suspends the caller until the window frees at least `amount` of
    /// capacity, or `timeout` elapses (returns `false` on timeout).
    pub async fn wait_for_capacity(
        &self,
        principal_id: &str,
        resource: &str,
        amount: Decimal,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(remaining) = self.get_remaining(principal_id, resource) {
                if remaining >= amount {
                    return true;
                }
            } else {
                return false;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
