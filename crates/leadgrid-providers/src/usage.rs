//! Monthly usage metering for paid integrations.
//!
//! Counters are keyed by UTC calendar month and start over at zero when the
//! month changes. Time comes from an injected [`Clock`] so month rollover can
//! be tested without waiting for it.

use chrono::{DateTime, Datelike, Utc};
use std::sync::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Per-integration call counter.
pub trait UsageTracker: Send + Sync {
    /// Calls used in the current month
    fn used(&self) -> u32;

    /// Record `n` more calls and return the new total
    fn increment(&self, n: u32) -> u32;
}

#[derive(Debug, Default)]
struct MonthState {
    month: i32,
    count: u32,
}

/// In-process counter that resets on the UTC month boundary.
#[derive(Debug)]
pub struct MonthlyUsage<C: Clock = SystemClock> {
    clock: C,
    state: Mutex<MonthState>,
}

impl MonthlyUsage<SystemClock> {
    /// Counter driven by the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MonthlyUsage<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MonthlyUsage<C> {
    /// Counter driven by `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: Mutex::new(MonthState::default()),
        }
    }

    fn month_key(&self) -> i32 {
        let now = self.clock.now();
        now.year() * 100 + i32::try_from(now.month()).unwrap_or(0)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MonthState) -> T) -> T {
        let month = self.month_key();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.month != month {
            if state.month != 0 {
                tracing::info!("Usage month rolled over ({} -> {}), counter reset", state.month, month);
            }
            state.month = month;
            state.count = 0;
        }
        f(&mut state)
    }
}

impl<C: Clock> UsageTracker for MonthlyUsage<C> {
    fn used(&self) -> u32 {
        self.with_state(|state| state.count)
    }

    fn increment(&self, n: u32) -> u32 {
        self.with_state(|state| {
            state.count = state.count.saturating_add(n);
            state.count
        })
    }
}
