//! Time source abstraction
//!
//! Every age and grace-period comparison in the registry reads time through a
//! `Clock`, so production code uses wall-clock milliseconds while tests drive a
//! `ManualClock` to exact instants.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of millisecond timestamps
pub trait Clock: Send + Sync {
    /// Current time in milliseconds
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by `SystemTime`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> i64 {
        super::now_ms()
    }
}

/// Manually driven clock
///
/// Time only moves when `set` or `advance` is called.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start_ms`
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Move forward by `delta_ms`, returning the new time
    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.now.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
