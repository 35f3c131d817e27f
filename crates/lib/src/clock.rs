//! Time source for commit metadata.
//!
//! Commits recorded by the in-memory store carry a timestamp. Timestamps are
//! informational only: ordering and change detection never depend on them,
//! since wall-clock time is not monotonic across writers.
//!
//! # Example
//!
//! ```
//! use layerconf::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! assert!(clock.now_millis() > 0);
//! ```

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;

/// A provider of wall-clock timestamps.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Formats milliseconds since Unix epoch as RFC3339.
pub(crate) fn millis_to_rfc3339(millis: u64) -> String {
    use chrono::{TimeZone, Utc};
    let secs = (millis / 1000) as i64;
    let nanos = ((millis % 1000) * 1_000_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string())
}

/// Production clock using real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests.
///
/// Starts at a fixed instant and advances by one millisecond per reading, so
/// successive commits get distinct, predictable timestamps.
///
#[cfg_attr(feature = "testing", doc = "```")]
#[cfg_attr(not(feature = "testing"), doc = "```ignore")]
/// use layerconf::{Clock, FixedClock};
///
/// let clock = FixedClock::new(1000);
/// assert_eq!(clock.now_millis(), 1000);
/// assert_eq!(clock.now_millis(), 1001);
/// clock.set(5000);
/// assert_eq!(clock.now_millis(), 5000);
/// ```
#[cfg(any(test, feature = "testing"))]
pub struct FixedClock {
    millis: Mutex<u64>,
}

#[cfg(any(test, feature = "testing"))]
impl FixedClock {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Mutex::new(millis),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        *self.millis.lock().unwrap() += ms;
    }

    /// Set the clock to a specific time in milliseconds.
    pub fn set(&self, ms: u64) {
        *self.millis.lock().unwrap() = ms;
    }

    /// Get the current time without advancing.
    pub fn get(&self) -> u64 {
        *self.millis.lock().unwrap()
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        let mut millis = self.millis.lock().unwrap();
        let t = *millis;
        *millis += 1;
        t
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1704067200000)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Debug for FixedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedClock")
            .field("millis", &self.get())
            .finish()
    }
}
