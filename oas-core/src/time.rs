//! Monotonic timestamp abstraction used by the fade scheduler and by the
//! main loop's idle-timeout bookkeeping.
//!
//! OASTime (`original_source/server/src/OASTime.h`) wraps `timespec` and
//! supports add/subtract/compare plus an implicit "unset" state (zero
//! seconds and zero nanoseconds). We represent the same idea as an
//! `Option<Duration>` measured from a process-wide monotonic epoch so that
//! `Time` values remain `Copy`, orderable, and comparable across unrelated
//! sources.

use lazy_static::lazy_static;

use std::time::{Duration, Instant};

lazy_static! {
    static ref EPOCH: Instant = Instant::now();
}

/// A monotonic point in time, or the "unset" sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Time(Option<Duration>);

impl Time {
    /// The unset sentinel. Used as the initial value of a `FadePlan`-less
    /// source and as the zero-value deadline before the first loop tick.
    pub fn unset() -> Time {
        Time(None)
    }

    /// The current monotonic time.
    pub fn now() -> Time {
        Time(Some(Instant::now().duration_since(*EPOCH)))
    }

    pub fn from_secs_f64(seconds: f64) -> Time {
        Time(Some(Duration::from_secs_f64(seconds.max(0.0))))
    }

    pub fn has_time(&self) -> bool {
        self.0.is_some()
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }

    /// Saturating duration between two set times. Treats an unset operand
    /// as the epoch, matching `OASTime`'s behavior of comparing against a
    /// zeroed `timespec`.
    pub fn duration_since(&self, earlier: Time) -> Duration {
        let a = self.0.unwrap_or_default();
        let b = earlier.0.unwrap_or_default();
        a.saturating_sub(b)
    }
}

impl std::ops::Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Time {
        Time(Some(self.0.unwrap_or_default() + rhs))
    }
}

impl std::ops::Sub<Duration> for Time {
    type Output = Time;

    fn sub(self, rhs: Duration) -> Time {
        Time(Some(self.0.unwrap_or_default().saturating_sub(rhs)))
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Time) -> Option<std::cmp::Ordering> {
        Some(self.0.unwrap_or_default().cmp(&other.0.unwrap_or_default()))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Time) -> std::cmp::Ordering {
        self.0.unwrap_or_default().cmp(&other.0.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_has_no_time() {
        assert!(!Time::unset().has_time());
        assert!(Time::now().has_time());
    }

    #[test]
    fn add_and_sub_are_monotonic() {
        let t0 = Time::now();
        let t1 = t0 + Duration::from_secs(1);
        assert!(t1 > t0);
        let t2 = t1 - Duration::from_millis(500);
        assert!(t2 > t0);
        assert!(t2 < t1);
    }

    #[test]
    fn duration_since_is_saturating() {
        let t0 = Time::now();
        let t1 = t0 + Duration::from_secs(2);
        assert_eq!(t1.duration_since(t0), Duration::from_secs(2));
        // Never panics/wraps when queried backwards.
        assert_eq!(t0.duration_since(t1), Duration::ZERO);
    }

    #[test]
    fn ordering_matches_wall_clock() {
        let a = Time::now();
        std::thread::sleep(Duration::from_millis(2));
        let b = Time::now();
        assert!(b >= a);
    }
}
