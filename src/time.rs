//! Virtual time.
//!
//! Executors report time as a [`Time`] instant: nanoseconds since an
//! executor-defined epoch. The lab executor starts its epoch at zero and
//! advances it explicitly, which keeps timer tests deterministic. A
//! wall-clock executor would anchor the epoch at its own start instead.

use core::fmt;
use core::ops::{Add, AddAssign};
use core::time::Duration;

/// A point in executor time, in nanoseconds since the executor's epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The epoch itself.
    pub const ZERO: Self = Self(0);

    /// The far-future instant; sorts after every other time.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a time from nanoseconds since the epoch.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a time from seconds since the epoch.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns nanoseconds since the epoch.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns whole milliseconds since the epoch.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Returns whole seconds since the epoch.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Adds a duration, saturating at [`Time::MAX`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        // Durations beyond u64::MAX nanoseconds clamp to the far future.
        let nanos = duration.as_nanos();
        if nanos > u64::MAX as u128 {
            Self::MAX
        } else {
            Self(self.0.saturating_add(nanos as u64))
        }
    }

    /// Returns the duration elapsed since `earlier`, or zero if `earlier`
    /// is in the future.
    #[must_use]
    pub const fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        self.saturating_add(duration)
    }
}

impl AddAssign<Duration> for Time {
    fn add_assign(&mut self, duration: Duration) {
        *self = self.saturating_add(duration);
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({}ns)", self.0)
    }
}

impl fmt::Display for Time {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000_000 {
            write!(f, "{:.3}s", self.0 as f64 / 1e9)
        } else if self.0 >= 1_000_000 {
            write!(f, "{:.3}ms", self.0 as f64 / 1e6)
        } else if self.0 >= 1_000 {
            write!(f, "{:.3}us", self.0 as f64 / 1e3)
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_round_down() {
        let t = Time::from_nanos(1_500_000_123);
        assert_eq!(t.as_millis(), 1500);
        assert_eq!(t.as_secs(), 1);
        assert_eq!(Time::from_millis(2).as_nanos(), 2_000_000);
        assert_eq!(Time::from_secs(3).as_millis(), 3000);
    }

    #[test]
    fn add_saturates_at_max() {
        let t = Time::MAX + Duration::from_secs(1);
        assert_eq!(t, Time::MAX);

        let huge = Duration::new(u64::MAX, 999_999_999);
        assert_eq!(Time::ZERO + huge, Time::MAX);
    }

    #[test]
    fn duration_since_is_directional() {
        let early = Time::from_millis(10);
        let late = Time::from_millis(25);
        assert_eq!(late.duration_since(early), Duration::from_millis(15));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }

    #[test]
    fn display_scales_units() {
        assert_eq!(Time::from_nanos(250).to_string(), "250ns");
        assert_eq!(Time::from_nanos(1_500).to_string(), "1.500us");
        assert_eq!(Time::from_millis(2).to_string(), "2.000ms");
        assert_eq!(Time::from_secs(1).to_string(), "1.000s");
    }
}
