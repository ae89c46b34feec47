//! Logical simulation time
//!
//! All simulation time is expressed as a [`Duration`] offset from the start of
//! the run. Durations are signed microsecond counts, totally ordered, and never
//! refer to wall-clock time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A span of logical time with microsecond resolution
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Duration(i64);

impl Duration {
    /// The empty duration
    pub const ZERO: Duration = Duration(0);
    /// The smallest positive duration
    pub const EPSILON: Duration = Duration(1);
    /// The largest representable duration
    pub const MAX: Duration = Duration(i64::MAX);
    /// The smallest representable duration
    pub const MIN: Duration = Duration(i64::MIN);

    pub const MICROSECOND: Duration = Duration(1);
    pub const MILLISECOND: Duration = Duration(1_000);
    pub const SECOND: Duration = Duration(1_000_000);
    pub const MINUTE: Duration = Duration(60 * 1_000_000);
    pub const HOUR: Duration = Duration(60 * 60 * 1_000_000);
    pub const DAY: Duration = Duration(24 * 60 * 60 * 1_000_000);

    /// Create a duration of `amount` units, saturating on overflow
    ///
    /// # Example
    ///
    /// ```
    /// use kairos_core::Duration;
    ///
    /// let d = Duration::of(90, Duration::SECOND);
    /// assert_eq!(d, Duration::of(1, Duration::MINUTE) + Duration::of(30, Duration::SECOND));
    /// ```
    pub const fn of(amount: i64, unit: Duration) -> Self {
        Self(amount.saturating_mul(unit.0))
    }

    /// Create a duration from a raw microsecond count
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// The raw microsecond count
    pub const fn as_micros(&self) -> i64 {
        self.0
    }

    /// How many whole `unit`s fit in this duration (truncating toward zero)
    pub fn in_units(&self, unit: Duration) -> i64 {
        if unit.0 == 0 {
            return 0;
        }
        self.0 / unit.0
    }

    /// Fractional seconds, for reporting
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / Self::SECOND.0 as f64
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn saturating_add(self, other: Duration) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub const fn saturating_sub(self, other: Duration) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn checked_add(self, other: Duration) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Duration) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Convert to a `chrono::Duration` for calendar arithmetic
    pub fn to_chrono(&self) -> chrono::Duration {
        chrono::Duration::microseconds(self.0)
    }

    /// Convert from a `chrono::Duration`, saturating when it does not fit
    pub fn from_chrono(duration: chrono::Duration) -> Self {
        match duration.num_microseconds() {
            Some(micros) => Self(micros),
            None if duration < chrono::Duration::zero() => Self::MIN,
            None => Self::MAX,
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

impl Mul<i64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: i64) -> Duration {
        Duration(self.0.saturating_mul(rhs))
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        Duration(self.0.saturating_neg())
    }
}

impl fmt::Display for Duration {
    /// Formats as `[-]HH:MM:SS.ffffff`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let micros = self.0.unsigned_abs();
        let second = Self::SECOND.0 as u64;
        let hours = micros / (3600 * second);
        let minutes = (micros / (60 * second)) % 60;
        let seconds = (micros / second) % 60;
        let fraction = micros % second;
        write!(
            f,
            "{}{:02}:{:02}:{:02}.{:06}",
            sign, hours, minutes, seconds, fraction
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(Duration::of(1, Duration::SECOND).as_micros(), 1_000_000);
        assert_eq!(Duration::of(2, Duration::HOUR).in_units(Duration::MINUTE), 120);
        assert_eq!(Duration::EPSILON.as_micros(), 1);
    }

    #[test]
    fn test_ordering() {
        assert!(Duration::ZERO < Duration::EPSILON);
        assert!(Duration::of(-1, Duration::SECOND) < Duration::ZERO);
        assert!(Duration::of(10, Duration::DAY) < Duration::MAX);
    }

    #[test]
    fn test_saturating_arithmetic() {
        assert_eq!(Duration::MAX + Duration::SECOND, Duration::MAX);
        assert_eq!(Duration::MIN - Duration::SECOND, Duration::MIN);
        assert_eq!(Duration::of(i64::MAX, Duration::HOUR), Duration::MAX);
        assert_eq!(Duration::MAX.checked_add(Duration::EPSILON), None);
    }

    #[test]
    fn test_display() {
        let d = Duration::of(1, Duration::HOUR)
            + Duration::of(2, Duration::MINUTE)
            + Duration::of(3, Duration::SECOND)
            + Duration::of(4, Duration::MICROSECOND);
        assert_eq!(d.to_string(), "01:02:03.000004");
        assert_eq!((-Duration::SECOND).to_string(), "-00:00:01.000000");
    }

    #[test]
    fn test_chrono_conversion() {
        let d = Duration::of(1500, Duration::MILLISECOND);
        assert_eq!(Duration::from_chrono(d.to_chrono()), d);
    }

    #[test]
    fn test_serde_roundtrip() {
        let d = Duration::of(42, Duration::SECOND);
        let text = ron::to_string(&d).unwrap();
        assert_eq!(text, "42000000");
        let back: Duration = ron::from_str(&text).unwrap();
        assert_eq!(back, d);
    }
}
