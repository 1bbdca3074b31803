//! Clock skew bookkeeping for validity windows.
//!
//! A spot request carries a `valid_from` timestamp that the remote API
//! requires to be in the future by *its* clock. Two values correct for the
//! difference between the clocks:
//!
//! - `approximate_clock_skew`: measured once by comparing the local time at
//!   submission with the remote creation time. Signed, because the remote
//!   clock may be behind.
//! - `launch_time_offset`: a lead added on top of the skew. Starts at a
//!   baseline and grows every time the remote API rejects a window as not in
//!   the future. It never shrinks.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{ReconcileError, ReconcileResult};

/// Default baseline for `launch_time_offset`.
pub const DEFAULT_LAUNCH_TIME_OFFSET: Duration = Duration::from_secs(10);

/// Growth applied to `launch_time_offset` on each rejected window.
pub const LAUNCH_TIME_OFFSET_GROWTH: Duration = Duration::from_secs(10);

/// Granularity the measured skew is rounded to.
pub const SKEW_ROUNDING_INTERVAL: Duration = Duration::from_secs(10);

/// Clock skew state owned by one provisioner for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSkew {
    approximate_clock_skew: TimeDelta,
    launch_time_offset: Duration,
}

impl Default for ClockSkew {
    fn default() -> Self {
        Self::new(DEFAULT_LAUNCH_TIME_OFFSET)
    }
}

impl ClockSkew {
    /// Zero skew with the given baseline offset.
    pub fn new(launch_time_offset: Duration) -> Self {
        Self {
            approximate_clock_skew: TimeDelta::zero(),
            launch_time_offset,
        }
    }

    /// Estimated remote clock minus local clock.
    pub fn approximate_clock_skew(&self) -> TimeDelta {
        self.approximate_clock_skew
    }

    /// Current lead on top of the skew.
    pub fn launch_time_offset(&self) -> Duration {
        self.launch_time_offset
    }

    /// Record a skew measurement taken between a local submission time and
    /// the remote creation time. The stored value is rounded away from zero
    /// to [`SKEW_ROUNDING_INTERVAL`].
    pub fn calibrate(
        &mut self,
        local: DateTime<Utc>,
        remote: DateTime<Utc>,
    ) -> ReconcileResult<TimeDelta> {
        let interval = TimeDelta::from_std(SKEW_ROUNDING_INTERVAL)
            .map_err(|_| ReconcileError::TimeOverflow("skew rounding interval"))?;
        let rounded = round_away_from_zero(remote - local, interval);
        self.approximate_clock_skew = rounded;
        Ok(rounded)
    }

    /// Grow the launch offset after a "not in the future" rejection.
    ///
    /// Returns the new offset.
    pub fn grow(&mut self) -> Duration {
        self.launch_time_offset = self
            .launch_time_offset
            .saturating_add(LAUNCH_TIME_OFFSET_GROWTH);
        self.launch_time_offset
    }

    /// Start of the validity window for a request submitted at `now`.
    pub fn valid_from(&self, now: DateTime<Utc>) -> ReconcileResult<DateTime<Utc>> {
        self.valid_from_with_lead(now, self.launch_time_offset)
    }

    /// Start of a validity window using an explicit lead instead of the
    /// current launch offset. The skew is still applied.
    pub fn valid_from_with_lead(
        &self,
        now: DateTime<Utc>,
        lead: Duration,
    ) -> ReconcileResult<DateTime<Utc>> {
        let lead = TimeDelta::from_std(lead)
            .map_err(|_| ReconcileError::TimeOverflow("launch lead"))?;
        now.checked_add_signed(self.approximate_clock_skew)
            .and_then(|t| t.checked_add_signed(lead))
            .ok_or(ReconcileError::TimeOverflow("valid_from"))
    }
}

/// Round `value` to a multiple of `interval`, moving away from zero.
///
/// Exact multiples are returned unchanged. A non-positive interval leaves
/// the value as is.
pub fn round_away_from_zero(value: TimeDelta, interval: TimeDelta) -> TimeDelta {
    let (Some(nanos), Some(step)) = (value.num_nanoseconds(), interval.num_nanoseconds()) else {
        return value;
    };
    if step <= 0 {
        return value;
    }

    let remainder = nanos % step;
    if remainder == 0 {
        return value;
    }

    let rounded = if nanos > 0 {
        (nanos - remainder).saturating_add(step)
    } else {
        (nanos - remainder).saturating_sub(step)
    };
    TimeDelta::nanoseconds(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rstest::rstest;

    fn base() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1_000, 10_000)]
    #[case(10_000, 10_000)]
    #[case(13_000, 20_000)]
    #[case(19_999, 20_000)]
    #[case(-1_000, -10_000)]
    #[case(-13_000, -20_000)]
    #[case(-20_000, -20_000)]
    fn test_round_away_from_zero(#[case] millis: i64, #[case] expected: i64) {
        let rounded = round_away_from_zero(
            TimeDelta::milliseconds(millis),
            TimeDelta::seconds(10),
        );
        assert_eq!(rounded, TimeDelta::milliseconds(expected));
    }

    #[test]
    fn test_calibrate_rounds_measurement() {
        let mut skew = ClockSkew::default();
        let remote = base() + TimeDelta::milliseconds(34_250);

        let stored = skew.calibrate(base(), remote).unwrap();

        assert_eq!(stored, TimeDelta::seconds(40));
        assert_eq!(skew.approximate_clock_skew(), TimeDelta::seconds(40));
        assert_eq!(skew.launch_time_offset(), DEFAULT_LAUNCH_TIME_OFFSET);
    }

    #[test]
    fn test_valid_from_applies_skew_and_offset() {
        let mut skew = ClockSkew::default();
        skew.calibrate(base(), base() - TimeDelta::seconds(5)).unwrap();

        // -5s rounds to -10s, plus the 10s baseline.
        assert_eq!(skew.valid_from(base()).unwrap(), base());

        skew.grow();
        assert_eq!(
            skew.valid_from(base()).unwrap(),
            base() + TimeDelta::seconds(10)
        );
    }

    #[test]
    fn test_valid_from_with_lead() {
        let skew = ClockSkew::new(Duration::from_secs(10));
        let at = skew
            .valid_from_with_lead(base(), Duration::from_secs(100 * 3600))
            .unwrap();
        assert_eq!(at, base() + TimeDelta::hours(100));
    }

    #[test]
    fn test_grow_adds_fixed_increment() {
        let mut skew = ClockSkew::new(Duration::from_secs(10));
        assert_eq!(skew.grow(), Duration::from_secs(20));
        assert_eq!(skew.grow(), Duration::from_secs(30));
    }

    proptest! {
        #[test]
        fn prop_rounding_never_moves_toward_zero(millis in -1_000_000_000i64..1_000_000_000) {
            let value = TimeDelta::milliseconds(millis);
            let rounded = round_away_from_zero(value, TimeDelta::seconds(10));

            prop_assert_eq!(rounded.num_milliseconds() % 10_000, 0);
            prop_assert!(rounded.abs() >= value.abs());
            prop_assert!((rounded - value).abs() < TimeDelta::seconds(10));
            if millis != 0 {
                prop_assert_eq!(rounded.num_milliseconds().signum(), millis.signum());
            }
        }

        #[test]
        fn prop_offset_is_monotonic(steps in 0usize..64) {
            let mut skew = ClockSkew::default();
            let mut previous = skew.launch_time_offset();
            for _ in 0..steps {
                let next = skew.grow();
                prop_assert_eq!(next, previous + LAUNCH_TIME_OFFSET_GROWTH);
                previous = next;
            }
        }
    }
}
