// src/session/clock.rs

use chrono::Utc;

/// Source of wall-clock time in Unix seconds, typically a battery-backed RTC.
pub trait Clock {
    fn now(&self) -> i64;
}

/// The host's system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> i64 {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> i64 {
        (**self).now()
    }
}

/// Where a record's timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// The clock reading was plausible and is used as is.
    Clock(i64),
    /// The clock looked reset; time was extrapolated from the last good reading.
    Extrapolated(i64),
}

impl Timestamp {
    pub fn value(self) -> i64 {
        match self {
            Timestamp::Clock(t) | Timestamp::Extrapolated(t) => t,
        }
    }

    pub fn is_extrapolated(self) -> bool {
        matches!(self, Timestamp::Extrapolated(_))
    }
}

/// Replaces implausible clock readings with times derived from the sample index.
///
/// Keeps the last plausible reading and the sample index it was taken at. A
/// reading below the threshold becomes `last_good + (index - index_at_last_good)
/// * interval`, which keeps timestamps increasing while the clock is bad.
#[derive(Debug, Clone)]
pub struct TimestampGuard {
    threshold: i64,
    interval_sec: u32,
    last_good: i64,
    last_good_sample: u32,
}

impl TimestampGuard {
    /// `seed` is the best known good time for sample index `seed_sample`.
    pub fn new(threshold: i64, interval_sec: u32, seed: i64, seed_sample: u32) -> Self {
        TimestampGuard {
            threshold,
            interval_sec,
            last_good: seed.max(threshold),
            last_good_sample: seed_sample,
        }
    }

    pub fn is_plausible(&self, t: i64) -> bool {
        t >= self.threshold
    }

    pub fn resolve(&mut self, reading: i64, sample_index: u32) -> Timestamp {
        if self.is_plausible(reading) {
            self.last_good = reading;
            self.last_good_sample = sample_index;
            Timestamp::Clock(reading)
        } else {
            let since = i64::from(sample_index.saturating_sub(self.last_good_sample));
            Timestamp::Extrapolated(self.last_good + since * i64::from(self.interval_sec))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: i64 = 1_577_836_800;

    #[test]
    fn test_plausible_readings_pass_through() {
        let mut guard = TimestampGuard::new(THRESHOLD, 5, 1_735_689_600, 0);
        assert_eq!(guard.resolve(1_735_689_605, 1), Timestamp::Clock(1_735_689_605));
    }

    #[test]
    fn test_reset_clock_extrapolates_monotonically() {
        let mut guard = TimestampGuard::new(THRESHOLD, 5, 1_735_689_600, 0);
        guard.resolve(1_735_689_650, 10);

        let mut previous = 1_735_689_650;
        for index in 11..40 {
            let t = guard.resolve(946_684_800, index);
            assert!(t.is_extrapolated());
            assert_eq!(t.value(), 1_735_689_650 + i64::from(index - 10) * 5);
            assert!(t.value() > previous);
            previous = t.value();
        }
    }

    #[test]
    fn test_recovers_when_clock_returns() {
        let mut guard = TimestampGuard::new(THRESHOLD, 10, 1_735_689_600, 0);
        assert_eq!(guard.resolve(0, 3).value(), 1_735_689_630);
        assert_eq!(guard.resolve(1_735_689_700, 4), Timestamp::Clock(1_735_689_700));
        assert_eq!(guard.resolve(0, 6).value(), 1_735_689_720);
    }

    #[test]
    fn test_implausible_seed_uses_threshold() {
        let mut guard = TimestampGuard::new(THRESHOLD, 5, 0, 0);
        assert_eq!(guard.resolve(0, 2).value(), THRESHOLD + 10);
    }
}
