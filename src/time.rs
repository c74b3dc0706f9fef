//! Timestamps for motion points.
//!
//! Motion plans are stamped with microseconds since the epoch of an
//! [`embedded_time::Clock`], which lets the same code run against a
//! hardware timer, the host clock or a [`ManualClock`] in simulation.

use crate::Result;
use core::ops::Add;
use core::time::Duration;
use embedded_time::{clock, duration::Microseconds, rate::Fraction, Clock, Instant};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A point in time, in microseconds since the clock epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Create a timestamp from seconds since the epoch.
    /// Negative seconds saturate to the epoch.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1e6).round().max(0.) as u64)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Signed seconds from `earlier` to `self`.
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        (self.0 as i128 - earlier.0 as i128) as f64 / 1e6
    }

    /// Offset this timestamp by `secs` seconds, rounded to the nearest microsecond.
    pub fn offset_secs(self, secs: f64) -> Self {
        let micros = self.0 as f64 + secs * 1e6;
        Self(micros.round().max(0.) as u64)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Self::Output {
        Self(self.0.saturating_add(duration.as_micros() as u64))
    }
}

/// Read the current time from `clock`.
pub fn now<C>(clock: &C) -> Result<Timestamp>
where
    C: Clock,
    u64: TryFrom<C::T>,
{
    let instant = clock.try_now()?;
    let micros = Microseconds::<u64>::try_from(instant.duration_since_epoch())?;
    Ok(Timestamp(micros.0))
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a simulation can advance the clock
/// handed to the coordinator.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            micros: Arc::new(AtomicU64::new(start.as_micros())),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.micros.store(time.as_micros(), Ordering::SeqCst);
    }

    pub fn advance(&self, duration: Duration) {
        self.micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn timestamp(&self) -> Timestamp {
        Timestamp(self.micros.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    type T = u64;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> core::result::Result<Instant<Self>, clock::Error> {
        Ok(Instant::new(self.micros.load(Ordering::SeqCst)))
    }
}

#[cfg(test)]
mod tests {
    use super::{now, ManualClock, Timestamp};
    use core::time::Duration;

    #[test]
    fn manual_clock_reads_back_through_embedded_time() {
        let clock = ManualClock::new(Timestamp::from_micros(1_500));
        assert_eq!(now(&clock).unwrap(), Timestamp::from_micros(1_500));

        clock.advance(Duration::from_millis(2));
        assert_eq!(now(&clock).unwrap(), Timestamp::from_micros(3_500));
    }

    #[test]
    fn offsets_round_to_microseconds() {
        let start = Timestamp::from_secs_f64(10.);
        assert_eq!(start.offset_secs(0.5).as_micros(), 10_500_000);
        assert_eq!(start.offset_secs(1e-7), start);
        assert_eq!((start + Duration::from_secs(1)).as_micros(), 11_000_000);
    }

    #[test]
    fn seconds_since_is_signed() {
        let a = Timestamp::from_secs_f64(1.);
        let b = Timestamp::from_secs_f64(1.25);
        assert_eq!(b.seconds_since(a), 0.25);
        assert_eq!(a.seconds_since(b), -0.25);
    }
}
