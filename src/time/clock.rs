//! Disciplined time source: a simulated battery-backed RTC kept in step
//! with a network time source, extrapolated to microsecond resolution
//! between one-second ticks.
//!
//! Grounded on `examples/original_source/src/ds3231_time.cpp`'s
//! `getTimestampMicros()` extrapolation and `keepRTCInSyncWithNTP` discipline
//! loop, re-expressed without hardware I2C access: `std::time::Instant`
//! stands in for the free-running microsecond counter the original firmware
//! reads between RTC seconds.

use std::time::{Duration, Instant};

/// Lower bound (inclusive) of a plausible UNIX second: 2020-01-01T00:00:00Z.
pub const PLAUSIBLE_MIN_UNIX_SEC: u32 = 1_577_836_800;
/// Upper bound (exclusive) of a plausible UNIX second: 2100-01-01T00:00:00Z.
pub const PLAUSIBLE_MAX_UNIX_SEC: u32 = 4_102_444_800;

/// Discipline only adjusts the RTC when the network delta exceeds this
/// many seconds, per spec.md §4.1.
const DISCIPLINE_THRESHOLD_SEC: i64 = 2;

/// Legacy "year-1999.12.30" sentinel a previous firmware generation
/// produced on a faulty clock read. Never generated here; recognized only
/// so the scheduler can refuse records that already carry it on disk.
pub const LEGACY_SENTINEL_TS_US: u64 = 943_920_000_000_000;

/// Models the external network time client. Mirrors the NTP collaborator's
/// real interface: `fetch_unix_seconds() -> Option<u32>`.
pub trait TimeSource {
    /// Attempt one network time fetch. `None` on any failure (timeout, no
    /// link, malformed response) — the caller never sees *why*.
    fn fetch_unix_seconds(&mut self) -> Option<u32>;
}

/// `(rtc_present, rtc_valid, last_rtc_sec, last_rtc_micro_snap)` exactly as
/// spec.md's `ClockState` tuple.
#[derive(Debug, Clone, Copy)]
pub struct ClockState {
    pub rtc_present: bool,
    pub rtc_valid: bool,
    pub last_rtc_sec: u32,
    pub last_rtc_micro_snap: Option<Instant>,
}

impl ClockState {
    const fn absent() -> Self {
        Self {
            rtc_present: false,
            rtc_valid: false,
            last_rtc_sec: 0,
            last_rtc_micro_snap: None,
        }
    }
}

/// Outcome of one `discipline_with` call, for event-log reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisciplineOutcome {
    pub applied: bool,
    pub delta_sec: i64,
}

/// Battery-backed RTC model disciplined by a network time source.
///
/// Corresponds to spec.md's Clock component (C1). `rtc_present` starts
/// `false` — per `examples/original_source/src/ds3231_time.cpp`'s
/// `lostPower()` check, a node that has never been set boots with a present
/// but un-disciplined RTC; here we model the more conservative "was there a
/// previous power cycle at all" case by letting the caller choose.
pub struct Clock {
    state: ClockState,
    monotonic_origin: Instant,
}

impl Clock {
    /// Construct a clock. `rtc_present` reflects whether the RTC hardware
    /// responded at boot; it does not imply the time it holds is valid.
    #[must_use]
    pub fn new(rtc_present: bool) -> Self {
        Self {
            state: ClockState {
                rtc_present,
                ..ClockState::absent()
            },
            monotonic_origin: Instant::now(),
        }
    }

    /// A UNIX second is plausible iff it falls within [2020-01-01, 2100-01-01).
    #[must_use]
    pub const fn is_plausible(sec: u32) -> bool {
        sec >= PLAUSIBLE_MIN_UNIX_SEC && sec < PLAUSIBLE_MAX_UNIX_SEC
    }

    /// Whether the clock currently holds a disciplined, plausible time.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.state.rtc_valid
    }

    #[must_use]
    pub const fn state(&self) -> ClockState {
        self.state
    }

    /// Unconditionally set the RTC from a plausible UNIX second. Returns
    /// `false` (no-op) if the value is implausible.
    pub fn set_from_unix(&mut self, sec: u32) -> bool {
        if !Self::is_plausible(sec) {
            return false;
        }
        self.state.rtc_present = true;
        self.state.rtc_valid = true;
        self.state.last_rtc_sec = sec;
        self.state.last_rtc_micro_snap = Some(Instant::now());
        true
    }

    /// Apply one network time discipline fetch. Per spec.md §4.1: if the
    /// RTC is not valid, the value is adopted unconditionally; if it is
    /// valid, it is only adopted when the delta exceeds
    /// [`DISCIPLINE_THRESHOLD_SEC`]. Returns `None` when `ntp_unix` is
    /// implausible (the fetch is simply ignored).
    pub fn discipline_with(&mut self, ntp_unix: u32) -> Option<DisciplineOutcome> {
        if !Self::is_plausible(ntp_unix) {
            return None;
        }
        if !self.state.rtc_valid {
            self.set_from_unix(ntp_unix);
            return Some(DisciplineOutcome {
                applied: true,
                delta_sec: 0,
            });
        }
        let delta = i64::from(ntp_unix) - i64::from(self.state.last_rtc_sec);
        if delta.abs() > DISCIPLINE_THRESHOLD_SEC {
            self.set_from_unix(ntp_unix);
            Some(DisciplineOutcome {
                applied: true,
                delta_sec: delta,
            })
        } else {
            Some(DisciplineOutcome {
                applied: false,
                delta_sec: delta,
            })
        }
    }

    /// Best-effort monotonic UNIX microseconds. Returns 0 when the RTC is
    /// not valid — callers must fall back to [`Self::monotonic_us`] for
    /// journaling, never for live upload (spec.md §4.1).
    pub fn now_us(&mut self) -> u64 {
        if !self.state.rtc_valid {
            return 0;
        }
        let Some(snap) = self.state.last_rtc_micro_snap else {
            return 0;
        };
        let elapsed = snap.elapsed();
        let elapsed_secs = elapsed.as_secs();
        let micros_into_sec = u64::from(elapsed.subsec_micros()).min(999_999);

        if elapsed_secs > 0 {
            self.state.last_rtc_sec = self.state.last_rtc_sec.saturating_add(
                u32::try_from(elapsed_secs).unwrap_or(u32::MAX),
            );
            self.state.last_rtc_micro_snap = Some(snap + Duration::from_secs(elapsed_secs));
        }

        u64::from(self.state.last_rtc_sec) * 1_000_000 + micros_into_sec
    }

    /// Local monotonic microsecond source, for journaling samples while
    /// the RTC is not valid. Never fed to live upload.
    pub fn monotonic_us(&self) -> u64 {
        u64::try_from(self.monotonic_origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn implausible_values_rejected() {
        assert!(!Clock::is_plausible(0));
        assert!(!Clock::is_plausible(PLAUSIBLE_MIN_UNIX_SEC - 1));
        assert!(!Clock::is_plausible(PLAUSIBLE_MAX_UNIX_SEC));
        assert!(Clock::is_plausible(PLAUSIBLE_MIN_UNIX_SEC));
        assert!(Clock::is_plausible(PLAUSIBLE_MAX_UNIX_SEC - 1));
    }

    #[test]
    fn now_us_is_zero_while_invalid() {
        let mut clock = Clock::new(false);
        assert!(!clock.is_valid());
        assert_eq!(clock.now_us(), 0);
    }

    #[test]
    fn set_from_unix_rejects_implausible() {
        let mut clock = Clock::new(true);
        assert!(!clock.set_from_unix(5));
        assert!(!clock.is_valid());
    }

    #[test]
    fn discipline_adopts_unconditionally_when_invalid() {
        let mut clock = Clock::new(true);
        let outcome = clock
            .discipline_with(PLAUSIBLE_MIN_UNIX_SEC + 100)
            .expect("plausible");
        assert!(outcome.applied);
        assert!(clock.is_valid());
    }

    #[test]
    fn discipline_ignores_small_delta_when_valid() {
        let mut clock = Clock::new(true);
        clock.set_from_unix(PLAUSIBLE_MIN_UNIX_SEC + 1000);
        let outcome = clock
            .discipline_with(PLAUSIBLE_MIN_UNIX_SEC + 1001)
            .expect("plausible");
        assert!(!outcome.applied);
        assert_eq!(outcome.delta_sec, 1);
    }

    #[test]
    fn discipline_adopts_large_delta_when_valid() {
        let mut clock = Clock::new(true);
        clock.set_from_unix(PLAUSIBLE_MIN_UNIX_SEC + 1000);
        let outcome = clock
            .discipline_with(PLAUSIBLE_MIN_UNIX_SEC + 1010)
            .expect("plausible");
        assert!(outcome.applied);
        assert_eq!(outcome.delta_sec, 10);
    }

    #[test]
    fn discipline_ignores_implausible_fetch() {
        let mut clock = Clock::new(true);
        clock.set_from_unix(PLAUSIBLE_MIN_UNIX_SEC + 1000);
        assert!(clock.discipline_with(10).is_none());
    }

    #[test]
    fn now_us_is_monotonic_non_decreasing() {
        let mut clock = Clock::new(true);
        clock.set_from_unix(PLAUSIBLE_MIN_UNIX_SEC + 2000);
        let first = clock.now_us();
        sleep(Duration::from_millis(5));
        let second = clock.now_us();
        assert!(second >= first);
    }

    #[test]
    fn monotonic_us_advances_without_valid_rtc() {
        let clock = Clock::new(false);
        let first = clock.monotonic_us();
        sleep(Duration::from_millis(2));
        let second = clock.monotonic_us();
        assert!(second >= first);
    }

    #[test]
    fn legacy_sentinel_matches_spec_literal() {
        assert_eq!(LEGACY_SENTINEL_TS_US, 943_920_000_000_000);
    }
}
