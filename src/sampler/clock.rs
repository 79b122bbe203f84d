//! Clock source for the firing context
//!
//! Uses CLOCK_MONOTONIC for timestamps and `clock_nanosleep(TIMER_ABSTIME)`
//! for absolute wake-ups, so a sleep never returns before its deadline.

use std::time::Duration;

use crate::models::Timestamp;

/// Monotonic time plus a "wake at or after T" primitive.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Block the calling thread until `deadline` has passed.
    fn sleep_until(&self, deadline: Timestamp);

    fn resolution(&self) -> Duration;
}

/// CLOCK_MONOTONIC via libc
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock
    }
}

impl ClockSource for MonotonicClock {
    fn now(&self) -> Timestamp {
        let ts: libc::timespec = unsafe {
            let mut ts = std::mem::zeroed::<libc::timespec>();
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
            ts
        };
        timespec_to_timestamp(&ts)
    }

    fn sleep_until(&self, deadline: Timestamp) {
        let target = timestamp_to_timespec(deadline);
        loop {
            let ret = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_MONOTONIC,
                    libc::TIMER_ABSTIME,
                    &target,
                    std::ptr::null_mut(),
                )
            };
            // clock_nanosleep returns the error number directly
            if ret != libc::EINTR {
                break;
            }
        }
    }

    fn resolution(&self) -> Duration {
        let ts: libc::timespec = unsafe {
            let mut ts = std::mem::zeroed::<libc::timespec>();
            libc::clock_getres(libc::CLOCK_MONOTONIC, &mut ts);
            ts
        };
        Duration::from_nanos(timespec_to_timestamp(&ts).as_nanos())
    }
}

/// Helper: Convert a timespec to a nanosecond timestamp.
/// Negative fields clamp to zero.
fn timespec_to_timestamp(ts: &libc::timespec) -> Timestamp {
    let secs = (ts.tv_sec as i64).max(0) as u64;
    let nanos = (ts.tv_nsec as i64).max(0) as u64;
    Timestamp::from_nanos(secs.saturating_mul(1_000_000_000).saturating_add(nanos))
}

/// Helper: Convert a nanosecond timestamp to a timespec.
fn timestamp_to_timespec(t: Timestamp) -> libc::timespec {
    let nanos = t.as_nanos();
    libc::timespec {
        tv_sec: (nanos / 1_000_000_000) as libc::time_t,
        tv_nsec: (nanos % 1_000_000_000) as libc::c_long,
    }
}
