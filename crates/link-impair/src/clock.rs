//! Monotonic time source for deadline arithmetic.
//!
//! Deadlines are flat `u64` microsecond counts, so ordering and differences
//! are plain integer operations. Wall-clock time is never involved: on
//! Linux the source is `CLOCK_MONOTONIC_RAW`, which NTP neither steps nor
//! slews; other platforms anchor an `Instant` at first use.

use std::time::Duration;

/// Current monotonic time in whole microseconds.
#[inline(always)]
pub fn now_us() -> u64 {
    monotonic_now().as_micros() as u64
}

#[cfg(target_os = "linux")]
fn monotonic_now() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid out-pointer, and CLOCK_MONOTONIC_RAW is
    // supported on every kernel this runs on.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts);
    }
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

#[cfg(not(target_os = "linux"))]
fn monotonic_now() -> Duration {
    use std::sync::OnceLock;
    use std::time::Instant;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed()
}

/// Whole milliseconds until `deadline_us`, rounded up; 0 once the deadline
/// has passed. Rounding up keeps a wait from expiring just short of the
/// deadline and spinning.
pub fn millis_until(deadline_us: u64, now_us: u64) -> u64 {
    deadline_us.saturating_sub(now_us).div_ceil(1_000)
}
