//! Exponential backoff schedule for transient adapter failures.

use std::time::Duration;

/// Default base delay before the first retry.
pub const RETRY_BACKOFF_BASE: Duration = Duration::from_secs(2);
/// Default upper bound on any single backoff delay.
pub const RETRY_BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Delay to sleep after `failures` consecutive transient failures.
///
/// Doubles from `base` per failure and saturates at `cap`. Zero failures
/// means no wait.
pub fn backoff_delay(failures: u32, base: Duration, cap: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let exponent = (failures - 1).min(16);
    base.saturating_mul(1u32 << exponent).min(cap)
}
