//! Interval-checked condition waits.

use std::convert::Infallible;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{BoxError, Error, Result};

/// Check interval used when callers have no better value.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Waits until `predicate` returns `true`.
///
/// The predicate runs immediately, then once per `interval`. There is no
/// timeout; wrap the future in [`tokio::time::timeout`] to bound it.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `interval` is zero.
///
/// # Example
///
/// ```ignore
/// wait_until(|| ready.load(Ordering::SeqCst), DEFAULT_CHECK_INTERVAL).await?;
/// ```
pub async fn wait_until<P>(mut predicate: P, interval: Duration) -> Result<()>
where
    P: FnMut() -> bool,
{
    try_wait_until(|| Ok::<_, Infallible>(predicate()), interval).await
}

/// Waits until a fallible `predicate` returns `Ok(true)`.
///
/// The first `Err` ends the wait; the predicate is not called again.
///
/// # Errors
///
/// - [`Error::Predicate`] wrapping the predicate's error
/// - [`Error::InvalidArgument`] if `interval` is zero
pub async fn try_wait_until<P, E>(mut predicate: P, interval: Duration) -> Result<()>
where
    P: FnMut() -> std::result::Result<bool, E>,
    E: Into<BoxError>,
{
    if interval.is_zero() {
        return Err(Error::invalid_argument("check interval must be non-zero"));
    }

    let mut ticks = time::interval(interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut checks: u64 = 0;
    loop {
        ticks.tick().await;
        checks += 1;
        match predicate() {
            Ok(true) => {
                debug!(checks, "Condition met");
                return Ok(());
            }
            Ok(false) => trace!(checks, "Condition not met yet"),
            Err(e) => {
                let error = Error::predicate(e);
                debug!(checks, error = %error, "Condition check failed");
                return Err(error);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
