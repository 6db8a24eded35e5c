//! Repeating callbacks.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace};

use crate::callback::invoke_guarded;
use crate::error::{Error, Result};
use crate::handle::{Resource, WatchHandle};
use crate::watcher::current_runtime;

/// Calls `callback` every `delay`, starting one `delay` from now.
///
/// Ticks that fall behind are delayed rather than bunched up. Cancelling
/// the handle stops the loop, including a tick that is already due. A
/// panicking callback is logged and the loop keeps running.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if `delay` is zero
/// - [`Error::RuntimeUnavailable`] outside a tokio runtime
///
/// # Example
///
/// ```ignore
/// let handle = poll(|| refresh_badge(), Duration::from_secs(5))?;
/// // ...
/// handle.cancel();
/// ```
pub fn poll<F>(mut callback: F, delay: Duration) -> Result<WatchHandle>
where
    F: FnMut() + Send + 'static,
{
    if delay.is_zero() {
        return Err(Error::invalid_argument("poll delay must be non-zero"));
    }
    let runtime = current_runtime()?;

    let handle = WatchHandle::new("poll");
    let tick_handle = handle.clone();
    let start = Instant::now() + delay;

    let task = runtime.spawn(async move {
        let watch_id = tick_handle.id();
        let mut ticks = interval_at(start, delay);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;
            if tick_handle.is_cancelled() {
                break;
            }
            trace!(%watch_id, "Poll tick");
            invoke_guarded(watch_id, "poll", &mut callback);
        }
    });
    handle.attach(Resource::Task(task.abort_handle()));

    debug!(watch_id = %handle.id(), delay_ms = delay.as_millis() as u64, "Polling started");
    Ok(handle)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_four_ticks_in_220ms() {
        let start = Instant::now();
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ticks);

        let _handle =
            poll(move || sink.lock().push(Instant::now()), Duration::from_millis(50)).unwrap();
        sleep(Duration::from_millis(220)).await;

        let ticks = ticks.lock();
        assert_eq!(ticks.len(), 4);
        assert!(ticks[0] - start >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_further_ticks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let handle = poll(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(50),
        )
        .unwrap();

        sleep(Duration::from_millis(120)).await;
        handle.cancel();
        sleep(Duration::from_millis(500)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_keeps_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let _handle = poll(
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first tick fails");
                }
            },
            Duration::from_millis(10),
        )
        .unwrap();

        sleep(Duration::from_millis(35)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_is_rejected() {
        let err = poll(|| {}, Duration::ZERO).unwrap_err();
        assert!(err.is_argument_error());
    }

    #[test]
    fn test_requires_runtime() {
        let err = poll(|| {}, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, Error::RuntimeUnavailable));
    }
}
