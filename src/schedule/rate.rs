//! Debounce and throttle wrappers.
//!
//! Both wrappers are cheap to clone; clones share one timer state while
//! separately created wrappers share nothing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep};
use tracing::trace;

use crate::error::Result;
use crate::watcher::current_runtime;

// ============================================================================
// Types
// ============================================================================

type Func<A> = Arc<dyn Fn(A) + Send + Sync>;

// ============================================================================
// Debounced
// ============================================================================

/// Pending-call state of a debounced function.
struct DebounceState<A> {
    /// Bumped on every call; a timer only fires for its own generation.
    generation: u64,
    timer: Option<AbortHandle>,
    args: Option<A>,
}

struct DebounceInner<A> {
    func: Func<A>,
    wait: Duration,
    immediate: bool,
    runtime: Handle,
    state: Mutex<DebounceState<A>>,
}

/// Function that runs only after calls have stopped for `wait`.
///
/// Created by [`debounce`].
pub struct Debounced<A> {
    inner: Arc<DebounceInner<A>>,
}

impl<A> Clone for Debounced<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Debounced<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("wait", &self.inner.wait)
            .field("immediate", &self.inner.immediate)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Wraps `func` so a burst of calls runs it once.
///
/// Every call restarts a `wait` timer. Without `immediate`, `func` runs
/// when the timer expires, with the arguments of the latest call. With
/// `immediate`, a call made while no timer is pending runs `func` right
/// away and the timer only marks the end of the burst.
///
/// # Errors
///
/// Returns [`Error::RuntimeUnavailable`](crate::Error::RuntimeUnavailable)
/// outside a tokio runtime.
///
/// # Example
///
/// ```ignore
/// let save = debounce(|text: String| store(text), Duration::from_millis(300), false)?;
/// for keystroke in input {
///     save.call(keystroke);
/// }
/// ```
pub fn debounce<A, F>(func: F, wait: Duration, immediate: bool) -> Result<Debounced<A>>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    let runtime = current_runtime()?;
    Ok(Debounced {
        inner: Arc::new(DebounceInner {
            func: Arc::new(func),
            wait,
            immediate,
            runtime,
            state: Mutex::new(DebounceState {
                generation: 0,
                timer: None,
                args: None,
            }),
        }),
    })
}

impl<A: Send + 'static> Debounced<A> {
    /// Registers a call, restarting the quiet period.
    pub fn call(&self, args: A) {
        let inner = &self.inner;
        let run_now = {
            let mut state = inner.state.lock();
            let leading = inner.immediate && state.timer.is_none();

            state.generation += 1;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }

            let run_now = if leading {
                Some(args)
            } else {
                if !inner.immediate {
                    state.args = Some(args);
                }
                None
            };

            let generation = state.generation;
            let timer_inner = Arc::clone(inner);
            let task = inner.runtime.spawn(async move {
                sleep(timer_inner.wait).await;
                timer_inner.expire(generation);
            });
            state.timer = Some(task.abort_handle());
            run_now
        };

        if let Some(args) = run_now {
            trace!("Debounced call on leading edge");
            (inner.func)(args);
        }
    }

    /// Drops the pending call, if any.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.args = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

impl<A> Debounced<A> {
    /// Returns `true` while the quiet period is running.
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }
}

impl<A> DebounceInner<A> {
    fn expire(&self, generation: u64) {
        let args = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.timer = None;
            state.args.take()
        };

        if let Some(args) = args {
            trace!("Debounced call on trailing edge");
            (self.func)(args);
        }
    }
}

// ============================================================================
// Throttled
// ============================================================================

struct ThrottleInner<A> {
    func: Func<A>,
    wait: Duration,
    window_start: Mutex<Option<Instant>>,
}

/// Function that runs at most once per `wait` window.
///
/// Created by [`throttle`].
pub struct Throttled<A> {
    inner: Arc<ThrottleInner<A>>,
}

impl<A> Clone for Throttled<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Throttled<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttled")
            .field("wait", &self.inner.wait)
            .finish_non_exhaustive()
    }
}

/// Wraps `func` so it runs on the first call of each `wait` window.
///
/// Calls inside an open window are dropped, never queued.
#[must_use]
pub fn throttle<A, F>(func: F, wait: Duration) -> Throttled<A>
where
    F: Fn(A) + Send + Sync + 'static,
{
    Throttled {
        inner: Arc::new(ThrottleInner {
            func: Arc::new(func),
            wait,
            window_start: Mutex::new(None),
        }),
    }
}

impl<A> Throttled<A> {
    /// Runs the function unless a window is open; returns whether it ran.
    pub fn call(&self, args: A) -> bool {
        let now = Instant::now();
        {
            let mut window_start = self.inner.window_start.lock();
            if let Some(start) = *window_start
                && now.duration_since(start) < self.inner.wait
            {
                trace!("Throttled call dropped");
                return false;
            }
            *window_start = Some(now);
        }

        (self.inner.func)(args);
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;

    const WAIT: Duration = Duration::from_millis(100);

    type Calls<A> = Arc<Mutex<Vec<(Instant, A)>>>;

    fn recorder<A: Send + 'static>() -> (Calls<A>, impl Fn(A) + Send + Sync + 'static) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, move |args: A| sink.lock().push((Instant::now(), args)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_runs_once_after_burst() {
        let (calls, func) = recorder::<u32>();
        let debounced = debounce(func, WAIT, false).unwrap();

        for i in 0..5 {
            debounced.call(i);
            sleep(WAIT / 2).await;
        }
        let last_call = Instant::now() - WAIT / 2;
        assert!(calls.lock().is_empty());
        assert!(debounced.is_pending());

        sleep(WAIT).await;

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, 4);
        assert_eq!(calls[0].0 - last_call, WAIT);
        assert!(!debounced.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_immediate_runs_on_leading_edge_only() {
        let (calls, func) = recorder::<u32>();
        let debounced = debounce(func, WAIT, true).unwrap();

        debounced.call(0);
        assert_eq!(calls.lock().len(), 1);

        for i in 1..5 {
            sleep(WAIT / 2).await;
            debounced.call(i);
        }
        sleep(WAIT * 3).await;

        assert_eq!(calls.lock().len(), 1);
        assert_eq!(calls.lock()[0].1, 0);

        debounced.call(9);
        assert_eq!(calls.lock().len(), 2);
        assert_eq!(calls.lock()[1].1, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_cancel_drops_pending_call() {
        let (calls, func) = recorder::<&'static str>();
        let debounced = debounce(func, WAIT, false).unwrap();

        debounced.call("draft");
        debounced.cancel();
        assert!(!debounced.is_pending());

        sleep(WAIT * 2).await;
        assert!(calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_clones_share_state() {
        let (calls, func) = recorder::<u32>();
        let a = debounce(func, WAIT, false).unwrap();
        let b = a.clone();

        a.call(1);
        sleep(WAIT / 2).await;
        b.call(2);
        sleep(WAIT * 2).await;

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_debouncers_are_independent() {
        let (calls, func) = recorder::<u32>();
        let func = Arc::new(func);
        let first = Arc::clone(&func);
        let a = debounce(move |v: u32| first(v), WAIT, false).unwrap();
        let b = debounce(move |v: u32| func(v), WAIT, false).unwrap();

        a.call(1);
        b.call(2);
        sleep(WAIT * 2).await;

        assert_eq!(calls.lock().len(), 2);
    }

    #[test]
    fn test_debounce_requires_runtime() {
        let err = debounce(|_: ()| {}, WAIT, false).unwrap_err();
        assert!(matches!(err, Error::RuntimeUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_drops_calls_inside_window() {
        let (calls, func) = recorder::<u32>();
        let throttled = throttle(func, WAIT);

        let mut ran = Vec::new();
        for i in 0..5 {
            ran.push(throttled.call(i));
            sleep(WAIT / 10).await;
        }
        assert_eq!(ran, vec![true, false, false, false, false]);
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(calls.lock()[0].1, 0);

        sleep(WAIT).await;
        assert!(throttled.call(5));

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_window_boundary_opens_new_window() {
        let (calls, func) = recorder::<u32>();
        let throttled = throttle(func, WAIT);

        assert!(throttled.call(0));
        sleep(WAIT).await;
        assert!(throttled.call(1));
        assert_eq!(calls.lock().len(), 2);
    }
}
