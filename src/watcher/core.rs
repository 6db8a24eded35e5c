//! Core Watcher struct, accessors and shared watch plumbing.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::callback::{RecordCallback, invoke_guarded};
use crate::dom::{Dom, MutationKindSet, MutationRecord, Root, Subscription};
use crate::error::{Error, Result};
use crate::handle::{Resource, WatchHandle};
use crate::identifiers::ElementId;

use super::ObserveOptions;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a watcher.
pub(crate) struct WatcherInner {
    /// Document provider.
    pub dom: Arc<dyn Dom>,
    /// Default scope of every operation.
    pub root: Root,
}

// ============================================================================
// Watcher
// ============================================================================

/// Entry point for waiting on and observing elements.
///
/// Every operation is scoped to the watcher's root, which defaults to the
/// whole document. Use [`Watcher::with_root`] for a scoped copy.
#[derive(Clone)]
pub struct Watcher {
    pub(crate) inner: Arc<WatcherInner>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("root", &self.inner.root)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a document-scoped watcher over `dom`.
    pub fn new(dom: impl Dom) -> Self {
        Self::from_shared(Arc::new(dom))
    }

    /// Creates a document-scoped watcher over a shared provider.
    pub fn from_shared(dom: Arc<dyn Dom>) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                dom,
                root: Root::Document,
            }),
        }
    }

    /// Returns a watcher over the same provider scoped to `root`.
    #[must_use]
    pub fn with_root(&self, root: impl Into<Root>) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                dom: Arc::clone(&self.inner.dom),
                root: root.into(),
            }),
        }
    }
}

// ============================================================================
// Watcher - Accessors
// ============================================================================

impl Watcher {
    /// Returns the scope of this watcher.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Root {
        self.inner.root
    }

    /// Returns the document provider.
    #[inline]
    #[must_use]
    pub fn dom(&self) -> &Arc<dyn Dom> {
        &self.inner.dom
    }
}

// ============================================================================
// Shared Plumbing
// ============================================================================

/// Returns the current tokio runtime.
pub(crate) fn current_runtime() -> Result<Handle> {
    Handle::try_current().map_err(|_| Error::RuntimeUnavailable)
}

/// Schedules the observer timeout, if configured.
///
/// The timer cancels the watch first and runs `on_timeout` only if it was
/// the one that stopped it.
pub(crate) fn arm_timeout(runtime: &Handle, handle: &WatchHandle, options: &ObserveOptions) {
    let Some(duration) = options.timeout else {
        return;
    };

    let deadline = Instant::now() + duration;
    let on_timeout = options.on_timeout.clone();
    let timer_handle = handle.clone();
    let task = runtime.spawn(async move {
        sleep_until(deadline).await;
        if !timer_handle.stop() {
            return;
        }
        debug!(
            watch_id = %timer_handle.id(),
            timeout_ms = duration.as_millis() as u64,
            "Watch timed out"
        );
        if let Some(on_timeout) = on_timeout {
            invoke_guarded(timer_handle.id(), "on_timeout", || on_timeout());
        }
    });
    handle.attach(Resource::Task(task.abort_handle()));
}

/// Subscribes to `element` and forwards each record to `callback`.
///
/// Delivery stops at the first record for which any of `guards` is
/// cancelled; `guards[0]` names the watch in logs.
pub(crate) fn watch_element(
    dom: &dyn Dom,
    element: ElementId,
    kinds: &MutationKindSet,
    callback: RecordCallback,
    guards: Vec<WatchHandle>,
) -> Result<Subscription> {
    let Some(watch_id) = guards.first().map(WatchHandle::id) else {
        return Err(Error::invalid_argument("watch_element needs a guard handle"));
    };

    let subscription = dom.observe(
        &Root::Element(element),
        kinds,
        Arc::new(move |records: Vec<MutationRecord>| {
            trace!(%watch_id, %element, records = records.len(), "Dispatching records");
            for record in &records {
                if guards.iter().any(WatchHandle::is_cancelled) {
                    trace!(%watch_id, %element, "Dropping records after cancellation");
                    return;
                }
                invoke_guarded(watch_id, "record", || callback(&element, record));
            }
        }),
    )?;

    debug!(%watch_id, %element, "Watching element");
    Ok(subscription)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::dom::MemoryDocument;

    #[test]
    fn test_watcher_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Watcher>();
    }

    #[test]
    fn test_watcher_is_debug() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<Watcher>();
    }

    #[test]
    fn test_with_root_shares_provider() {
        let watcher = Watcher::new(MemoryDocument::new());
        let scoped = watcher.with_root(ElementId::new(1));

        assert_eq!(watcher.root(), Root::Document);
        assert_eq!(scoped.root(), Root::Element(ElementId::new(1)));
        assert!(Arc::ptr_eq(watcher.dom(), scoped.dom()));
    }

    #[test]
    fn test_current_runtime_outside_tokio() {
        assert!(matches!(current_runtime(), Err(Error::RuntimeUnavailable)));
    }
}
