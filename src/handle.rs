//! Cancellation handles.
//!
//! Every wait/observe/poll operation that keeps running after it returns
//! hands back a [`WatchHandle`]. The handle owns the resources of the
//! operation (provider subscriptions, spawned timers, nested handles) and
//! releases all of them on the first [`cancel`](WatchHandle::cancel).
//!
//! # Guarantees
//!
//! - `cancel()` is idempotent and safe after natural completion.
//! - Once `cancel()` returns, no callback of that watch runs again. Record
//!   dispatch checks [`WatchHandle::is_cancelled`] before every record, so a
//!   batch the provider captured before disconnection is dropped too.
//! - A resource attached after cancellation is released immediately. This
//!   is what stops a late second stage (for example, an element found after
//!   the caller gave up) from ever starting.
//!
//! Dropping a handle does not cancel the watch.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::dom::Subscription;
use crate::identifiers::WatchId;

// ============================================================================
// Cancel
// ============================================================================

/// Uniform cancellation contract of every cancelable operation.
pub trait Cancel {
    /// Stops the operation and releases its resources. Idempotent.
    fn cancel(&self);

    /// Returns `true` once the operation is stopped for any reason.
    fn is_cancelled(&self) -> bool;
}

// ============================================================================
// Resource
// ============================================================================

/// Something a watch must release when it stops.
pub(crate) enum Resource {
    /// Provider change subscription.
    Subscription(Subscription),
    /// Spawned tokio task (discovery, timer, poll loop).
    Task(AbortHandle),
    /// Nested watch.
    Child(WatchHandle),
    /// Arbitrary teardown step.
    Hook(Box<dyn FnOnce() + Send>),
}

impl Resource {
    fn release(self) {
        match self {
            Self::Subscription(subscription) => subscription.disconnect(),
            Self::Task(task) => task.abort(),
            Self::Child(child) => child.cancel(),
            Self::Hook(hook) => hook(),
        }
    }
}

// ============================================================================
// WatchHandle
// ============================================================================

/// Internal shared state for a handle.
struct HandleInner {
    id: WatchId,
    operation: &'static str,
    stopped: AtomicBool,
    resources: Mutex<Vec<Resource>>,
}

/// Cancellation token for one logical watch.
///
/// Cheap to clone; all clones control the same watch.
///
/// # Example
///
/// ```ignore
/// let handle = watcher.observe_selector("#cart", |el, record| {
///     println!("{el}: {:?}", record.kind);
/// }, ObserveOptions::new())?;
///
/// handle.cancel();
/// handle.cancel(); // no-op
/// ```
#[derive(Clone)]
pub struct WatchHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.inner.id)
            .field("operation", &self.inner.operation)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl WatchHandle {
    /// Creates a live handle for `operation` (used in logs).
    pub(crate) fn new(operation: &'static str) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: WatchId::generate(),
                operation,
                stopped: AtomicBool::new(false),
                resources: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the watch ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WatchId {
        self.inner.id
    }

    /// Returns the name of the operation this handle controls.
    #[inline]
    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.inner.operation
    }

    /// Stops the watch and releases its resources. Idempotent.
    pub fn cancel(&self) {
        if self.stop() {
            debug!(watch_id = %self.inner.id, operation = self.inner.operation, "Watch cancelled");
        }
    }

    /// Returns `true` once the watch is stopped.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stops the watch; returns `true` only for the call that stopped it.
    ///
    /// Timeouts and manual cancellation both go through here, so exactly
    /// one of them wins.
    pub(crate) fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        let resources = mem::take(&mut *self.inner.resources.lock());
        for resource in resources {
            resource.release();
        }
        true
    }

    /// Hands `resource` to the watch, or releases it now if already stopped.
    pub(crate) fn attach(&self, resource: Resource) {
        {
            let mut resources = self.inner.resources.lock();
            if !self.is_cancelled() {
                resources.push(resource);
                return;
            }
        }
        resource.release();
    }
}

impl Cancel for WatchHandle {
    fn cancel(&self) {
        WatchHandle::cancel(self);
    }

    fn is_cancelled(&self) -> bool {
        WatchHandle::is_cancelled(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
