//! Document provider seam.
//!
//! Everything the watch layer needs from a page is behind the [`Dom`]
//! trait: two queries and one change-notification subscription.
//!
//! | Item | Description |
//! |------|-------------|
//! | [`Dom`] | Query and subscription provider |
//! | [`Subscription`] | Live change-notification registration |
//! | [`Selector`] / [`Root`] | What to match, and where |
//! | [`MutationRecord`] / [`MutationKindSet`] | Reported changes and their filter |
//! | [`MemoryDocument`] | In-memory provider |
//!
//! # Delivery contract
//!
//! Providers deliver records asynchronously, in batches: all records a
//! subscription collected during one synchronous run arrive in one call to
//! its [`BatchSink`], in the order they were produced. A sink is never
//! called from inside [`Dom::observe`] or from inside a mutating call.

// ============================================================================
// Submodules
// ============================================================================

mod matcher;
pub mod memory;
mod record;
mod selector;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::identifiers::{ElementId, SubscriptionId};

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::MemoryDocument;
pub use record::{MutationKind, MutationKindSet, MutationRecord};
pub use selector::{Root, Selector};

// ============================================================================
// Types
// ============================================================================

/// Receiver for one batch of change records.
pub type BatchSink = Arc<dyn Fn(Vec<MutationRecord>) + Send + Sync>;

/// Disconnect action run when a subscription ends.
type Disconnect = Box<dyn FnOnce() + Send>;

// ============================================================================
// Dom
// ============================================================================

/// A document-like provider.
///
/// Implementations must be cheap to call from inside a [`BatchSink`]:
/// the watch layer re-queries on every delivered batch.
pub trait Dom: Send + Sync + 'static {
    /// Returns the first element under `root` matching `selector`, in
    /// document order. The root itself is never a candidate.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSelector`](crate::Error::InvalidSelector) if the selector cannot be parsed
    /// - [`Error::InvalidRoot`](crate::Error::InvalidRoot) if the root element does not exist
    fn query_selector(&self, root: &Root, selector: &str) -> Result<Option<ElementId>>;

    /// Returns every element under `root` matching `selector`, in document
    /// order.
    ///
    /// # Errors
    ///
    /// Same as [`Dom::query_selector`].
    fn query_selector_all(&self, root: &Root, selector: &str) -> Result<Vec<ElementId>>;

    /// Subscribes `sink` to changes on `target` filtered by `kinds`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`](crate::Error::InvalidArgument) if `kinds` fails validation
    /// - [`Error::InvalidRoot`](crate::Error::InvalidRoot) if the target element does not exist
    fn observe(
        &self,
        target: &Root,
        kinds: &MutationKindSet,
        sink: BatchSink,
    ) -> Result<Subscription>;
}

// ============================================================================
// Subscription
// ============================================================================

/// A live change-notification registration.
///
/// Disconnects on [`Subscription::disconnect`] or on drop, whichever comes
/// first. Disconnecting stops new records from being collected; it does not
/// retract a batch the provider already captured.
pub struct Subscription {
    id: SubscriptionId,
    disconnect: Mutex<Option<Disconnect>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Subscription {
    /// Creates a subscription that runs `disconnect` exactly once.
    pub fn new(id: SubscriptionId, disconnect: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            disconnect: Mutex::new(Some(Box::new(disconnect))),
        }
    }

    /// Returns the provider-assigned ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns `true` until the subscription is disconnected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.disconnect.lock().is_some()
    }

    /// Stops collecting records. Idempotent.
    pub fn disconnect(&self) {
        let action = self.disconnect.lock().take();
        if let Some(action) = action {
            action();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// Tests
// ============================================================================
