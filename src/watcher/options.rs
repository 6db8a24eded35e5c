//! Observer configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use element_watch::{MutationKindSet, ObserveOptions};
//!
//! let options = ObserveOptions::new()
//!     .with_kinds(MutationKindSet::new().with_attribute_filter(["class"]))
//!     .with_timeout(Duration::from_secs(10))
//!     .on_timeout(|| eprintln!("variant never rendered"));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::callback::TimeoutCallback;
use crate::dom::MutationKindSet;

// ============================================================================
// ObserveOptions
// ============================================================================

/// Options shared by [`observe_selector`](crate::Watcher::observe_selector)
/// and [`observe_selectors`](crate::Watcher::observe_selectors).
#[derive(Clone)]
pub struct ObserveOptions {
    /// Change categories reported to the callback.
    pub kinds: MutationKindSet,

    /// Stop the whole watch this long after the observe call.
    pub timeout: Option<Duration>,

    /// Called once after the timeout cancelled the watch.
    pub on_timeout: Option<TimeoutCallback>,

    /// Keep watching elements that no longer match the selector.
    ///
    /// Only used by multi-target observation. Defaults to `true`: a
    /// per-element watch lives until the whole observer is cancelled.
    pub retain_unmatched: bool,
}

impl fmt::Debug for ObserveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveOptions")
            .field("kinds", &self.kinds)
            .field("timeout", &self.timeout)
            .field("on_timeout", &self.on_timeout.is_some())
            .field("retain_unmatched", &self.retain_unmatched)
            .finish()
    }
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ObserveOptions {
    /// Creates options with default kinds, no timeout, retaining unmatched.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            kinds: MutationKindSet::new(),
            timeout: None,
            on_timeout: None,
            retain_unmatched: true,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ObserveOptions {
    /// Sets the reported change categories.
    #[inline]
    #[must_use]
    pub fn with_kinds(mut self, kinds: MutationKindSet) -> Self {
        self.kinds = kinds;
        self
    }

    /// Sets the timeout, counted from the observe call.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the callback run after a timeout.
    #[inline]
    #[must_use]
    pub fn on_timeout(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(callback));
        self
    }

    /// Chooses whether elements that stop matching keep their watch.
    #[inline]
    #[must_use]
    pub fn with_retain_unmatched(mut self, retain: bool) -> Self {
        self.retain_unmatched = retain;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
