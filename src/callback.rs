//! Callback types and the panic boundary used when dispatching them.
//!
//! A callback that panics is logged and skipped; it never stops delivery of
//! later records or ticks and never cancels the watch it belongs to.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::error;

use crate::dom::MutationRecord;
use crate::identifiers::{ElementId, WatchId};

// ============================================================================
// Types
// ============================================================================

/// Per-record observer callback: `(observed element, record)`.
pub type RecordCallback = Arc<dyn Fn(&ElementId, &MutationRecord) + Send + Sync>;

/// Called once after an observer timed out and was cancelled.
pub type TimeoutCallback = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// Dispatch
// ============================================================================

/// Runs `f`, logging instead of unwinding if it panics.
///
/// Returns `false` if the callback panicked.
pub(crate) fn invoke_guarded(watch_id: WatchId, what: &'static str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(%watch_id, callback = what, %message, "Callback panicked");
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
