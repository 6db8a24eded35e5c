//! Element Watch - Waiting on and observing DOM elements.
//!
//! This library provides async primitives for reacting to elements that
//! appear, change, or never show up in a mutation-observable document.
//!
//! # Architecture
//!
//! Operations are written against the [`Dom`] trait: query one, query all,
//! and subscribe to batches of [`MutationRecord`]s. [`MemoryDocument`] is
//! the bundled in-memory provider.
//!
//! Key design principles:
//!
//! - Every operation is scoped to an explicit [`Root`], defaulting to the
//!   whole document
//! - Anything that keeps running returns a [`WatchHandle`]; cancellation is
//!   synchronous and idempotent
//! - Records are dispatched one at a time and checked against the handle,
//!   so nothing is delivered after `cancel()` returns
//! - Timers run on tokio, so tests drive them with a paused clock
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use element_watch::{MemoryDocument, ObserveOptions, Result, Watcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let document = MemoryDocument::new();
//!     let watcher = Watcher::new(document.clone());
//!
//!     // Observe a widget that may render later
//!     let handle = watcher.observe_selector(
//!         "#chat-widget",
//!         |element, record| println!("{element}: {:?}", record.kind),
//!         ObserveOptions::new().with_timeout(Duration::from_secs(10)),
//!     )?;
//!
//!     document.append_new(document.body(), "div", &[("id", "chat-widget")])?;
//!     let widget = watcher.wait_for_element("#chat-widget").await?;
//!     println!("widget is {widget}");
//!
//!     handle.cancel();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`watcher`] | [`Watcher`]: element waits and observers |
//! | [`schedule`] | Debounce, throttle, condition waits, polling |
//! | [`handle`] | [`WatchHandle`] and the [`Cancel`] trait |
//! | [`dom`] | Provider seam and [`MemoryDocument`] |
//! | [`callback`] | Callback type aliases |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Callback type aliases and the panic boundary.
pub mod callback;

/// Document provider seam.
///
/// - [`Dom`] - query and subscription trait
/// - [`MemoryDocument`] - in-memory provider
pub mod dom;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Cancellation handles.
pub mod handle;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Timer-driven helpers.
pub mod schedule;

/// Element waits and observers.
pub mod watcher;

// ============================================================================
// Re-exports
// ============================================================================

// Watcher types
pub use watcher::{ObserveOptions, SelectorsWatch, Watcher};

// Handle types
pub use handle::{Cancel, WatchHandle};

// Provider types
pub use dom::{
    BatchSink, Dom, MemoryDocument, MutationKind, MutationKindSet, MutationRecord, Root, Selector,
    Subscription,
};

// Schedule helpers
pub use schedule::{
    DEFAULT_CHECK_INTERVAL, Debounced, Throttled, debounce, poll, throttle, try_wait_until,
    wait_until,
};

// Callback types
pub use callback::{RecordCallback, TimeoutCallback};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ElementId, SubscriptionId, WatchId};
