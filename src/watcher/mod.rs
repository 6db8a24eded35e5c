//! Selector waiting and observation.
//!
//! A [`Watcher`] pairs a document provider with a default [`Root`](crate::Root).
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Watcher struct, accessors, shared watch plumbing |
//! | `wait` | One-shot waits for one or many elements |
//! | `observe` | Continuous observation of a single target |
//! | `observe_all` | Continuous observation of every matching element |
//! | `options` | [`ObserveOptions`] |
//!
//! # Example
//!
//! ```ignore
//! let watcher = Watcher::new(document.clone());
//!
//! // One-shot
//! let button = watcher.wait_for_element("#checkout").await?;
//!
//! // Continuous, late-binding
//! let handle = watcher.observe_selector(
//!     "#cart-count",
//!     |el, record| println!("{el} changed: {:?}", record.kind),
//!     ObserveOptions::new().with_timeout(Duration::from_secs(30)),
//! )?;
//!
//! // Every match, including future ones
//! let items =
//!     watcher.observe_selectors(".cart-item", |el, _| refresh(el), ObserveOptions::new())?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod core;
mod observe;
mod observe_all;
mod options;
mod wait;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Watcher;
pub(crate) use self::core::current_runtime;
pub use observe_all::SelectorsWatch;
pub use options::ObserveOptions;
