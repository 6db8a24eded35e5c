//! Timer-driven helpers: rate limiting, condition waits and polling.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `rate` | [`debounce`] and [`throttle`] wrappers |
//! | `condition` | [`wait_until`] / [`try_wait_until`] |
//! | `poll` | Repeating callback with a [`WatchHandle`](crate::WatchHandle) |
//!
//! Everything here runs on tokio timers, so a paused test clock drives it
//! deterministically.

// ============================================================================
// Submodules
// ============================================================================

mod condition;
mod poll;
mod rate;

// ============================================================================
// Re-exports
// ============================================================================

pub use condition::{DEFAULT_CHECK_INTERVAL, try_wait_until, wait_until};
pub use poll::poll;
pub use rate::{Debounced, Throttled, debounce, throttle};
