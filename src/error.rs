//! Error types for element-watch.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use element_watch::{Result, Watcher};
//!
//! async fn example(watcher: &Watcher) -> Result<()> {
//!     let banner = watcher.wait_for_element("#promo-banner").await?;
//!     println!("banner appeared: {banner}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Arguments | [`Error::InvalidSelector`], [`Error::InvalidRoot`], [`Error::InvalidArgument`] |
//! | Document | [`Error::ElementNotFound`] |
//! | Waiting | [`Error::Predicate`], [`Error::Timeout`] |
//! | Runtime | [`Error::RuntimeUnavailable`], [`Error::ChannelClosed`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::identifiers::ElementId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

/// Boxed error produced by a user predicate.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Absence of an element is never an error: waiters keep waiting until a
/// match appears or the caller gives up.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Argument Errors
    // ========================================================================
    /// Selector rejected by the document provider.
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector {
        /// The rejected selector.
        selector: String,
        /// Why the provider rejected it.
        message: String,
    },

    /// Root element is not a live container.
    #[error("Invalid root: element {element_id} is not in the document")]
    InvalidRoot {
        /// The missing root element.
        element_id: ElementId,
    },

    /// Invalid argument or option combination.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Document Errors
    // ========================================================================
    /// Element handle does not refer to a known element.
    #[error("Element not found: {element_id}")]
    ElementNotFound {
        /// The unknown element.
        element_id: ElementId,
    },

    // ========================================================================
    // Waiting Errors
    // ========================================================================
    /// A condition predicate failed.
    ///
    /// Returned once by [`try_wait_until`](crate::schedule::try_wait_until);
    /// the predicate is not checked again.
    #[error("Predicate failed: {source}")]
    Predicate {
        /// Error returned by the predicate.
        #[source]
        source: BoxError,
    },

    /// Operation timeout.
    ///
    /// Only produced by the `*_timeout` waiter helpers.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// Called outside of a tokio runtime.
    #[error("No tokio runtime available")]
    RuntimeUnavailable,

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid selector error.
    #[inline]
    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid root error.
    #[inline]
    pub fn invalid_root(element_id: ElementId) -> Self {
        Self::InvalidRoot { element_id }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an element not found error.
    #[inline]
    pub fn element_not_found(element_id: ElementId) -> Self {
        Self::ElementNotFound { element_id }
    }

    /// Creates a predicate failure.
    #[inline]
    pub fn predicate(source: impl Into<BoxError>) -> Self {
        Self::Predicate {
            source: source.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the caller passed something unusable.
    #[inline]
    #[must_use]
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSelector { .. } | Self::InvalidRoot { .. } | Self::InvalidArgument { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Error as IoError;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_selector("div[", "unterminated attribute");
        assert_eq!(
            err.to_string(),
            "Invalid selector 'div[': unterminated attribute"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("wait_for_element(#late)", 250);
        assert_eq!(err.to_string(), "Timeout after 250ms: wait_for_element(#late)");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_is_argument_error() {
        assert!(Error::invalid_root(ElementId::new(3)).is_argument_error());
        assert!(Error::invalid_argument("x").is_argument_error());
        assert!(!Error::RuntimeUnavailable.is_argument_error());
    }

    #[test]
    fn test_predicate_keeps_source() {
        let err = Error::predicate(IoError::other("check failed"));
        assert_eq!(err.to_string(), "Predicate failed: check failed");
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
