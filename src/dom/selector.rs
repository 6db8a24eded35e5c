//! Element selectors and roots.
//!
//! A [`Selector`] is either a query string handed to the document provider
//! or an element that is already resolved. A [`Root`] scopes matching.
//!
//! # Example
//!
//! ```ignore
//! use element_watch::{Root, Selector};
//!
//! // Query string (default conversion)
//! let banner: Selector = "#promo-banner".into();
//!
//! // Already resolved element
//! let known: Selector = element_id.into();
//!
//! // Scoped matching
//! let scoped = watcher.with_root(Root::Element(container));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifiers::ElementId;

// ============================================================================
// Selector
// ============================================================================

/// What to wait for or observe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Selector {
    /// Query string, re-evaluated on every check.
    ///
    /// # Example
    /// ```ignore
    /// Selector::Css("#login-button".into())
    /// Selector::Css("ul.results > li".into())
    /// Selector::Css("[data-variant='b']".into())
    /// ```
    #[serde(rename = "css")]
    Css(String),

    /// Element resolved ahead of time; used as-is.
    #[serde(rename = "element")]
    Element(ElementId),
}

impl Selector {
    /// Creates a query selector.
    #[inline]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Returns the query string, if this is not a resolved element.
    #[inline]
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Css(query) => Some(query),
            Self::Element(_) => None,
        }
    }

    /// Returns the resolved element, if any.
    #[inline]
    #[must_use]
    pub fn resolved(&self) -> Option<ElementId> {
        match self {
            Self::Css(_) => None,
            Self::Element(id) => Some(*id),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(query) => f.write_str(query),
            Self::Element(id) => write!(f, "{id}"),
        }
    }
}

// ============================================================================
// From implementations for ergonomics
// ============================================================================

impl From<&str> for Selector {
    /// Converts a string to a query selector (default).
    fn from(s: &str) -> Self {
        Self::Css(s.to_string())
    }
}

impl From<String> for Selector {
    /// Converts a string to a query selector (default).
    fn from(s: String) -> Self {
        Self::Css(s)
    }
}

impl From<&String> for Selector {
    fn from(s: &String) -> Self {
        Self::Css(s.clone())
    }
}

impl From<ElementId> for Selector {
    fn from(id: ElementId) -> Self {
        Self::Element(id)
    }
}

// ============================================================================
// Root
// ============================================================================

/// Scope within which matching and observation happen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Root {
    /// The whole document.
    #[default]
    Document,

    /// A container element.
    Element(ElementId),
}

impl From<ElementId> for Root {
    fn from(id: ElementId) -> Self {
        Self::Element(id)
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Element(id) => write!(f, "{id}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
