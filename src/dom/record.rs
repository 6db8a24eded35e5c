//! Mutation records and observation configuration.
//!
//! [`MutationKindSet`] follows the shape of the platform's observer init
//! dictionary, so it round-trips through JSON configuration unchanged:
//!
//! ```json
//! { "childList": true, "attributes": true, "subtree": true,
//!   "attributeFilter": ["class", "hidden"] }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::ElementId;

// ============================================================================
// MutationKind
// ============================================================================

/// Category of a single reported change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    /// Children were added or removed.
    ChildList,
    /// An attribute changed.
    Attributes,
    /// Text content changed.
    CharacterData,
}

// ============================================================================
// MutationRecord
// ============================================================================

/// One reported change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    /// What changed.
    pub kind: MutationKind,

    /// Node the change happened on.
    pub target: ElementId,

    /// Elements inserted into `target` (child-list records).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<ElementId>,

    /// Elements removed from `target` (child-list records).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<ElementId>,

    /// Changed attribute (attribute records).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_name: Option<String>,

    /// Prior attribute value or text, when the matching old-value flag is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
}

impl MutationRecord {
    /// Creates a child-list record.
    #[must_use]
    pub fn child_list(target: ElementId, added: Vec<ElementId>, removed: Vec<ElementId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added,
            removed,
            attribute_name: None,
            old_value: None,
        }
    }

    /// Creates an attribute record.
    #[must_use]
    pub fn attribute(
        target: ElementId,
        name: impl Into<String>,
        old_value: Option<String>,
    ) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute_name: Some(name.into()),
            old_value,
        }
    }

    /// Creates a character-data record.
    #[must_use]
    pub fn character_data(target: ElementId, old_value: Option<String>) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute_name: None,
            old_value,
        }
    }
}

// ============================================================================
// MutationKindSet
// ============================================================================

/// Which change categories a watch reports.
///
/// Defaults: child-list, attributes and subtree on; character data and both
/// old-value flags off; every attribute reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MutationKindSet {
    /// Report child insertions and removals.
    pub child_list: bool,

    /// Report attribute changes.
    pub attributes: bool,

    /// Report text changes.
    pub character_data: bool,

    /// Extend observation to all descendants of the target.
    pub subtree: bool,

    /// Include the prior attribute value in attribute records.
    pub attribute_old_value: bool,

    /// Include the prior text in character-data records.
    pub character_data_old_value: bool,

    /// Restrict attribute records to these names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_filter: Option<Vec<String>>,
}

impl Default for MutationKindSet {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl MutationKindSet {
    /// Creates the default set (child-list, attributes, subtree).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            child_list: true,
            attributes: true,
            character_data: false,
            subtree: true,
            attribute_old_value: false,
            character_data_old_value: false,
            attribute_filter: None,
        }
    }

    /// Creates the set used for element discovery (child-list, subtree).
    #[inline]
    #[must_use]
    pub const fn discovery() -> Self {
        Self {
            child_list: true,
            attributes: false,
            character_data: false,
            subtree: true,
            attribute_old_value: false,
            character_data_old_value: false,
            attribute_filter: None,
        }
    }

    /// Parses a set from its JSON form and validates it.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not a valid set
    /// - [`Error::InvalidArgument`] if the flags are inconsistent
    pub fn from_json(json: &str) -> Result<Self> {
        let kinds: Self = serde_json::from_str(json)?;
        kinds.validate()?;
        Ok(kinds)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl MutationKindSet {
    /// Enables or disables child-list records.
    #[inline]
    #[must_use]
    pub fn with_child_list(mut self, enabled: bool) -> Self {
        self.child_list = enabled;
        self
    }

    /// Enables or disables attribute records.
    #[inline]
    #[must_use]
    pub fn with_attributes(mut self, enabled: bool) -> Self {
        self.attributes = enabled;
        self
    }

    /// Enables or disables character-data records.
    #[inline]
    #[must_use]
    pub fn with_character_data(mut self, enabled: bool) -> Self {
        self.character_data = enabled;
        self
    }

    /// Enables or disables descendant observation.
    #[inline]
    #[must_use]
    pub fn with_subtree(mut self, enabled: bool) -> Self {
        self.subtree = enabled;
        self
    }

    /// Enables or disables prior attribute values.
    #[inline]
    #[must_use]
    pub fn with_attribute_old_value(mut self, enabled: bool) -> Self {
        self.attribute_old_value = enabled;
        self
    }

    /// Enables or disables prior text values.
    #[inline]
    #[must_use]
    pub fn with_character_data_old_value(mut self, enabled: bool) -> Self {
        self.character_data_old_value = enabled;
        self
    }

    /// Restricts attribute records to the given names.
    #[inline]
    #[must_use]
    pub fn with_attribute_filter(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.attribute_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

// ============================================================================
// Queries
// ============================================================================

impl MutationKindSet {
    /// Checks the flag combination the way the platform's `observe()` does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when no category is enabled or an
    /// old-value/filter flag is set while its category is off.
    pub fn validate(&self) -> Result<()> {
        if !self.child_list && !self.attributes && !self.character_data {
            return Err(Error::invalid_argument(
                "one of childList, attributes or characterData must be enabled",
            ));
        }
        if !self.attributes && (self.attribute_old_value || self.attribute_filter.is_some()) {
            return Err(Error::invalid_argument(
                "attributeOldValue and attributeFilter require attributes",
            ));
        }
        if !self.character_data && self.character_data_old_value {
            return Err(Error::invalid_argument(
                "characterDataOldValue requires characterData",
            ));
        }
        Ok(())
    }

    /// Returns `true` if a record of `kind` (and `attribute`) is reported.
    #[must_use]
    pub fn accepts(&self, kind: MutationKind, attribute: Option<&str>) -> bool {
        match kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
            MutationKind::Attributes => {
                self.attributes
                    && match (&self.attribute_filter, attribute) {
                        (Some(filter), Some(name)) => filter.iter().any(|f| f == name),
                        (Some(_), None) => false,
                        (None, _) => true,
                    }
            }
        }
    }

    /// Returns `true` if records of `kind` carry the prior value.
    #[inline]
    #[must_use]
    pub fn wants_old_value(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::ChildList => false,
            MutationKind::Attributes => self.attribute_old_value,
            MutationKind::CharacterData => self.character_data_old_value,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let kinds = MutationKindSet::default();
        assert!(kinds.child_list);
        assert!(kinds.attributes);
        assert!(kinds.subtree);
        assert!(!kinds.character_data);
        assert!(!kinds.attribute_old_value);
        assert!(!kinds.character_data_old_value);
        assert!(kinds.attribute_filter.is_none());
        assert!(kinds.validate().is_ok());
    }

    #[test]
    fn test_attribute_filter() {
        let kinds = MutationKindSet::new().with_attribute_filter(["class"]);
        assert!(kinds.accepts(MutationKind::Attributes, Some("class")));
        assert!(!kinds.accepts(MutationKind::Attributes, Some("style")));
        assert!(kinds.accepts(MutationKind::ChildList, None));
        assert!(!kinds.accepts(MutationKind::CharacterData, None));
    }

    #[test]
    fn test_validate_rejects_empty_set() {
        let kinds = MutationKindSet::new()
            .with_child_list(false)
            .with_attributes(false);
        assert!(matches!(
            kinds.validate(),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_orphan_old_value() {
        let kinds = MutationKindSet::discovery().with_attribute_old_value(true);
        assert!(kinds.validate().is_err());

        let kinds = MutationKindSet::new().with_character_data_old_value(true);
        assert!(kinds.validate().is_err());
    }

    #[test]
    fn test_from_json_uses_platform_names() {
        let kinds = MutationKindSet::from_json(
            r#"{
                "characterData": true,
                "characterDataOldValue": true,
                "attributeFilter": ["hidden"]
            }"#,
        )
        .unwrap();
        assert!(kinds.child_list);
        assert!(kinds.character_data);
        assert!(kinds.wants_old_value(MutationKind::CharacterData));
        assert_eq!(kinds.attribute_filter, Some(vec!["hidden".to_string()]));
    }

    #[test]
    fn test_from_json_validates() {
        let err = MutationKindSet::from_json(r#"{"attributes": false, "attributeOldValue": true}"#)
            .unwrap_err();
        assert!(err.is_argument_error());
    }

    #[test]
    fn test_record_serialization_skips_empty_fields() {
        let record = MutationRecord::attribute(ElementId::new(2), "class", None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "attributes", "target": 2, "attributeName": "class" })
        );
    }
}
