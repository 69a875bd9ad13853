//! Field keys, values and kinds
//!
//! Values are kept as the user entered them. Coercion into the final record
//! shape happens at submission time, not here.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Name of a wizard field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    /// Create new field key
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Key as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FieldKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Value held by a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean toggle
    Flag(bool),
    /// Already-numeric input
    Number(f64),
    /// Free text (also raw numeric input before coercion)
    Text(String),
    /// Multi-select
    Choices(Vec<String>),
}

impl FieldValue {
    /// Text value
    #[inline]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// A blank value does not satisfy a required field and does not count as
    /// content for autosave.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Choices(c) => c.is_empty(),
            Self::Number(n) => n.is_nan(),
            Self::Flag(_) => false,
        }
    }

    /// Text content, if this is a text value
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Kind this value naturally belongs to
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Flag(_) => FieldKind::Flag,
            Self::Number(_) => FieldKind::Numeric,
            Self::Text(_) => FieldKind::Text,
            Self::Choices(_) => FieldKind::Choices,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Declared kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text
    Text,
    /// Number, or text that will be parsed as one
    Numeric,
    /// Boolean toggle
    Flag,
    /// Multi-select list
    Choices,
}

impl FieldKind {
    /// Whether `value` may be stored in a field of this kind
    #[must_use]
    pub fn accepts(self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::Numeric, FieldValue::Text(_) | FieldValue::Number(_)) => true,
            (kind, value) => kind == value.kind(),
        }
    }
}
