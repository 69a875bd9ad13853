//! Error types for the step wizard

use crate::field::{FieldKey, FieldKind};
use crate::schema::StepId;

/// A step failed its required-field check
///
/// Fully local; never reaches the network. Blocks `go_next`, never
/// `jump_to`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step {step} is missing required fields: {}", join_keys(.missing))]
pub struct ValidationError {
    /// Step that was validated
    pub step: StepId,
    /// Required fields with no usable value
    pub missing: Vec<FieldKey>,
}

impl ValidationError {
    /// Whether the given field is among the missing ones
    #[must_use]
    pub fn is_missing(&self, key: &str) -> bool {
        self.missing.iter().any(|k| k.as_str() == key)
    }
}

fn join_keys(keys: &[FieldKey]) -> String {
    keys.iter()
        .map(FieldKey::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Misuse of the wizard API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    /// Step id outside `[1, N]`
    #[error("step {requested} is out of range (1..={last})")]
    StepOutOfRange {
        /// Step that was asked for
        requested: u16,
        /// Highest step id in the schema
        last: u16,
    },

    /// Field not declared by the schema
    #[error("unknown field: {0}")]
    UnknownField(FieldKey),

    /// Value does not fit the declared field kind
    #[error("field {key} expects a {expected:?} value")]
    KindMismatch {
        /// Field being written
        key: FieldKey,
        /// Kind the schema declares
        expected: FieldKind,
    },
}

/// Schema construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Schema has no steps
    #[error("schema must declare at least one step")]
    Empty,

    /// Step ids must run 1, 2, .., N
    #[error("step ids must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguous {
        /// Next id in sequence
        expected: u16,
        /// Id actually declared
        found: u16,
    },

    /// A field key was declared twice
    #[error("field declared more than once: {0}")]
    DuplicateField(FieldKey),
}
