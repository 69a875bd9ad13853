//! Wizard schema
//!
//! Declares the ordered steps and the fields each step owns. The schema is
//! the contract `set_field` and `validate_step` are checked against.

use crate::error::SchemaError;
use crate::field::{FieldKey, FieldKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Step identifier, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u16);

impl StepId {
    /// The first step
    pub const FIRST: StepId = StepId(1);

    /// Numeric value
    #[inline]
    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name
    pub key: FieldKey,
    /// Accepted value kind
    pub kind: FieldKind,
    /// Must be non-blank before leaving the step with `go_next`
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    /// Optional field
    #[inline]
    pub fn optional(key: impl Into<FieldKey>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            kind,
            required: false,
        }
    }

    /// Required field
    #[inline]
    pub fn required(key: impl Into<FieldKey>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            kind,
            required: true,
        }
    }
}

/// One wizard step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSchema {
    /// Position in the wizard
    pub id: StepId,
    /// Short machine name (e.g. "basics")
    pub name: String,
    /// Fields owned by this step
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl StepSchema {
    /// Create step
    pub fn new(id: u16, name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            id: StepId(id),
            name: name.into(),
            fields,
        }
    }

    /// Required field keys of this step
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.iter().filter(|f| f.required).map(|f| &f.key)
    }
}

/// Validated, ordered set of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardSchema {
    steps: Vec<StepSchema>,
}

impl WizardSchema {
    /// Build schema, checking step ids and field uniqueness
    ///
    /// # Errors
    /// - `SchemaError::Empty` for no steps
    /// - `SchemaError::NonContiguous` if ids are not 1..=N in order
    /// - `SchemaError::DuplicateField` if a key is declared twice
    pub fn new(steps: Vec<StepSchema>) -> Result<Self, SchemaError> {
        if steps.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = HashSet::new();
        for (idx, step) in steps.iter().enumerate() {
            let expected = u16::try_from(idx + 1).unwrap_or(u16::MAX);
            if step.id.0 != expected {
                return Err(SchemaError::NonContiguous {
                    expected,
                    found: step.id.0,
                });
            }
            for field in &step.fields {
                if !seen.insert(field.key.clone()) {
                    return Err(SchemaError::DuplicateField(field.key.clone()));
                }
            }
        }

        Ok(Self { steps })
    }

    /// Default five-step listing schema
    ///
    /// basics -> location -> details -> media -> review
    #[must_use]
    pub fn listing() -> Self {
        use FieldKind::{Flag, Numeric, Text};

        let steps = vec![
            StepSchema::new(
                1,
                "basics",
                vec![
                    FieldSpec::required("title", Text),
                    FieldSpec::optional("description", Text),
                    FieldSpec::required("category", Text),
                    FieldSpec::required("listing_type", Text),
                ],
            ),
            StepSchema::new(
                2,
                "location",
                vec![
                    FieldSpec::required("address", Text),
                    FieldSpec::required("city", Text),
                    FieldSpec::optional("postal_code", Text),
                ],
            ),
            StepSchema::new(
                3,
                "details",
                vec![
                    FieldSpec::required("price", Numeric),
                    FieldSpec::optional("area", Numeric),
                    FieldSpec::optional("rooms", Numeric),
                    FieldSpec::optional("bathrooms", Numeric),
                    FieldSpec::optional("furnished", Flag),
                    FieldSpec::optional("parking", Flag),
                ],
            ),
            StepSchema::new(4, "media", vec![]),
            StepSchema::new(5, "review", vec![]),
        ];

        // Static layout above is known-good
        Self { steps }
    }

    /// Number of steps (N)
    #[inline]
    #[must_use]
    pub fn len(&self) -> u16 {
        u16::try_from(self.steps.len()).unwrap_or(u16::MAX)
    }

    /// Always false; construction rejects empty schemas
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Last step id
    #[inline]
    #[must_use]
    pub fn last(&self) -> StepId {
        StepId(self.len())
    }

    /// Whether `id` lies in `[1, N]`
    #[inline]
    #[must_use]
    pub fn contains(&self, id: StepId) -> bool {
        id.0 >= 1 && id.0 <= self.len()
    }

    /// Step by id
    #[must_use]
    pub fn step(&self, id: StepId) -> Option<&StepSchema> {
        if !self.contains(id) {
            return None;
        }
        self.steps.get(usize::from(id.0 - 1))
    }

    /// All steps in order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[StepSchema] {
        &self.steps
    }

    /// Declaration for a field, searching every step
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.steps
            .iter()
            .flat_map(|s| s.fields.iter())
            .find(|f| f.key.as_str() == key)
    }
}

impl<'de> Deserialize<'de> for WizardSchema {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            steps: Vec<StepSchema>,
        }

        let raw = Raw::deserialize(deserializer)?;
        WizardSchema::new(raw.steps).map_err(serde::de::Error::custom)
    }
}

impl Default for WizardSchema {
    fn default() -> Self {
        Self::listing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_schema_is_valid() {
        let schema = WizardSchema::listing();
        assert_eq!(schema.len(), 5);
        assert_eq!(WizardSchema::new(schema.steps().to_vec()), Ok(schema));
    }

    #[test]
    fn rejects_empty_schema() {
        assert_eq!(WizardSchema::new(vec![]), Err(SchemaError::Empty));
    }

    #[test]
    fn rejects_gap_in_step_ids() {
        let steps = vec![StepSchema::new(1, "a", vec![]), StepSchema::new(3, "b", vec![])];
        assert_eq!(
            WizardSchema::new(steps),
            Err(SchemaError::NonContiguous {
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn rejects_duplicate_field() {
        let steps = vec![
            StepSchema::new(1, "a", vec![FieldSpec::required("title", FieldKind::Text)]),
            StepSchema::new(2, "b", vec![FieldSpec::optional("title", FieldKind::Text)]),
        ];
        assert_eq!(
            WizardSchema::new(steps),
            Err(SchemaError::DuplicateField(FieldKey::new("title")))
        );
    }

    #[test]
    fn step_lookup_respects_bounds() {
        let schema = WizardSchema::listing();
        assert!(schema.step(StepId(0)).is_none());
        assert_eq!(schema.step(StepId(2)).map(|s| s.name.as_str()), Some("location"));
        assert!(schema.step(StepId(6)).is_none());
    }

    #[test]
    fn schema_deserializes_with_validation() {
        let json = r#"{"steps":[{"id":1,"name":"only","fields":[{"key":"title","kind":"text","required":true}]}]}"#;
        let schema: WizardSchema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.len(), 1);

        let bad = r#"{"steps":[{"id":2,"name":"wrong"}]}"#;
        assert!(serde_json::from_str::<WizardSchema>(bad).is_err());
    }
}
