//! Submission record assembly
//!
//! Wizard values stay as the user typed them until submission. Here they
//! are coerced into the record the backend expects:
//! - numeric fields are parsed (blank is omitted, garbage is an error)
//! - missing toggles get their default
//! - the raw category is rewritten to its broader group
//! - uploaded references are attached in staging order, first one primary

use crate::error::SubmissionError;
use lc_media::{MediaReference, UploadResult};
use lc_wizard::{FieldKey, FieldValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier returned by the record creator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an id string
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category grouping rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryRule {
    /// Field holding the raw category
    pub field: FieldKey,
    /// Raw values that map to `grouped_as`
    pub grouped: Vec<String>,
    /// Group for the listed raw values
    pub grouped_as: String,
    /// Group for every other raw value
    pub otherwise: String,
    /// Field receiving the raw value, if it should be kept
    pub keep_raw_as: Option<FieldKey>,
}

impl CategoryRule {
    /// Group for a raw category (case-insensitive, surrounding space ignored)
    #[must_use]
    pub fn group_for(&self, raw: &str) -> &str {
        let raw = raw.trim();
        if self.grouped.iter().any(|g| g.eq_ignore_ascii_case(raw)) {
            &self.grouped_as
        } else {
            &self.otherwise
        }
    }
}

impl Default for CategoryRule {
    fn default() -> Self {
        Self {
            field: FieldKey::new("category"),
            grouped: vec!["office".to_string(), "shop".to_string()],
            grouped_as: "commercial".to_string(),
            otherwise: "residential".to_string(),
            keep_raw_as: Some(FieldKey::new("property_type")),
        }
    }
}

/// Field coercion rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordRules {
    /// Fields parsed as numbers
    pub numeric: Vec<FieldKey>,
    /// Toggles and the value used when the user never touched them
    pub flag_defaults: BTreeMap<FieldKey, bool>,
    /// Category grouping
    pub category: CategoryRule,
}

impl Default for RecordRules {
    fn default() -> Self {
        let numeric = ["price", "area", "rooms", "bathrooms"]
            .into_iter()
            .map(FieldKey::new)
            .collect();
        let flag_defaults = [("furnished", false), ("parking", false)]
            .into_iter()
            .map(|(k, v)| (FieldKey::new(k), v))
            .collect();
        Self {
            numeric,
            flag_defaults,
            category: CategoryRule::default(),
        }
    }
}

/// Record handed to the create capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Coerced field values
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Uploaded media in staging order
    pub images: Vec<MediaReference>,
    /// First image, if any
    pub primary_image: Option<MediaReference>,
}

impl SubmissionRecord {
    /// One coerced field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Builds [`SubmissionRecord`]s from wizard fields and upload results
#[derive(Debug, Clone, Default)]
pub struct RecordAssembler {
    rules: RecordRules,
}

impl RecordAssembler {
    /// Create assembler
    #[must_use]
    pub fn new(rules: RecordRules) -> Self {
        Self { rules }
    }

    /// Rules in use
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &RecordRules {
        &self.rules
    }

    /// Coerce the fields without any media
    ///
    /// Run before uploading so a bad value never leaves uploads behind.
    ///
    /// # Errors
    /// Same as [`RecordAssembler::assemble`]
    pub fn check(&self, fields: &BTreeMap<FieldKey, FieldValue>) -> Result<(), SubmissionError> {
        self.coerce_fields(fields).map(|_| ())
    }

    /// Assemble the final record
    ///
    /// # Errors
    /// `SubmissionError::InvalidField` if a numeric field does not parse
    pub fn assemble(
        &self,
        fields: &BTreeMap<FieldKey, FieldValue>,
        uploads: &UploadResult,
    ) -> Result<SubmissionRecord, SubmissionError> {
        let fields = self.coerce_fields(fields)?;
        let record = SubmissionRecord {
            fields,
            images: uploads.references().to_vec(),
            primary_image: uploads.primary().cloned(),
        };
        tracing::debug!(
            fields = record.fields.len(),
            images = record.images.len(),
            "record assembled"
        );
        Ok(record)
    }

    fn coerce_fields(&self, fields: &BTreeMap<FieldKey, FieldValue>) -> Result<Map<String, Value>, SubmissionError> {
        let mut out = Map::new();

        for (key, value) in fields {
            if self.rules.numeric.contains(key) {
                if let Some(n) = parse_number(key, value)? {
                    out.insert(key.to_string(), Value::Number(n));
                }
                continue;
            }
            out.insert(key.to_string(), to_json(value));
        }

        for (key, default) in &self.rules.flag_defaults {
            out.entry(key.to_string()).or_insert(Value::Bool(*default));
        }

        let rule = &self.rules.category;
        if let Some(raw) = fields.get(&rule.field).and_then(FieldValue::as_text) {
            if let Some(keep) = &rule.keep_raw_as {
                out.insert(keep.to_string(), Value::String(raw.trim().to_string()));
            }
            out.insert(rule.field.to_string(), Value::String(rule.group_for(raw).to_string()));
        }

        Ok(out)
    }
}

/// Blank numeric input is omitted rather than sent as zero
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn parse_number(key: &FieldKey, value: &FieldValue) -> Result<Option<Number>, SubmissionError> {
    let invalid = |reason: String| SubmissionError::InvalidField {
        field: key.clone(),
        reason,
    };

    let n = match value {
        v if v.is_blank() => return Ok(None),
        FieldValue::Number(n) => *n,
        FieldValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("{s:?} is not a number")))?,
        other => return Err(invalid(format!("expected a number, got {:?}", other.kind()))),
    };

    if !n.is_finite() {
        return Err(invalid(format!("{n} is not a finite number")));
    }

    // Whole numbers go out as integers so "3" rooms does not become 3.0
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Ok(Some(Number::from(n as i64)));
    }
    Number::from_f64(n)
        .map(Some)
        .ok_or_else(|| invalid(format!("{n} is not representable")))
}

fn to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Flag(b) => Value::Bool(*b),
        FieldValue::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Choices(c) => Value::Array(c.iter().cloned().map(Value::String).collect()),
    }
}
