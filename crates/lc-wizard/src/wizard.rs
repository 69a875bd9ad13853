//! Step wizard
//!
//! Tracks the current step, the field bag and the error currently shown.
//! Two navigation paths exist on purpose:
//! - `go_next` / `go_previous`: `go_next` is guarded by step validation
//! - `jump_to`: unguarded, does not look at the step being left
//!
//! No wizard operation reaches a terminal state; that only happens when a
//! submission succeeds and the owner calls `reset`.

use crate::error::{ValidationError, WizardError};
use crate::field::{FieldKey, FieldValue};
use crate::schema::{StepId, WizardSchema};
use crate::transitions::{self, Navigation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of checking one step's required fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepValidation {
    /// Step that was checked
    pub step: StepId,
    /// Required fields that are absent or blank
    pub missing: Vec<FieldKey>,
}

impl StepValidation {
    /// Whether the step passes
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.missing.is_empty()
    }

    /// Convert into `Result`
    ///
    /// # Errors
    /// `ValidationError` carrying the missing fields if the step fails
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                step: self.step,
                missing: self.missing,
            })
        }
    }
}

/// Serializable wizard state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardSnapshot {
    /// Step the user was on
    pub current_step: StepId,
    /// Every field value entered so far
    pub fields: BTreeMap<FieldKey, FieldValue>,
}

/// Multi-step form state machine
#[derive(Debug, Clone)]
pub struct StepWizard {
    schema: Arc<WizardSchema>,
    current: StepId,
    fields: BTreeMap<FieldKey, FieldValue>,
    shown_error: Option<ValidationError>,
}

impl StepWizard {
    /// Create wizard at step 1 with no fields
    #[must_use]
    pub fn new(schema: Arc<WizardSchema>) -> Self {
        Self {
            schema,
            current: StepId::FIRST,
            fields: BTreeMap::new(),
            shown_error: None,
        }
    }

    /// Current step
    #[inline]
    #[must_use]
    pub fn current_step(&self) -> StepId {
        self.current
    }

    /// Schema driving this wizard
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &WizardSchema {
        &self.schema
    }

    /// Error currently shown to the user, if any
    #[inline]
    #[must_use]
    pub fn last_error(&self) -> Option<&ValidationError> {
        self.shown_error.as_ref()
    }

    /// Advance one step if the current step validates
    ///
    /// Capped at the last step. On success the shown error is cleared.
    ///
    /// # Errors
    /// `ValidationError` naming the missing fields; the step is unchanged
    pub fn go_next(&mut self) -> Result<StepId, ValidationError> {
        if let Err(err) = self.validate_step(self.current).into_result() {
            tracing::debug!(step = %self.current, missing = ?err.missing, "step validation failed");
            self.shown_error = Some(err.clone());
            return Err(err);
        }

        // Next never fails to resolve; it saturates at N
        let to = transitions::target(&self.schema, self.current, Navigation::Next)
            .unwrap_or(self.current);
        tracing::debug!(from = %self.current, to = %to, "go_next");
        self.current = to;
        self.shown_error = None;
        Ok(to)
    }

    /// Go back one step, floored at step 1
    pub fn go_previous(&mut self) -> StepId {
        let to = transitions::target(&self.schema, self.current, Navigation::Previous)
            .unwrap_or(self.current);
        tracing::debug!(from = %self.current, to = %to, "go_previous");
        self.current = to;
        to
    }

    /// Move directly to `step` without validating the step being left
    ///
    /// # Errors
    /// `WizardError::StepOutOfRange` if `step` is outside `[1, N]`
    pub fn jump_to(&mut self, step: StepId) -> Result<StepId, WizardError> {
        let to = transitions::target(&self.schema, self.current, Navigation::Jump(step))?;
        tracing::debug!(from = %self.current, to = %to, "jump_to");
        self.current = to;
        Ok(to)
    }

    /// Set a field value
    ///
    /// # Errors
    /// - `WizardError::UnknownField` if the schema does not declare `key`
    /// - `WizardError::KindMismatch` if the value does not fit the field kind
    pub fn set_field(
        &mut self,
        key: impl Into<FieldKey>,
        value: impl Into<FieldValue>,
    ) -> Result<(), WizardError> {
        let key = key.into();
        let value = value.into();

        let spec = self
            .schema
            .field(key.as_str())
            .ok_or_else(|| WizardError::UnknownField(key.clone()))?;
        if !spec.kind.accepts(&value) {
            return Err(WizardError::KindMismatch {
                key,
                expected: spec.kind,
            });
        }

        self.fields.insert(key, value);
        Ok(())
    }

    /// Value of one field
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// All field values
    #[inline]
    #[must_use]
    pub fn get_all_fields(&self) -> &BTreeMap<FieldKey, FieldValue> {
        &self.fields
    }

    /// Check a step's required fields against the current values
    ///
    /// Pure: does not touch the shown error. An id outside the schema has no
    /// required fields and passes.
    #[must_use]
    pub fn validate_step(&self, step: StepId) -> StepValidation {
        let missing = self
            .schema
            .step(step)
            .map(|s| {
                s.required_fields()
                    .filter(|key| self.fields.get(*key).map_or(true, FieldValue::is_blank))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        StepValidation { step, missing }
    }

    /// Validation of every step, in order
    #[must_use]
    pub fn step_validity(&self) -> Vec<StepValidation> {
        self.schema
            .steps()
            .iter()
            .map(|s| self.validate_step(s.id))
            .collect()
    }

    /// Moves the step navigation can offer from the current step
    ///
    /// Next is only listed when the current step validates; Previous and
    /// jumps are never guarded.
    #[must_use]
    pub fn available_moves(&self) -> Vec<(Navigation, StepId)> {
        let next_ok = self.validate_step(self.current).passed();
        transitions::allowed_transitions(&self.schema, self.current)
            .into_iter()
            .filter(|(nav, _)| !nav.is_guarded() || next_ok)
            .collect()
    }

    /// First failing step, if any
    ///
    /// # Errors
    /// The `ValidationError` of the first step that fails
    pub fn validate_all(&self) -> Result<(), ValidationError> {
        self.step_validity()
            .into_iter()
            .try_for_each(StepValidation::into_result)
    }

    /// Whether any field holds a non-blank value
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.fields.values().any(|v| !v.is_blank())
    }

    /// Drop the shown error without navigating
    pub fn dismiss_error(&mut self) {
        self.shown_error = None;
    }

    /// Back to step 1 with no fields
    pub fn reset(&mut self) {
        tracing::debug!("wizard reset");
        self.current = StepId::FIRST;
        self.fields.clear();
        self.shown_error = None;
    }

    /// Serializable copy of the state
    #[must_use]
    pub fn snapshot(&self) -> WizardSnapshot {
        WizardSnapshot {
            current_step: self.current,
            fields: self.fields.clone(),
        }
    }

    /// Replace state from a snapshot
    ///
    /// Overwrites every in-memory value. Fields the schema no longer knows
    /// are dropped and a step outside the schema is clamped into range.
    pub fn restore(&mut self, snapshot: WizardSnapshot) {
        let schema = Arc::clone(&self.schema);
        let (known, unknown): (BTreeMap<_, _>, BTreeMap<_, _>) = snapshot
            .fields
            .into_iter()
            .partition(|(k, v)| schema.field(k.as_str()).is_some_and(|s| s.kind.accepts(v)));

        if !unknown.is_empty() {
            tracing::warn!(dropped = ?unknown.keys().collect::<Vec<_>>(), "dropping fields not accepted by schema");
        }

        let step = snapshot.current_step.0.clamp(1, schema.len());
        if step != snapshot.current_step.0 {
            tracing::warn!(requested = %snapshot.current_step, clamped = step, "restored step out of range");
        }

        self.current = StepId(step);
        self.fields = known;
        self.shown_error = None;
    }
}
