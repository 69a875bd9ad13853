//! Step transition table

use crate::error::WizardError;
use crate::schema::{StepId, WizardSchema};

/// How a step change was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Navigation {
    /// `go_next`: guarded by the current step's required fields
    Next,
    /// `go_previous`: unguarded, floored at step 1
    Previous,
    /// `jump_to`: unguarded, any step in range
    Jump(StepId),
}

impl Navigation {
    /// Guarded transitions run step validation before moving.
    pub fn is_guarded(self) -> bool {
        matches!(self, Navigation::Next)
    }
}

/// Target step for a navigation request, without applying any guard.
///
/// Next and Previous saturate at the schema bounds; Jump is rejected when
/// it would leave `[1, N]`.
pub fn target(schema: &WizardSchema, from: StepId, nav: Navigation) -> Result<StepId, WizardError> {
    match nav {
        Navigation::Next => Ok(StepId(from.0.saturating_add(1).min(schema.len()))),
        Navigation::Previous => Ok(StepId(from.0.saturating_sub(1).max(1))),
        Navigation::Jump(to) => {
            if schema.contains(to) {
                Ok(to)
            } else {
                Err(WizardError::StepOutOfRange {
                    requested: to.0,
                    last: schema.len(),
                })
            }
        }
    }
}

/// Edges leaving `from`: Next and Previous where they move, plus a Jump to
/// every other step.
pub(crate) fn allowed_transitions(schema: &WizardSchema, from: StepId) -> Vec<(Navigation, StepId)> {
    let mut out = Vec::new();
    if from.0 < schema.len() {
        out.push((Navigation::Next, StepId(from.0 + 1)));
    }
    if from.0 > 1 {
        out.push((Navigation::Previous, StepId(from.0 - 1)));
    }
    for step in schema.steps() {
        if step.id != from {
            out.push((Navigation::Jump(step.id), step.id));
        }
    }
    out
}
