//! Listing wizard - guided multi-step record composition
//!
//! Provides:
//! - [`WizardSchema`]: ordered steps and the fields each one owns
//! - [`StepWizard`]: current step, field values, guarded and unguarded navigation
//! - [`ValidationError`]: per-step missing-field report
//!
//! # Example
//!
//! ```rust
//! use lc_wizard::{StepId, StepWizard, WizardSchema};
//! use std::sync::Arc;
//!
//! let mut wizard = StepWizard::new(Arc::new(WizardSchema::listing()));
//! assert!(wizard.go_next().is_err());
//!
//! wizard.set_field("title", "Corner office").unwrap();
//! wizard.set_field("category", "office").unwrap();
//! wizard.set_field("listing_type", "rent").unwrap();
//! assert_eq!(wizard.go_next().unwrap(), StepId(2));
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod field;
pub mod schema;
pub mod transitions;
pub mod wizard;

pub use error::{SchemaError, ValidationError, WizardError};
pub use field::{FieldKey, FieldKind, FieldValue};
pub use schema::{FieldSpec, StepId, StepSchema, WizardSchema};
pub use transitions::Navigation;
pub use wizard::{StepValidation, StepWizard, WizardSnapshot};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
