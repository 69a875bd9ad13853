//! Composer configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! autosave_interval_ms = 30000
//! success_notice_ms = 3000
//! draft_key_prefix = "listing-draft"
//!
//! [upload]
//! policy = "keep_partial"
//! concurrency = 2
//!
//! [record.category]
//! grouped = ["office", "shop"]
//! grouped_as = "commercial"
//! otherwise = "residential"
//! ```

use crate::error::ConfigError;
use crate::record::RecordRules;
use lc_draft::DEFAULT_KEY_PREFIX;
use lc_media::UploadPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upload settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// What a failed batch means
    pub policy: UploadPolicy,
    /// Uploads in flight at once
    pub concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            policy: UploadPolicy::AbortAll,
            concurrency: 1,
        }
    }
}

/// Listing composer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Milliseconds between autosaves
    pub autosave_interval_ms: u64,
    /// Milliseconds a success notice stays visible
    pub success_notice_ms: u64,
    /// Draft storage key prefix
    pub draft_key_prefix: String,
    /// Upload settings
    pub upload: UploadConfig,
    /// Record coercion rules
    pub record: RecordRules,
}

impl ComposerConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid` for
    /// out-of-range values
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Read` if the file cannot be read, otherwise as
    /// [`ComposerConfig::from_toml_str`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::info!(path = %path.display(), "loaded composer config");
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.autosave_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "autosave_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.upload.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "upload.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.draft_key_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "draft_key_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Autosave interval
    #[inline]
    #[must_use]
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    /// Success notice lifetime
    #[inline]
    #[must_use]
    pub fn success_notice(&self) -> Duration {
        Duration::from_millis(self.success_notice_ms)
    }

    /// With autosave interval
    #[inline]
    #[must_use]
    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With success notice lifetime
    #[inline]
    #[must_use]
    pub fn with_success_notice(mut self, lifetime: Duration) -> Self {
        self.success_notice_ms = u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With draft key prefix
    #[inline]
    #[must_use]
    pub fn with_draft_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.draft_key_prefix = prefix.into();
        self
    }

    /// With upload policy
    #[inline]
    #[must_use]
    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload.policy = policy;
        self
    }

    /// With upload concurrency
    #[inline]
    #[must_use]
    pub fn with_upload_concurrency(mut self, n: usize) -> Self {
        self.upload.concurrency = n;
        self
    }

    /// With record rules
    #[inline]
    #[must_use]
    pub fn with_record_rules(mut self, rules: RecordRules) -> Self {
        self.record = rules;
        self
    }
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            autosave_interval_ms: 30_000,
            success_notice_ms: 3_000,
            draft_key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            upload: UploadConfig::default(),
            record: RecordRules::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        let config = ComposerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ComposerConfig::default());
        assert_eq!(config.autosave_interval(), Duration::from_secs(30));
        assert_eq!(config.draft_key_prefix, "listing-draft");
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config = ComposerConfig::from_toml_str(
            r#"
            success_notice_ms = 1500

            [upload]
            policy = "keep_partial"
            "#,
        )
        .unwrap();
        assert_eq!(config.success_notice(), Duration::from_millis(1500));
        assert_eq!(config.upload.policy, UploadPolicy::KeepPartial);
        assert_eq!(config.upload.concurrency, 1);
        assert_eq!(config.autosave_interval_ms, 30_000);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = ComposerConfig::from_toml_str("[upload]\nconcurrency = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "upload.concurrency",
                ..
            }
        ));
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = ComposerConfig::from_toml_str("[upload]\npolicy = \"best_effort\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "autosave_interval_ms = 500").unwrap();
        let config = ComposerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.autosave_interval(), Duration::from_millis(500));

        let missing = ComposerConfig::from_file(file.path().with_extension("absent"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn builders_chain() {
        let config = ComposerConfig::new()
            .with_autosave_interval(Duration::from_secs(5))
            .with_upload_policy(UploadPolicy::KeepPartial)
            .with_upload_concurrency(3)
            .with_draft_key_prefix("drafts");
        assert_eq!(config.autosave_interval_ms, 5_000);
        assert_eq!(config.upload.concurrency, 3);
        assert!(config.validate().is_ok());
    }
}
