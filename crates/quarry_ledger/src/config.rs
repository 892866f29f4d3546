//! # Ledger Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! abundance_cooldown_ms = 300000
//! window_interval_secs = 60
//! max_upgrade_records = 64
//! rank_permission_prefix = "quarry.mine"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{LedgerError, LedgerResult};

/// Tunables shared by every ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Cooldown after an abundance activation ends (ms).
    pub abundance_cooldown_ms: u64,
    /// Cadence of the window driver (seconds).
    pub window_interval_secs: u64,
    /// Upgrade records kept per window.
    pub max_upgrade_records: usize,
    /// Permission prefix for mine ranks, without the trailing dot.
    pub rank_permission_prefix: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            abundance_cooldown_ms: 300_000, // 5 minutes
            window_interval_secs: 60,
            max_upgrade_records: 64,
            rank_permission_prefix: "quarry.mine".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidConfig`] on syntax errors, unknown keys
    /// or out-of-range values.
    pub fn from_toml_str(text: &str) -> LedgerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidConfig`] if the file cannot be read or
    /// fails [`LedgerConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::InvalidConfig(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.window_interval_secs == 0 {
            return Err(LedgerError::InvalidConfig(
                "window_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_upgrade_records == 0 {
            return Err(LedgerError::InvalidConfig(
                "max_upgrade_records must be greater than 0".to_string(),
            ));
        }
        let prefix = &self.rank_permission_prefix;
        if prefix.is_empty()
            || prefix.ends_with('.')
            || prefix.chars().any(|c| c.is_whitespace() || c.is_uppercase())
        {
            return Err(LedgerError::InvalidConfig(format!(
                "rank_permission_prefix {prefix:?} must be non-empty lowercase without whitespace or a trailing dot"
            )));
        }
        Ok(())
    }

    /// Window driver cadence.
    #[must_use]
    pub const fn window_interval(&self) -> Duration {
        Duration::from_secs(self.window_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.window_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_document() {
        let config = LedgerConfig::from_toml_str(
            r#"
            abundance_cooldown_ms = 1000
            rank_permission_prefix = "prison.rank"
            "#,
        )
        .unwrap();
        assert_eq!(config.abundance_cooldown_ms, 1000);
        assert_eq!(config.rank_permission_prefix, "prison.rank");
        assert_eq!(config.max_upgrade_records, 64);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(LedgerConfig::from_toml_str("window_interval_secs = 0").is_err());
        assert!(LedgerConfig::from_toml_str("max_upgrade_records = 0").is_err());
        assert!(LedgerConfig::from_toml_str(r#"rank_permission_prefix = "mine.""#).is_err());
        assert!(LedgerConfig::from_toml_str(r#"rank_permission_prefix = "Quarry.Mine""#).is_err());
        assert!(LedgerConfig::from_toml_str("tick_rate = 60").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = LedgerConfig::from_toml_file("/nonexistent/quarry.toml").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfig(_)));
    }
}
