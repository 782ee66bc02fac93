//! Engine configuration

use serde::{Deserialize, Serialize};
use std::env;

/// Tunables shared by the import and reconciliation components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Description given to newly created adjustment transactions
    pub reconciliation_description: String,
    /// Appended to an adjustment's description when it is recomputed
    pub updated_suffix: String,
    /// Default for [`ImportOptions::skip_duplicates`](crate::import::ImportOptions)
    pub skip_duplicates: bool,
    /// How many of the most recent checkpoints are audited on read
    pub validation_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconciliation_description: "Balance reconciliation".to_string(),
            updated_suffix: "(Updated)".to_string(),
            skip_duplicates: true,
            validation_window: 10,
        }
    }
}

impl EngineConfig {
    /// Read overrides from `LEDGER_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reconciliation_description: env::var("LEDGER_RECONCILIATION_DESCRIPTION")
                .unwrap_or(defaults.reconciliation_description),
            updated_suffix: env::var("LEDGER_UPDATED_SUFFIX").unwrap_or(defaults.updated_suffix),
            skip_duplicates: env::var("LEDGER_SKIP_DUPLICATES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.skip_duplicates),
            validation_window: env::var("LEDGER_VALIDATION_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.validation_window),
        }
    }

    /// Description for an adjustment that replaces an earlier one
    pub fn updated_description(&self, previous: &str) -> String {
        if previous.ends_with(&self.updated_suffix) {
            previous.to_string()
        } else {
            format!("{} {}", previous, self.updated_suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updated_suffix_is_not_repeated() {
        let config = EngineConfig::default();
        let once = config.updated_description("Balance reconciliation");
        assert_eq!(once, "Balance reconciliation (Updated)");
        assert_eq!(config.updated_description(&once), once);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"validation_window": 3}"#).unwrap();
        assert_eq!(config.validation_window, 3);
        assert!(config.skip_duplicates);
    }
}
