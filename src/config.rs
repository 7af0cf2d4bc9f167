use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};

/// Engine settings
///
/// ```
/// use catalog_revisions::EngineConfig;
///
/// let config = EngineConfig::new()
///     .default_author("importer")
///     .record_new_root_detail(false);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Revision author when a transaction names none.
    pub default_author: String,

    /// Revision message when a transaction gives none.
    pub default_message: String,

    /// Register the activity deriver on `Database::open`.
    pub emit_activities: bool,

    /// A new aggregate root also gets an activity detail for itself.
    pub record_new_root_detail: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_author: "system".to_string(),
            default_message: String::new(),
            emit_activities: true,
            record_new_root_detail: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_author(mut self, author: impl Into<String>) -> Self {
        self.default_author = author.into();
        self
    }

    pub fn default_message(mut self, message: impl Into<String>) -> Self {
        self.default_message = message.into();
        self
    }

    pub fn emit_activities(mut self, enabled: bool) -> Self {
        self.emit_activities = enabled;
        self
    }

    pub fn record_new_root_detail(mut self, enabled: bool) -> Self {
        self.record_new_root_detail = enabled;
        self
    }

    /// Loads a config from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DbError::ConfigError(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_author.trim().is_empty() {
            return Err(DbError::ConfigError(
                "default_author cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
