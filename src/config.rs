use crate::error::{MapperError, Result};
use crate::sync::SyncOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mapper configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Keyspace that holds the mapped tables
    pub keyspace: String,

    #[serde(default)]
    pub sync: SyncOptions,
}

impl MapperConfig {
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            sync: SyncOptions::default(),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: MapperConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyspace.trim().is_empty() {
            return Err(MapperError::Validation("keyspace cannot be empty".to_string()));
        }
        if !self
            .keyspace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(MapperError::Validation(format!(
                "keyspace '{}' may only contain letters, digits and underscores",
                self.keyspace
            )));
        }
        Ok(())
    }
}
