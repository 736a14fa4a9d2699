//! Mesh revealer configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::Result;

/// Tuning for a [`MeshRevealer`](super::MeshRevealer)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealerConfig {
    /// Threshold handed to the extractor
    pub iso_level: i32,
    /// Minimum number of candidate cells extracted per batch
    pub batch_cells: usize,
    /// Name of the extraction worker thread
    pub worker_name: String,
}

impl Default for RevealerConfig {
    fn default() -> Self {
        Self {
            iso_level: 128,
            batch_cells: 1_000_000,
            worker_name: "mesh-revealer".to_string(),
        }
    }
}

impl RevealerConfig {
    /// Parse from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Save as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;

    #[test]
    fn test_defaults() {
        let config = RevealerConfig::default();
        assert_eq!(config.iso_level, 128);
        assert_eq!(config.batch_cells, 1_000_000);
        assert_eq!(config.worker_name, "mesh-revealer");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RevealerConfig::from_json_str(r#"{ "batch_cells": 64 }"#).unwrap();
        assert_eq!(config.batch_cells, 64);
        assert_eq!(config.iso_level, 128);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            RevealerConfig::from_json_str("{ iso_level: }"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("revealer.json");
        let config = RevealerConfig {
            iso_level: 90,
            batch_cells: 4096,
            worker_name: "extract".to_string(),
        };
        config.save(&path).unwrap();
        assert_eq!(RevealerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RevealerConfig::load(dir.path().join("absent.json")),
            Err(Error::Io(_))
        ));
    }
}
