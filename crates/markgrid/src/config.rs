//! Processing policy object.
//!
//! Every threshold of the pipeline lives here. All structs use
//! `#[serde(default)]`, so a partial JSON document overrides only the fields
//! it names.

use std::path::Path;

use crate::candidate::DetectionConfig;
use crate::error::Result;
use crate::fill::FillThresholds;
use crate::grid::ReconstructionConfig;
use crate::preprocess::PreprocessConfig;
use crate::quality::QualityConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OmrConfig {
    pub preprocess: PreprocessConfig,
    pub detection: DetectionConfig,
    pub reconstruction: ReconstructionConfig,
    pub thresholds: FillThresholds,
    pub quality: QualityConfig,
}

impl OmrConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a (possibly partial) configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }
}
