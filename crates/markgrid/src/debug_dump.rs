//! Versioned debug dump of one processed sheet.
//!
//! Reuses the production structures (configuration, candidate set,
//! per-question reports, outcome) so the dump stays in sync with the engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::OmrConfig;
use crate::error::Result;
use crate::pipeline::{Outcome, SheetAnalysis};
use crate::template::{LayoutTag, Template};

pub const DEBUG_SCHEMA_V1: &str = "markgrid.debug.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugDump {
    pub schema_version: String,
    pub image: ImageDebug,
    pub template: TemplateSummary,
    pub config: OmrConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<SheetAnalysis>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDebug {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: String,
    pub question_count: usize,
    pub choice_labels: Vec<String>,
    pub bubble_radius_range: [u32; 2],
    pub choices_per_row: usize,
    pub layout_tag: LayoutTag,
    pub expected_bubbles: usize,
}

impl From<&Template> for TemplateSummary {
    fn from(t: &Template) -> Self {
        Self {
            id: t.id.clone(),
            question_count: t.question_count,
            choice_labels: t.choice_labels.clone(),
            bubble_radius_range: [t.bubble_radius_min, t.bubble_radius_max],
            choices_per_row: t.choices_per_row,
            layout_tag: t.layout_tag,
            expected_bubbles: t.expected_bubbles(),
        }
    }
}

impl DebugDump {
    pub fn new(
        image: ImageDebug,
        template: &Template,
        config: &OmrConfig,
        analysis: Option<SheetAnalysis>,
        outcome: Outcome,
    ) -> Self {
        Self {
            schema_version: DEBUG_SCHEMA_V1.to_string(),
            image,
            template: TemplateSummary::from(template),
            config: config.clone(),
            analysis,
            outcome,
        }
    }

    pub fn write_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
