//! Answer-sheet layout templates.
//!
//! The built-in registry carries the four stock sheets. Additional templates
//! are loaded from JSON files following the `markgrid.templates.v1` schema:
//!
//! ```json
//! {
//!   "schema": "markgrid.templates.v1",
//!   "templates": [
//!     { "id": "quiz_10", "name": "Quiz", "question_count": 10,
//!       "choice_labels": ["A", "B", "C"], "bubble_radius_min": 8,
//!       "bubble_radius_max": 20, "choices_per_row": 3 }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use crate::error::{OmrError, Result};

const TEMPLATES_SCHEMA_V1: &str = "markgrid.templates.v1";

/// Arrangement hint carried by a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutTag {
    Vertical,
    #[default]
    Grid,
}

/// Static description of one sheet layout.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Number of questions on the sheet.
    pub question_count: usize,
    /// Ordered choice labels, e.g. `["A", "B", "C", "D"]`.
    pub choice_labels: Vec<String>,
    /// Smallest bubble radius accepted by the detectors (pixels).
    pub bubble_radius_min: u32,
    /// Largest bubble radius accepted by the detectors (pixels).
    pub bubble_radius_max: u32,
    /// Bubbles per printed row; partition width for exact reconstruction.
    pub choices_per_row: usize,
    #[serde(default)]
    pub layout_tag: LayoutTag,
}

impl Template {
    /// Number of bubbles the sheet is expected to carry.
    pub fn expected_bubbles(&self) -> usize {
        self.question_count * self.choice_labels.len()
    }

    /// Number of choices per question.
    pub fn choice_count(&self) -> usize {
        self.choice_labels.len()
    }

    /// Check structural constraints of the template definition.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("template id must not be empty".to_string());
        }
        if self.question_count == 0 {
            return Err(format!("{}: question_count must be >= 1", self.id));
        }
        if self.choice_labels.is_empty() {
            return Err(format!("{}: choice_labels must not be empty", self.id));
        }
        let mut seen = HashSet::new();
        for label in &self.choice_labels {
            if label.is_empty() {
                return Err(format!("{}: choice labels must not be empty strings", self.id));
            }
            if !seen.insert(label.as_str()) {
                return Err(format!("{}: duplicate choice label '{}'", self.id, label));
            }
        }
        if self.bubble_radius_min == 0 {
            return Err(format!("{}: bubble_radius_min must be >= 1", self.id));
        }
        if self.bubble_radius_min > self.bubble_radius_max {
            return Err(format!(
                "{}: bubble_radius_min ({}) exceeds bubble_radius_max ({})",
                self.id, self.bubble_radius_min, self.bubble_radius_max
            ));
        }
        if self.choices_per_row == 0 {
            return Err(format!("{}: choices_per_row must be >= 1", self.id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateFileV1 {
    schema: String,
    templates: Vec<Template>,
}

/// Read-only lookup of templates by id, in registration order.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    /// Empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the stock sheets.
    pub fn builtin() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> + '_ {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Add a template. Invalid definitions and duplicate ids are rejected.
    pub fn register(&mut self, template: Template) -> Result<()> {
        template.validate().map_err(OmrError::Template)?;
        if self.get(&template.id).is_some() {
            return Err(OmrError::Template(format!(
                "duplicate template id '{}'",
                template.id
            )));
        }
        self.templates.push(template);
        Ok(())
    }

    /// Register every template of a `markgrid.templates.v1` document.
    ///
    /// The registry is left untouched if any entry is rejected.
    pub fn extend_from_json_str(&mut self, json: &str) -> Result<usize> {
        let file: TemplateFileV1 = serde_json::from_str(json)?;
        if file.schema != TEMPLATES_SCHEMA_V1 {
            return Err(OmrError::Template(format!(
                "unsupported templates schema '{}' (expected '{}')",
                file.schema, TEMPLATES_SCHEMA_V1
            )));
        }
        let mut staged = self.clone();
        for template in file.templates {
            staged.register(template)?;
        }
        let added = staged.len() - self.len();
        *self = staged;
        Ok(added)
    }

    pub fn extend_from_json_file(&mut self, path: &Path) -> Result<usize> {
        let data = std::fs::read_to_string(path)?;
        self.extend_from_json_str(&data)
    }
}

fn labels(s: &str) -> Vec<String> {
    s.chars().map(|c| c.to_string()).collect()
}

fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            id: "simple_5".to_string(),
            name: "Simple 5 Questions".to_string(),
            description: "5-question bubble sheet with A-D choices (optimized detection)"
                .to_string(),
            question_count: 5,
            choice_labels: labels("ABCD"),
            bubble_radius_min: 10,
            bubble_radius_max: 50,
            choices_per_row: 4,
            layout_tag: LayoutTag::Vertical,
        },
        Template {
            id: "standard_25".to_string(),
            name: "Standard 25 Questions".to_string(),
            description: "Standard 25-question bubble sheet with A-D choices".to_string(),
            question_count: 25,
            choice_labels: labels("ABCD"),
            bubble_radius_min: 15,
            bubble_radius_max: 45,
            choices_per_row: 4,
            layout_tag: LayoutTag::Grid,
        },
        Template {
            id: "standard_50".to_string(),
            name: "Standard 50 Questions".to_string(),
            description: "Standard 50-question bubble sheet with A-D choices".to_string(),
            question_count: 50,
            choice_labels: labels("ABCD"),
            bubble_radius_min: 12,
            bubble_radius_max: 35,
            choices_per_row: 4,
            layout_tag: LayoutTag::Grid,
        },
        Template {
            id: "extended_100".to_string(),
            name: "Extended 100 Questions".to_string(),
            description: "Extended 100-question bubble sheet with A-E choices".to_string(),
            question_count: 100,
            choice_labels: labels("ABCDE"),
            bubble_radius_min: 10,
            bubble_radius_max: 30,
            choices_per_row: 5,
            layout_tag: LayoutTag::Grid,
        },
    ]
}
