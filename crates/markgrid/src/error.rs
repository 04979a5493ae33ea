//! Error types for sheet processing.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OmrError>;

/// Pipeline stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preprocess,
    Detection,
    Reconstruction,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Preprocess => "preprocess",
            Self::Detection => "detection",
            Self::Reconstruction => "reconstruction",
        };
        f.write_str(name)
    }
}

/// Errors raised while loading templates or processing a sheet.
#[derive(Error, Debug)]
pub enum OmrError {
    /// The requested template id is not registered.
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    /// The pixel buffer is malformed (zero size, wrong channel count, short data).
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A pipeline stage failed.
    #[error("Processing failed during {stage}: {message}")]
    Stage { stage: Stage, message: String },

    /// A panic was caught at the processing boundary.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Template definition rejected (validation failure or duplicate id).
    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OmrError {
    pub(crate) fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }

    /// Machine-readable code reported in [`ErrorResult::error_code`].
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownTemplate(_) => ErrorCode::UnknownTemplate,
            Self::InvalidImage(_) => ErrorCode::InvalidImage,
            _ => ErrorCode::ProcessingFailed,
        }
    }
}

/// Error code carried by [`ErrorResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownTemplate,
    InvalidImage,
    ProcessingFailed,
}

/// Failed processing outcome.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorResult {
    /// Always `false`.
    pub success: bool,
    /// Human-readable description, including the failing stage when known.
    pub error: String,
    pub error_code: ErrorCode,
}

impl From<&OmrError> for ErrorResult {
    fn from(err: &OmrError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            error_code: err.code(),
        }
    }
}

impl From<OmrError> for ErrorResult {
    fn from(err: OmrError) -> Self {
        Self::from(&err)
    }
}
