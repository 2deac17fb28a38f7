use std::fmt;
use thiserror::Error;

/// Pipeline stage that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    SolarGeometry,
    ClearSky,
    Decomposition,
    Completion,
    Transposition,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation    => "validation",
            Stage::SolarGeometry => "solar_geometry",
            Stage::ClearSky      => "clear_sky",
            Stage::Decomposition => "decomposition",
            Stage::Completion    => "completion",
            Stage::Transposition => "transposition",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one pipeline invocation. Any error aborts the whole batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("malformed input ({stage}): {reason}")]
    MalformedInput { stage: Stage, reason: String },

    #[error("invalid timestamp at index {index} ({stage}): {reason}")]
    InvalidTimestamp { stage: Stage, index: usize, reason: String },

    #[error("numeric degeneracy in {stage}: {field} at index {index} is {value}")]
    NumericDegeneracy { stage: Stage, field: &'static str, index: usize, value: f64 },
}

impl PipelineError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        PipelineError::MalformedInput { stage: Stage::Validation, reason: reason.into() }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::MalformedInput { stage, .. }
            | PipelineError::InvalidTimestamp { stage, .. }
            | PipelineError::NumericDegeneracy { stage, .. } => *stage,
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MalformedInput { .. }    => "MalformedInput",
            PipelineError::InvalidTimestamp { .. }  => "InvalidTimestamp",
            PipelineError::NumericDegeneracy { .. } => "NumericDegeneracy",
        }
    }
}

/// Errors raised while loading configuration at start-up.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter { name: &'static str, value: String, reason: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
