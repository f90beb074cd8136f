pub mod alignment;
pub mod analyzer;
pub mod cli;
pub mod features;
pub mod metrics;
pub mod pipeline;
pub mod report;

use std::fmt::{Display, Formatter};

use serde::Serialize;
use thiserror::Error;

/// Convenient alias for results returned by comparison modules.
pub type Result<T> = std::result::Result<T, ComparisonError>;

/// Failure taxonomy for a single comparison.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComparisonError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("alignment failed: {0}")]
    Alignment(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error("publishing failed: {0}")]
    Publish(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid analysis configuration: {0}")]
    Config(String),

    #[error("transcription failed: {0}")]
    Transcription(String),
}

impl ComparisonError {
    pub fn fetch(url: &str, reason: impl Display) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Fetching,
    Decoding,
    Extracting,
    Aligning,
    Scoring,
    Rendering,
    Publishing,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fetching => "Fetching",
            Self::Decoding => "Decoding",
            Self::Extracting => "Extracting",
            Self::Aligning => "Aligning",
            Self::Scoring => "Scoring",
            Self::Rendering => "Rendering",
            Self::Publishing => "Publishing",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A [`ComparisonError`] tagged with the stage that raised it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: ComparisonError,
}

impl StageError {
    pub fn new(stage: Stage, source: ComparisonError) -> Self {
        Self { stage, source }
    }
}

pub type StageResult<T> = std::result::Result<T, StageError>;

/// Tags the error side of a core result with its stage.
pub trait AtStage<T> {
    fn at_stage(self, stage: Stage) -> StageResult<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at_stage(self, stage: Stage) -> StageResult<T> {
        self.map_err(|source| StageError::new(stage, source))
    }
}
