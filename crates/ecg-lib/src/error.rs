use thiserror::Error;

/// Failures surfaced by the signal-to-decision pipeline.
///
/// Variants stay distinct so callers can tell "not trained yet" apart from
/// "corrupt model file" apart from "wrong feature shape".
#[derive(Debug, Error)]
pub enum EcgError {
    #[error("invalid waveform: {0}")]
    InvalidWaveform(String),

    #[error("insufficient data: cannot train on zero rows")]
    InsufficientData,

    #[error("no training data available")]
    NoTrainingData,

    #[error("label count {labels} does not match row count {rows}")]
    LabelCountMismatch { rows: usize, labels: usize },

    #[error("model is not fitted; train or load it first")]
    ModelNotFitted,

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("failed to save model: {0}")]
    ModelSave(#[from] std::io::Error),

    #[error("feature dimension mismatch: expected {expected}, found {found}")]
    FeatureDimensionMismatch { expected: usize, found: usize },

    #[error("dataset error: {0}")]
    Dataset(String),
}

impl EcgError {
    /// The model cannot serve predictions until it is (re)trained.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EcgError::ModelNotFitted | EcgError::ModelLoad(_))
    }

    /// The caller supplied malformed input.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            EcgError::InvalidWaveform(_) | EcgError::FeatureDimensionMismatch { .. }
        )
    }
}

pub type EcgResult<T> = std::result::Result<T, EcgError>;
