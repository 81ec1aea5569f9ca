use thiserror::Error;

/// Errors that can occur during Kusari core operations.
#[derive(Debug, Error)]
pub enum KusariError {
    /// A label dictionary line did not have exactly two columns.
    #[error("malformed label entry at line {line}: {text:?}")]
    MalformedLabelEntry {
        /// 1-based line number in the dictionary file.
        line: usize,
        /// The offending line.
        text: String,
    },

    /// Label ids were not a dense 0..N-1 range.
    #[error("label ids must be dense 0..{count}, id {id} is missing or duplicated")]
    SparseLabelIds {
        /// Number of entries in the dictionary.
        count: usize,
        /// The id that broke density.
        id: usize,
    },

    /// Tensor shapes violated a precondition.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The model weights file could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// An invalid configuration value was provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Candle ML framework error.
    #[error("ML inference error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse error.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Kusari operations.
pub type Result<T> = std::result::Result<T, KusariError>;
