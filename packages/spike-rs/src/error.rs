use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpikeError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Malformed input: {0}")]
    Format(String),

    #[error("Marker {marker_key} could not be resolved")]
    MarkerResolution { marker_key: String },

    #[error("Not enough data: {0}")]
    InsufficientData(String),

    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SpikeError {
    pub(crate) fn marker(key: impl Into<String>) -> Self {
        SpikeError::MarkerResolution {
            marker_key: key.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpikeError>;
