use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinancialStructureError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid pattern '{pattern}': {details}")]
    InvalidPattern { pattern: String, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation session not found: {0}")]
    SessionNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FinancialStructureError {
    /// Short machine-readable tag, carried on failure results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidGrid(_) => "invalid_grid",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::InvalidConfig(_) => "invalid_config",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SerializationError(_) => "serialization",
            Self::IoError(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, FinancialStructureError>;
