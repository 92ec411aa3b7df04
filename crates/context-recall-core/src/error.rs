use thiserror::Error;

/// Error taxonomy shared by every retrieval and embedding component.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecallError {
    /// Null, empty, or otherwise unusable input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Two vectors that must share a dimensionality do not.
    #[error("Dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// Embedding, vector-store, or content-store backend failure.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Missing credentials or an unset connection target.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RecallError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for both validation variants.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::DimensionMismatch { .. })
    }
}

impl From<serde_json::Error> for RecallError {
    fn from(e: serde_json::Error) -> Self {
        Self::Provider(format!("malformed backend payload: {}", e))
    }
}

/// Result type for Context Recall operations.
pub type Result<T> = std::result::Result<T, RecallError>;
