use thiserror::Error;

#[derive(Error, Debug)]
pub enum CutoutError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to decode base64 mask data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CutoutError {
    pub fn invalid_selection(message: impl Into<String>) -> Self {
        Self::InvalidSelection(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// True for failures that leave the document untouched by contract
    /// (bad input rather than a broken environment).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSelection(_) | Self::Precondition(_) | Self::LayerNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CutoutError>;
