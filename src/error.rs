//! Error types for cutout pipeline operations

use thiserror::Error;

/// Result type alias for cutout operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Comprehensive error types for the cutout pipeline
///
/// Every pipeline stage reports failures through this enum. Translation into
/// an outward-facing response happens once, at the HTTP boundary, via
/// [`CutoutError::kind`].
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Bearer token or request signature check failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Network, status or timeout failure while fetching the source image
    #[error("Failed to download image: {0}")]
    Download(String),

    /// The source responded with something that is not an image
    #[error("Download failed: {0}")]
    InvalidContent(String),

    /// Source bytes could not be decoded, even leniently
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// The matting engine failed
    #[error("Matting failed: {0}")]
    Matting(String),

    /// PNG serialization failed
    #[error("Failed to encode PNG: {0}")]
    Encode(String),

    /// Model resolution, download or loading errors
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (cache directory, model file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification used for status-code mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    Download,
    InvalidContent,
    Decode,
    Matting,
    Encode,
    Model,
    InvalidConfig,
    Io,
    Internal,
}

impl CutoutError {
    /// Create a new unauthorized error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a new download error
    pub fn download<S: Into<String>>(msg: S) -> Self {
        Self::Download(msg.into())
    }

    /// Create a new invalid content error
    pub fn invalid_content<S: Into<String>>(msg: S) -> Self {
        Self::InvalidContent(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new matting error
    pub fn matting<S: Into<String>>(msg: S) -> Self {
        Self::Matting(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a download error from a transport failure, naming timeouts explicitly
    pub fn from_transport(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Download(format!("request to {url} timed out: {error}"))
        } else if error.is_connect() {
            Self::Download(format!("could not connect to {url}: {error}"))
        } else {
            Self::Download(format!("{url}: {error}"))
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Classify this error for boundary translation
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Download(_) => ErrorKind::Download,
            Self::InvalidContent(_) => ErrorKind::InvalidContent,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Matting(_) => ErrorKind::Matting,
            Self::Encode(_) => ErrorKind::Encode,
            Self::Model(_) => ErrorKind::Model,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Io(_) => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error points at a defect on our side rather than the source or caller
    #[must_use]
    pub fn is_server_defect(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Encode | ErrorKind::Internal | ErrorKind::Io | ErrorKind::InvalidConfig
        )
    }
}
