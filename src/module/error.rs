//! Scan Errors
//!
//! Every failure a scan can end in. Each variant renders a distinct message
//! so the caller can choose what to announce to the user.

use thiserror::Error;

/// Errors raised while recognizing a banknote.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("model is not ready: {0}")]
    ModelNotReady(String),
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to read capture {path}: {source}")]
    Capture {
        path: String,
        source: std::io::Error,
    },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("class index {index} is outside the {classes}-entry denomination table")]
    InvalidClassIndex { index: usize, classes: usize },
    #[error("server unreachable: {0}")]
    Network(String),
    #[error("server responded {status}: {body}")]
    Server { status: u16, body: String },
    #[error("banknote not recognized: {0}")]
    Unrecognized(String),
    #[error("a scan request is already in flight")]
    Busy,
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse error classes, one per user-facing prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelNotReady,
    ImageDecode,
    Inference,
    InvalidClassIndex,
    Network,
    Server,
    Unrecognized,
    Busy,
    Config,
}

impl ScanError {
    /// Class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::ModelNotReady(_) | ScanError::ModelLoad(_) => ErrorKind::ModelNotReady,
            ScanError::Decode(_) | ScanError::Capture { .. } => ErrorKind::ImageDecode,
            ScanError::Inference(_) => ErrorKind::Inference,
            ScanError::InvalidClassIndex { .. } => ErrorKind::InvalidClassIndex,
            ScanError::Network(_) => ErrorKind::Network,
            ScanError::Server { .. } => ErrorKind::Server,
            ScanError::Unrecognized(_) => ErrorKind::Unrecognized,
            ScanError::Busy => ErrorKind::Busy,
            ScanError::Config(_) | ScanError::Io(_) => ErrorKind::Config,
        }
    }

    /// Fatal errors mean the installation itself is broken; retrying the scan cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidClassIndex { .. } | ScanError::Config(_)
        )
    }
}

impl From<image::ImageError> for ScanError {
    fn from(err: image::ImageError) -> Self {
        ScanError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for ScanError {
    fn from(err: base64::DecodeError) -> Self {
        ScanError::Decode(format!("invalid base64: {err}"))
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ScanError::Server {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => ScanError::Network(err.to_string()),
        }
    }
}
