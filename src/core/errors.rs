use thiserror::Error;

/// Failure kinds produced inside an upload attempt.
///
/// These never escape the coordinator: every attempt settles into a terminal
/// [`UploadStatus`](super::UploadStatus) instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Encoding failure: {0}")]
    EncodingFailure(String),

    #[error("Upload was canceled")]
    Canceled,

    #[error("Transport failure: {0}")]
    TransportFailure(String),
}

impl UploadError {
    pub fn encoding_failure(message: impl Into<String>) -> Self {
        Self::EncodingFailure(message.into())
    }

    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::TransportFailure(message.into())
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransportFailure(err.to_string())
    }
}

/// Errors returned by [`UploadManager`](super::UploadManager) commands.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Manager shut down")]
    Shutdown,

    #[error("Worker panic: {0}")]
    WorkerPanic(String),
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
