use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    /// The user dismissed the picker. Not a failure.
    #[error("Operation cancelled by the user")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("Decoding Error: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

impl FsError {
    pub fn failed<S: Into<String>>(message: S) -> Self {
        FsError::Failed(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FsError::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to {action} file: {status}")]
    Status {
        action: &'static str,
        status: reqwest::StatusCode,
    },
}
