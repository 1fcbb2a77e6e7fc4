use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    MemoryWriteFailed { address: u64, message: String },

    /// Pausing or resuming the emulator failed. Any writes not yet issued in
    /// the current operation are abandoned.
    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Invalid variable '{name}': {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("Invalid base definition '{tag}': {reason}")]
    InvalidBase { tag: String, reason: String },

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if a file or process was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ProcessNotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Check if this error came from pausing or resuming the target process
    pub fn is_transaction(&self) -> bool {
        matches!(self, Error::Transaction(_))
    }

    pub(crate) fn invalid_variable(name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidVariable {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
