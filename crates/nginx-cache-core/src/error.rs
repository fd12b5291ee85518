use crate::nonce::NonceError;
use crate::validator::ValidationReason;
use std::path::PathBuf;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type PurgeResult<T> = Result<T, PurgeError>;

/// Why a purge request did not complete.
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("{0}")]
    Invalid(ValidationReason),
    #[error("failed to remove cache zone {}: {source}", path.display())]
    Deletion {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("purge request rejected: {0}")]
    Unauthorized(#[from] NonceError),
}

/// Coarse classes used when deciding how to present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing configured yet. Informational only.
    Configuration,
    Validation,
    FilesystemUnavailable,
    Unauthorized,
    Deletion,
}

impl PurgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PurgeError::Invalid(ValidationReason::PathEmpty) => ErrorKind::Configuration,
            PurgeError::Invalid(ValidationReason::FilesystemUnavailable) => {
                ErrorKind::FilesystemUnavailable
            }
            PurgeError::Invalid(_) => ErrorKind::Validation,
            PurgeError::Deletion { .. } => ErrorKind::Deletion,
            PurgeError::Unauthorized(_) => ErrorKind::Unauthorized,
        }
    }

    pub fn validation_reason(&self) -> Option<ValidationReason> {
        match self {
            PurgeError::Invalid(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<ValidationReason> for PurgeError {
    fn from(reason: ValidationReason) -> Self {
        PurgeError::Invalid(reason)
    }
}

/// Render an error and every `source()` below it, one cause per line.
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = vec![error.to_string()];
    let mut source = error.source();

    while let Some(err) = source {
        chain.push(format!("  caused by: {}", err));
        source = err.source();
    }

    chain.join("\n")
}
