use std::time::Duration;
use thiserror::Error;

/// Why a remote actuator write did not take effect.
///
/// All variants are recoverable: the toggle rolls back and the user may retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// the store answered but refused the write
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// connection, dns, tls...
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ControlError {
    fn from(e: reqwest::Error) -> Self {
        ControlError::Transport(e.to_string())
    }
}
