use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::token::TokenId;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("token {0} is not registered")]
    Unregistered(TokenId),

    #[error("token {0} is already registered")]
    AlreadyRegistered(TokenId),

    #[error("token {0} is not in the registry")]
    NotRegistered(TokenId),

    #[error("no free parking slots")]
    SlotsFull,

    #[error("token {token} already occupies slot {slot}")]
    AlreadyParked { token: TokenId, slot: usize },

    #[error("walk-in denied: remaining capacity is held for reservations")]
    WalkInDenied,

    #[error("failed to persist {}: {source}", path.display())]
    PersistenceFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no card presented within {0:?}")]
    ScanTimeout(Duration),

    #[error("scan cancelled by shutdown")]
    ScanCancelled,

    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("storage task failed: {0}")]
    StorageTask(String),
}

impl GateError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        Self::PersistenceFailure {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Operational faults, as opposed to business outcomes the caller reports
    /// and moves on from.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure { .. } | Self::HardwareUnavailable(_) | Self::StorageTask(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
