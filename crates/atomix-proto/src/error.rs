/// Atomix error types.
///
/// Errors from the messaging layer, the partition-group manager, and
/// lifecycle misuse are represented as a single enum.

use serde::{Deserialize, Serialize};

/// Unified error type for all atomix operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AtomixError {
    #[error("no remote handler registered for subject")]
    NoRemoteHandler,
    #[error("request timed out")]
    Timeout,
    #[error("network error")]
    Network,
    #[error("failed to encode message")]
    Encode,
    #[error("failed to decode message")]
    Decode,
    #[error("configuration conflict for partition group '{group}'")]
    ConfigurationConflict { group: String },
    #[error("unknown partition group type '{group_type}'")]
    UnknownGroupType { group_type: String },
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("unknown member '{0}'")]
    UnknownMember(String),
    #[error("service already started")]
    AlreadyStarted,
    #[error("service not started")]
    NotStarted,
    #[error("service stopped")]
    Stopped,
}

impl AtomixError {
    /// Whether a messaging failure should be retried against the same
    /// peer. Only a missing remote handler and a timeout are transient
    /// in this sense; every other transport error drops the peer's
    /// contribution for the round.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AtomixError::NoRemoteHandler | AtomixError::Timeout)
    }
}

/// Result type alias for atomix operations.
pub type AtomixResult<T> = Result<T, AtomixError>;

impl From<std::io::Error> for AtomixError {
    fn from(_: std::io::Error) -> Self {
        AtomixError::Network
    }
}
