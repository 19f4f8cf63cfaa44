use thiserror::Error;

use crate::storage::StorageError;

/// Failure of a single queued request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The expected responses did not arrive in time
    #[error("request timed out")]
    Timeout,

    /// The station rejected the request with a NAK
    #[error("request was rejected")]
    Nak,

    /// The transport failed while the request was pending
    #[error("device error: {0}")]
    Device(String),
}

/// Errors from station operations
#[derive(Error, Debug)]
pub enum StationError {
    /// A coupled station did not respond to repeated wakeups
    #[error("unable to access coupled station")]
    Unreachable,

    /// The backup memory download could not be completed
    #[error("unable to read backup data")]
    BackupReadFailed,

    /// A response arrived with an unexpected shape
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A field name not present in the station layout
    #[error("unknown field {0:?}")]
    UnknownField(String),

    /// The underlying request failed
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A configuration field operation failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}
