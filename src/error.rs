use thiserror::Error;

pub use color_eyre::eyre::eyre;

use crate::protocol::{response::ErrPayload, response::ErrPayloadBytes};

pub type Result<T> = core::result::Result<T, Error>;

/// Deadlock found when trying to get lock; try restarting transaction.
const ERRNO_DEADLOCK: u16 = 1213;
/// Lock wait timeout exceeded; try restarting transaction.
const ERRNO_LOCK_WAIT_TIMEOUT: u16 = 1205;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    ServerError(#[from] ErrPayload),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("connection timed out: {0}")]
    Timeout(String),

    #[error("bad config: {0}")]
    BadConfigError(String),

    #[error("bad input: {0}")]
    BadInputError(String),

    #[error("bad usage: {0}")]
    BadUsageError(String),

    #[error("connection is not usable: {0}")]
    BadConnection(String),

    #[error("connection closed unexpectedly")]
    UnexpectedEof,

    #[error("a bug in tokio-mysql: {0}")]
    LibraryBug(color_eyre::Report),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unsupported authentication plugin: {0}")]
    UnsupportedAuthPlugin(String),

    #[error("unknown protocol element: {0}")]
    UnknownProtocolError(String),

    #[error("malformed packet")]
    InvalidPacket,

    #[error(
        "connection mismatch: transaction started on connection {expected}, but commit/rollback called on connection {actual}"
    )]
    ConnectionMismatch { expected: u64, actual: u64 },

    #[error("cannot nest transactions - a transaction is already active on this connection")]
    NestedTransaction,

    #[error("transaction is no longer active: {0}")]
    TransactionInactive(&'static str),

    #[error("invalid savepoint identifier {0:?}: {1}")]
    InvalidSavepoint(String, &'static str),

    #[error("prepared statement is closed")]
    StatementClosed,

    #[error(
        "prepared statement expects {expected} parameter(s), got {actual}"
    )]
    ParamCountMismatch { expected: usize, actual: usize },

    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("operation was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool is closed")]
    Closed,

    #[error("waiter queue is full ({max_waiters} waiters already queued)")]
    Overflow { max_waiters: usize },

    #[error("pool has not been initialized")]
    NotInitialized,
}

impl<'buf> From<ErrPayloadBytes<'buf>> for Error {
    fn from(value: ErrPayloadBytes<'buf>) -> Self {
        match ErrPayload::try_from(value) {
            Ok(err_payload) => Error::ServerError(err_payload),
            Err(err) => err,
        }
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}

impl Error {
    pub fn from_debug(err: impl std::fmt::Debug) -> Self {
        Self::LibraryBug(color_eyre::eyre::eyre!(format!("{:#?}", err)))
    }

    /// Classifies server errors that MySQL recommends retrying the whole
    /// transaction for, per the error-handling taxonomy's tier 1.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ServerError(e) if matches!(e.error_code, ERRNO_DEADLOCK | ERRNO_LOCK_WAIT_TIMEOUT))
    }

    /// `errno` of the underlying server error, if any.
    pub fn server_errno(&self) -> Option<u16> {
        match self {
            Error::ServerError(e) => Some(e.error_code),
            _ => None,
        }
    }
}

impl<Src, Dst: ?Sized> From<zerocopy::CastError<Src, Dst>> for Error {
    fn from(err: zerocopy::CastError<Src, Dst>) -> Self {
        Self::LibraryBug(color_eyre::eyre::eyre!("{:#?}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_and_lock_wait_timeout_are_retryable() {
        let deadlock = Error::ServerError(ErrPayload {
            error_code: ERRNO_DEADLOCK,
            sql_state: "40001".to_string(),
            message: "Deadlock found".to_string(),
        });
        assert!(deadlock.is_retryable());

        let lock_wait = Error::ServerError(ErrPayload {
            error_code: ERRNO_LOCK_WAIT_TIMEOUT,
            sql_state: "HY000".to_string(),
            message: "Lock wait timeout exceeded".to_string(),
        });
        assert!(lock_wait.is_retryable());

        let syntax_error = Error::ServerError(ErrPayload {
            error_code: 1064,
            sql_state: "42000".to_string(),
            message: "You have an error in your SQL syntax".to_string(),
        });
        assert!(!syntax_error.is_retryable());
    }
}
