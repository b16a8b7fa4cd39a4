//! Error types for the catalog store.
//!
//! All fallible operations return [`StoreResult`]. The variants follow the
//! failure classes of the persistence core: connection failures (fatal at
//! pool startup, per-call afterwards), database errors surfaced from the
//! driver, and position-validation failures raised by the repository before
//! any row is touched.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Connection pool is shut down")]
    PoolClosed,

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// Driver error code, e.g. "1811" for a SQLite constraint class
        code: Option<String>,
    },

    #[error("Lesson not found: {id}")]
    NotFound { id: i64 },

    #[error("Invalid position {requested}: expected a value between 1 and {max}")]
    InvalidPosition { requested: i64, max: i64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl StoreError {
    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a database error with an optional driver code.
    pub fn database(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            code,
        }
    }

    /// Create a not-found error for a lesson id.
    pub fn not_found(id: i64) -> Self {
        Self::NotFound { id }
    }

    /// Create a position-validation error. `max` is the highest position the
    /// rejected operation would have accepted.
    pub fn invalid_position(requested: i64, max: i64) -> Self {
        Self::InvalidPosition { requested, max }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// True when the underlying session is unusable and should be discarded
    /// rather than returned to the pool.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Convert sqlx errors to StoreError.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => StoreError::connection(msg.to_string()),
            sqlx::Error::Io(io_err) => StoreError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => StoreError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => {
                StoreError::connection(format!("Protocol error: {}", msg))
            }
            sqlx::Error::WorkerCrashed => StoreError::connection("Database worker crashed"),
            sqlx::Error::PoolClosed => StoreError::PoolClosed,
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                StoreError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => StoreError::database("No rows returned", None),
            other => StoreError::database(other.to_string(), None),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
