use thiserror::Error;

/// Primary result code reported for caller-contract violations.
pub const MISUSE_CODE: i32 = 21;
/// Generic engine error code, used when nothing more specific is known.
pub const GENERIC_ERROR_CODE: i32 = 1;
/// Result code used for connection open/close failures.
pub const CANT_OPEN_CODE: i32 = 14;

#[derive(Debug, Error)]
pub enum SqlExecError {
    /// Hard failure reported by the engine; never retried.
    #[error("SQL engine error {code}: {message}")]
    Engine { code: i32, message: String },

    /// The engine kept reporting a locked database until the command timeout elapsed.
    #[error("Database locked ({code}), gave up after timeout: {message}")]
    LockTimeout { code: i32, message: String },

    /// The caller broke the command contract (missing parameters, out-of-order statement
    /// access, use of a finalized statement).
    #[error("Misuse: {0}")]
    Misuse(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SqlExecError {
    pub(crate) fn engine(code: i32, message: impl Into<String>) -> Self {
        SqlExecError::Engine {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn misuse(message: impl Into<String>) -> Self {
        SqlExecError::Misuse(message.into())
    }

    /// Numeric result code carried by this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            SqlExecError::Engine { code, .. } | SqlExecError::LockTimeout { code, .. } => *code,
            SqlExecError::Misuse(_) => MISUSE_CODE,
            SqlExecError::ConnectionError(_) => CANT_OPEN_CODE,
            SqlExecError::ConfigError(_) => GENERIC_ERROR_CODE,
        }
    }

    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(self, SqlExecError::Misuse(_))
    }

    #[must_use]
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, SqlExecError::LockTimeout { .. })
    }
}

pub type SqlExecResult<T> = Result<T, SqlExecError>;
