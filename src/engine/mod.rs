//! Engine adapter boundary.
//!
//! Everything the executor knows about the embedded SQL engine goes through [`Engine`].
//! Raw engine result codes are classified here, once, into [`StepOutcome`] and
//! [`ResetOutcome`]; the rest of the crate never inspects numeric codes.

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::fmt;
use std::num::NonZeroUsize;

use crate::error::{SqlExecError, SqlExecResult};
use crate::types::Value;

/// Primary result codes of the SQLite family of engines.
pub mod codes {
    pub const OK: i32 = 0;
    pub const ERROR: i32 = 1;
    pub const BUSY: i32 = 5;
    pub const LOCKED: i32 = 6;
    pub const SCHEMA: i32 = 17;
    pub const MISUSE: i32 = 21;
    pub const ROW: i32 = 100;
    pub const DONE: i32 = 101;

    /// Strip extended-code bits.
    #[must_use]
    pub fn primary(code: i32) -> i32 {
        code & 0xff
    }
}

/// Opaque handle to one compiled statement, only meaningful to the engine that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtHandle(NonZeroUsize);

impl StmtHandle {
    #[must_use]
    pub fn new(raw: NonZeroUsize) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for StmtHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt#{:x}", self.0.get())
    }
}

/// A freshly compiled statement plus where the unconsumed text starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prepared {
    pub handle: StmtHandle,
    /// Byte offset into the prepared text at which the remainder begins.
    pub tail: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    RowAvailable,
    Finished,
    /// The step failed with this code; the executor resets the statement to learn why.
    Failed(i32),
}

impl StepOutcome {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match codes::primary(code) {
            codes::ROW => StepOutcome::RowAvailable,
            codes::DONE => StepOutcome::Finished,
            _ => StepOutcome::Failed(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    Ok,
    SchemaChanged,
    Locked(i32),
    Fatal { code: i32, message: String },
}

impl ResetOutcome {
    /// Classify the code returned by a reset. `message` is only consulted for fatal codes.
    pub fn from_code(code: i32, message: impl FnOnce() -> String) -> Self {
        match codes::primary(code) {
            codes::OK | codes::ROW | codes::DONE => ResetOutcome::Ok,
            codes::SCHEMA => ResetOutcome::SchemaChanged,
            codes::BUSY | codes::LOCKED => ResetOutcome::Locked(code),
            _ => ResetOutcome::Fatal {
                code,
                message: message(),
            },
        }
    }
}

/// Failure reported by an engine primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(codes::primary(self.code), codes::BUSY | codes::LOCKED)
    }

    #[must_use]
    pub fn is_schema_changed(&self) -> bool {
        codes::primary(self.code) == codes::SCHEMA
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine error {}: {}", self.code, self.message)
    }
}

impl From<EngineError> for SqlExecError {
    fn from(err: EngineError) -> Self {
        SqlExecError::Engine {
            code: err.code,
            message: err.message,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// One open physical connection to an embedded SQL engine.
///
/// Implementations must refuse handles they did not issue or have already finalized
/// (reporting [`codes::MISUSE`]) rather than trusting the caller.
pub trait Engine: Send {
    /// Compile the first statement of `sql`. `Ok(None)` means the text held only
    /// whitespace and comments.
    fn prepare(&mut self, sql: &str) -> EngineResult<Option<Prepared>>;

    fn step(&mut self, stmt: StmtHandle) -> StepOutcome;

    /// Reset `stmt` for re-execution, reporting the outcome of its most recent step.
    fn reset(&mut self, stmt: StmtHandle) -> ResetOutcome;

    fn finalize(&mut self, stmt: StmtHandle) -> EngineResult<()>;

    /// Bind `value` to the 0-based parameter `index`.
    fn bind(&mut self, stmt: StmtHandle, index: usize, value: &Value) -> EngineResult<()>;

    fn parameter_count(&self, stmt: StmtHandle) -> usize;

    /// Name of the 0-based parameter `index`, `None` for anonymous `?` placeholders.
    fn parameter_name(&self, stmt: StmtHandle, index: usize) -> Option<String>;

    fn last_error_text(&self) -> String;

    /// Rows changed by the most recently finished statement.
    fn changes(&self) -> usize;

    fn column_count(&self, stmt: StmtHandle) -> usize;

    /// Value of column `index` of the current row.
    fn column_value(&self, stmt: StmtHandle, index: usize) -> Value;

    /// Whether the underlying connection is still usable; dead engines are dropped by
    /// the pool instead of being handed out.
    fn is_live(&self) -> bool {
        true
    }

    /// Close the physical connection. Every statement must already be finalized.
    fn close(self: Box<Self>) -> EngineResult<()>;
}

/// Opens physical connections for a data source.
pub trait EngineOpener: Send + Sync {
    /// # Errors
    /// Returns [`SqlExecError::ConnectionError`] if the engine cannot open `source`.
    fn open(&self, source: &str, options: &OpenFlags) -> SqlExecResult<Box<dyn Engine>>;
}

/// Engine-level settings applied when a physical connection is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    pub read_only: bool,
    pub fail_if_missing: bool,
    /// Milliseconds the engine itself waits on a busy file lock before reporting it.
    pub busy_timeout_ms: u32,
}
