//! [`Engine`] implementation over the SQLite C API (bundled through `rusqlite::ffi`).
//!
//! This is the only module of the crate that contains `unsafe` code. Every raw pointer
//! it touches is either the connection pointer owned by [`SqliteEngine`] or a statement
//! pointer that engine issued and has not finalized yet. Handles are checked against the
//! engine's own set of issued statements before they reach the C API; anything else is
//! answered with `SQLITE_MISUSE`.
#![allow(unsafe_code)]

use std::collections::HashSet;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::num::NonZeroUsize;
use std::ptr;

use rusqlite::ffi;

use super::{
    Engine, EngineError, EngineOpener, EngineResult, OpenFlags, Prepared, ResetOutcome,
    StepOutcome, StmtHandle, codes,
};
use crate::error::{SqlExecError, SqlExecResult};
use crate::types::{StorageValue, Value};

const SQLITE_TOOBIG: i32 = 18;

/// Opens [`SqliteEngine`] connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteOpener;

impl EngineOpener for SqliteOpener {
    fn open(&self, source: &str, options: &OpenFlags) -> SqlExecResult<Box<dyn Engine>> {
        Ok(Box::new(SqliteEngine::open(source, options)?))
    }
}

/// One SQLite database connection.
pub struct SqliteEngine {
    db: *mut ffi::sqlite3,
    /// Statement pointers issued by `prepare` and not yet finalized.
    statements: HashSet<usize>,
}

// The connection is opened in serialized (full mutex) mode and owned by exactly one
// `SqliteEngine`, so moving it between threads is sound.
unsafe impl Send for SqliteEngine {}

impl SqliteEngine {
    /// Open `source` (a file path, `:memory:` or a `file:` URI).
    ///
    /// # Errors
    /// Returns [`SqlExecError::ConnectionError`] if SQLite cannot open the database.
    pub fn open(source: &str, options: &OpenFlags) -> SqlExecResult<Self> {
        let path = CString::new(source).map_err(|_| {
            SqlExecError::ConnectionError(format!("data source contains a NUL byte: {source:?}"))
        })?;

        let mut flags = ffi::SQLITE_OPEN_FULLMUTEX | ffi::SQLITE_OPEN_URI;
        if options.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        } else {
            flags |= ffi::SQLITE_OPEN_READWRITE;
            if !options.fail_if_missing {
                flags |= ffi::SQLITE_OPEN_CREATE;
            }
        }

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let rc = unsafe { ffi::sqlite3_open_v2(path.as_ptr(), &mut db, flags, ptr::null()) };
        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                format!("unable to open {source}")
            } else {
                let msg = unsafe { errmsg(db) };
                unsafe { ffi::sqlite3_close(db) };
                msg
            };
            return Err(SqlExecError::ConnectionError(format!(
                "sqlite open failed ({rc}): {message}"
            )));
        }

        if options.busy_timeout_ms > 0 {
            let ms = c_int::try_from(options.busy_timeout_ms).unwrap_or(c_int::MAX);
            unsafe { ffi::sqlite3_busy_timeout(db, ms) };
        }

        tracing::debug!(source, "opened sqlite connection");
        Ok(Self {
            db,
            statements: HashSet::new(),
        })
    }

    /// The raw statement behind `handle`, if this engine issued it and it is still live.
    fn stmt_ptr(&self, handle: StmtHandle) -> Option<*mut ffi::sqlite3_stmt> {
        self.statements
            .contains(&handle.raw())
            .then(|| handle.raw() as *mut ffi::sqlite3_stmt)
    }

    fn lookup(&self, handle: StmtHandle) -> EngineResult<*mut ffi::sqlite3_stmt> {
        self.stmt_ptr(handle).ok_or_else(|| unknown_handle(handle))
    }

    fn error(&self, code: c_int) -> EngineError {
        EngineError::new(code, self.last_error_text())
    }

    fn check(&self, rc: c_int) -> EngineResult<()> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(rc))
        }
    }
}

fn unknown_handle(handle: StmtHandle) -> EngineError {
    EngineError::new(
        codes::MISUSE,
        format!("{handle} was not issued by this connection or is already finalized"),
    )
}

fn c_len(len: usize) -> EngineResult<c_int> {
    c_int::try_from(len).map_err(|_| EngineError::new(SQLITE_TOOBIG, "string or blob too big"))
}

fn c_index(index: usize) -> c_int {
    c_int::try_from(index).unwrap_or(c_int::MAX)
}

/// # Safety
/// `db` must be a live connection pointer.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    let msg = unsafe { ffi::sqlite3_errmsg(db) };
    if msg.is_null() {
        String::from("unknown error")
    } else {
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }
}

impl Engine for SqliteEngine {
    fn prepare(&mut self, sql: &str) -> EngineResult<Option<Prepared>> {
        // empty statements (a lone `;`) yield no handle; skip past them
        let mut offset = 0;
        while offset < sql.len() {
            let rest = &sql[offset..];
            let n_byte = c_len(rest.len())?;
            let start = rest.as_ptr().cast::<c_char>();
            let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
            let mut tail: *const c_char = ptr::null();
            let rc =
                unsafe { ffi::sqlite3_prepare_v2(self.db, start, n_byte, &mut stmt, &mut tail) };
            if rc != ffi::SQLITE_OK {
                return Err(self.error(rc));
            }
            let consumed = if tail.is_null() {
                rest.len()
            } else {
                (tail as usize).saturating_sub(start as usize).min(rest.len())
            };
            if let Some(raw) = NonZeroUsize::new(stmt as usize) {
                self.statements.insert(raw.get());
                return Ok(Some(Prepared {
                    handle: StmtHandle::new(raw),
                    tail: offset + consumed,
                }));
            }
            if consumed == 0 {
                break;
            }
            offset += consumed;
        }
        Ok(None)
    }

    fn step(&mut self, stmt: StmtHandle) -> StepOutcome {
        match self.stmt_ptr(stmt) {
            Some(raw) => StepOutcome::from_code(unsafe { ffi::sqlite3_step(raw) }),
            None => StepOutcome::Failed(codes::MISUSE),
        }
    }

    fn reset(&mut self, stmt: StmtHandle) -> ResetOutcome {
        let Some(raw) = self.stmt_ptr(stmt) else {
            return ResetOutcome::Fatal {
                code: codes::MISUSE,
                message: unknown_handle(stmt).message,
            };
        };
        let rc = unsafe { ffi::sqlite3_reset(raw) };
        ResetOutcome::from_code(rc, || self.last_error_text())
    }

    fn finalize(&mut self, stmt: StmtHandle) -> EngineResult<()> {
        let raw = self.lookup(stmt)?;
        self.statements.remove(&stmt.raw());
        // finalize reports the last step error again; the handle is released regardless.
        unsafe { ffi::sqlite3_finalize(raw) };
        Ok(())
    }

    fn bind(&mut self, stmt: StmtHandle, index: usize, value: &Value) -> EngineResult<()> {
        let raw = self.lookup(stmt)?;
        let idx = c_index(index + 1);
        let rc = match value.to_storage() {
            StorageValue::Integer(i) => unsafe { ffi::sqlite3_bind_int64(raw, idx, i) },
            StorageValue::Real(f) => unsafe { ffi::sqlite3_bind_double(raw, idx, f) },
            StorageValue::Null => unsafe { ffi::sqlite3_bind_null(raw, idx) },
            StorageValue::Text(text) => {
                let len = c_len(text.len())?;
                unsafe {
                    ffi::sqlite3_bind_text(
                        raw,
                        idx,
                        text.as_ptr().cast::<c_char>(),
                        len,
                        ffi::SQLITE_TRANSIENT(),
                    )
                }
            }
            StorageValue::Blob(bytes) if bytes.is_empty() => unsafe {
                ffi::sqlite3_bind_zeroblob(raw, idx, 0)
            },
            StorageValue::Blob(bytes) => {
                let len = c_len(bytes.len())?;
                unsafe {
                    ffi::sqlite3_bind_blob(
                        raw,
                        idx,
                        bytes.as_ptr().cast::<c_void>(),
                        len,
                        ffi::SQLITE_TRANSIENT(),
                    )
                }
            }
        };
        self.check(rc)
    }

    fn parameter_count(&self, stmt: StmtHandle) -> usize {
        let Some(raw) = self.stmt_ptr(stmt) else {
            return 0;
        };
        let n = unsafe { ffi::sqlite3_bind_parameter_count(raw) };
        usize::try_from(n).unwrap_or(0)
    }

    fn parameter_name(&self, stmt: StmtHandle, index: usize) -> Option<String> {
        let raw = self.stmt_ptr(stmt)?;
        let name = unsafe { ffi::sqlite3_bind_parameter_name(raw, c_index(index + 1)) };
        if name.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
        }
    }

    fn last_error_text(&self) -> String {
        unsafe { errmsg(self.db) }
    }

    fn changes(&self) -> usize {
        usize::try_from(unsafe { ffi::sqlite3_changes(self.db) }).unwrap_or(0)
    }

    fn column_count(&self, stmt: StmtHandle) -> usize {
        let Some(raw) = self.stmt_ptr(stmt) else {
            return 0;
        };
        usize::try_from(unsafe { ffi::sqlite3_column_count(raw) }).unwrap_or(0)
    }

    fn column_value(&self, stmt: StmtHandle, index: usize) -> Value {
        let Some(raw) = self.stmt_ptr(stmt) else {
            return Value::Null;
        };
        let col = c_index(index);
        match unsafe { ffi::sqlite3_column_type(raw, col) } {
            ffi::SQLITE_INTEGER => Value::Int(unsafe { ffi::sqlite3_column_int64(raw, col) }),
            ffi::SQLITE_FLOAT => Value::Float(unsafe { ffi::sqlite3_column_double(raw, col) }),
            ffi::SQLITE_TEXT => {
                let text = unsafe { ffi::sqlite3_column_text(raw, col) };
                let len = unsafe { ffi::sqlite3_column_bytes(raw, col) };
                if text.is_null() {
                    return Value::Text(String::new());
                }
                let bytes =
                    unsafe { std::slice::from_raw_parts(text, usize::try_from(len).unwrap_or(0)) };
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
            ffi::SQLITE_BLOB => {
                let blob = unsafe { ffi::sqlite3_column_blob(raw, col) };
                let len = unsafe { ffi::sqlite3_column_bytes(raw, col) };
                if blob.is_null() {
                    return Value::Blob(Vec::new());
                }
                let bytes = unsafe {
                    std::slice::from_raw_parts(blob.cast::<u8>(), usize::try_from(len).unwrap_or(0))
                };
                Value::Blob(bytes.to_vec())
            }
            _ => Value::Null,
        }
    }

    fn is_live(&self) -> bool {
        !self.db.is_null()
    }

    fn close(mut self: Box<Self>) -> EngineResult<()> {
        let db = std::mem::replace(&mut self.db, ptr::null_mut());
        if db.is_null() {
            return Ok(());
        }
        let rc = unsafe { ffi::sqlite3_close(db) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            // close failed (unfinalized statements); let SQLite free it once they go away
            unsafe { ffi::sqlite3_close_v2(db) };
            Err(EngineError::new(rc, "unable to close due to unfinalized statements"))
        }
    }
}

impl Drop for SqliteEngine {
    fn drop(&mut self) {
        if !self.db.is_null() {
            unsafe { ffi::sqlite3_close_v2(self.db) };
            self.db = ptr::null_mut();
        }
    }
}
