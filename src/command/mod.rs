//! Commands: one block of SQL text executed as a lazily built sequence of statements.

pub(crate) mod registry;

pub use registry::CommandId;

use std::fmt;
use std::time::Duration;

use crate::connection::shared::{Session, SharedSession, lock};
use crate::error::{SqlExecError, SqlExecResult};
use crate::executor;
use crate::params::{ParameterCollection, binder};
use crate::sql_text;
use crate::statement::{StepResult, Statement};
use crate::types::Value;

/// A block of SQL text bound to one connection.
///
/// Statements are compiled one at a time, in order, the first time
/// [`get_statement`](Command::get_statement) asks for them, so a later statement may
/// depend on the effects of an earlier one (`CREATE TABLE` followed by `INSERT`).
///
/// ```rust,no_run
/// use sql_exec::prelude::*;
///
/// # fn main() -> Result<(), SqlExecError> {
/// let options = ConnectionOptions::builder("app.db").build()?;
/// let connection = Connection::open(options)?;
/// let mut command = connection.command("INSERT INTO t VALUES(?1); SELECT last_insert_rowid();");
/// command.parameters_mut().add(Value::Int(7));
/// let rowid = command.execute_scalar()?;
/// # let _ = rowid;
/// # Ok(())
/// # }
/// ```
pub struct Command {
    shared: SharedSession,
    id: CommandId,
    text: String,
    /// Byte offset of the unparsed remainder; `None` once no further statement can be built.
    remaining: Option<usize>,
    statements: Vec<Statement>,
    parameters: ParameterCollection,
    /// Anonymous placeholders seen across the built statements.
    unnamed_slots: usize,
}

impl Command {
    pub(crate) fn new(shared: SharedSession, text: String) -> Self {
        let id = {
            let mut session = lock(&shared);
            let timeout = session.default_timeout;
            session.registry.register(timeout)
        };
        Self {
            shared,
            id,
            text,
            remaining: Some(0),
            statements: Vec::new(),
            parameters: ParameterCollection::new(),
            unnamed_slots: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> CommandId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the command text. Every built statement is finalized.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.clear();
        self.text = text.into();
    }

    /// Timeout applied to lock retries of this command.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        lock(&self.shared).timeout_for(self.id)
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        lock(&self.shared).registry.set_timeout(self.id, timeout);
    }

    #[must_use]
    pub fn parameters(&self) -> &ParameterCollection {
        &self.parameters
    }

    /// Mutable access to the parameters; statements are remapped on their next access.
    pub fn parameters_mut(&mut self) -> &mut ParameterCollection {
        self.parameters.mark_dirty();
        &mut self.parameters
    }

    /// Number of statements compiled so far.
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// An already built statement, without compiling, resetting or binding anything.
    #[must_use]
    pub fn statement(&self, index: usize) -> Option<&Statement> {
        self.statements.get(index)
    }

    /// Statement `index` of the command, reset and bound with the current parameters.
    ///
    /// Requesting the statement right after the last built one compiles it from the
    /// remaining text; `Ok(None)` means the text holds no further statement.
    ///
    /// # Errors
    /// Returns [`SqlExecError::Misuse`] when `index` skips over unbuilt statements or a
    /// parameter slot has no value, and the engine error when compilation fails. A failed
    /// build ends the sequence: later calls past the built statements return `Ok(None)`.
    pub fn get_statement(&mut self, index: usize) -> SqlExecResult<Option<&Statement>> {
        let built = self.statements.len();
        if index > built {
            return Err(SqlExecError::misuse(format!(
                "statement {index} requested before statement {built} was built"
            )));
        }
        if index == built {
            return self.build_next();
        }

        self.remap_if_dirty();
        executor::rebind(&self.shared, &mut self.statements[index], &self.parameters)?;
        Ok(self.statements.get(index))
    }

    fn build_next(&mut self) -> SqlExecResult<Option<&Statement>> {
        let Some(offset) = self.remaining else {
            return Ok(None);
        };
        let rest = self.text.get(offset..).unwrap_or_default();
        if sql_text::is_blank(rest) {
            self.remaining = None;
            return Ok(None);
        }

        let prepared = match executor::prepare(&self.shared, rest, self.timeout()) {
            Ok(Some(prepared)) => prepared,
            Ok(None) => {
                self.remaining = None;
                return Ok(None);
            }
            Err(err) => {
                self.remaining = None;
                return Err(err);
            }
        };
        let sql = rest.get(..prepared.tail).unwrap_or(rest).trim().to_string();
        let index = self.statements.len();

        let mut session = lock(&self.shared);
        let (engine, _) = session.parts()?;
        let mut stmt = Statement::new(
            engine,
            prepared.handle,
            sql,
            self.id,
            index,
            self.unnamed_slots,
        );
        binder::map_one(&self.parameters, &mut stmt);
        if let Err(err) = stmt.bind_parameters(engine, &self.parameters) {
            discard(&mut session, &mut stmt);
            self.remaining = None;
            return Err(err);
        }
        drop(session);

        tracing::trace!(
            command = %self.id,
            statement = index,
            slots = stmt.slots().len(),
            "statement built"
        );
        self.remaining = Some(offset + prepared.tail);
        self.unnamed_slots += stmt.unnamed_count();
        self.statements.push(stmt);
        Ok(self.statements.last())
    }

    /// Keep slot-to-parameter mapping in step with the collection, so a re-prepare
    /// after a schema change binds by current positions. Values already bound to the
    /// live handle are only replaced on the next [`get_statement`](Self::get_statement).
    fn remap_if_dirty(&mut self) {
        if self.parameters.is_dirty() {
            binder::map_all(&mut self.parameters, &mut self.statements);
        }
    }

    /// Advance built statement `index` by one row.
    ///
    /// # Errors
    /// Returns [`SqlExecError::Misuse`] for an unbuilt statement, otherwise whatever the
    /// statement executor reports (lock timeout, engine failure, closed connection).
    pub fn step(&mut self, index: usize) -> SqlExecResult<StepResult> {
        self.remap_if_dirty();
        let stmt = self
            .statements
            .get_mut(index)
            .ok_or_else(|| not_built(index))?;
        executor::step(&self.shared, stmt, &self.parameters)
    }

    /// Reset built statement `index` so it can run again with its current bindings.
    ///
    /// # Errors
    /// Returns [`SqlExecError::Misuse`] for an unbuilt statement.
    pub fn reset(&mut self, index: usize) -> SqlExecResult<()> {
        self.remap_if_dirty();
        let stmt = self
            .statements
            .get_mut(index)
            .ok_or_else(|| not_built(index))?;
        executor::reset(&self.shared, stmt, &self.parameters)
    }

    /// Number of result columns of built statement `index`.
    ///
    /// # Errors
    /// Returns [`SqlExecError::Misuse`] for an unbuilt or finalized statement.
    pub fn column_count(&self, index: usize) -> SqlExecResult<usize> {
        let handle = self.statement(index).ok_or_else(|| not_built(index))?.live_handle()?;
        let mut session = lock(&self.shared);
        let (engine, _) = session.parts()?;
        Ok(engine.column_count(handle))
    }

    /// Column `column` of the current row of statement `index`.
    ///
    /// # Errors
    /// Returns [`SqlExecError::Misuse`] for an unbuilt or finalized statement.
    pub fn column_value(&self, index: usize, column: usize) -> SqlExecResult<Value> {
        let handle = self.statement(index).ok_or_else(|| not_built(index))?.live_handle()?;
        let mut session = lock(&self.shared);
        let (engine, _) = session.parts()?;
        Ok(engine.column_value(handle, column))
    }

    /// Run every statement to completion and return the rows changed by the ones that
    /// produce no result columns.
    ///
    /// # Errors
    /// Returns the first error raised while building or stepping a statement.
    pub fn execute_non_query(&mut self) -> SqlExecResult<usize> {
        let mut changed = 0;
        let mut index = 0;
        while self.get_statement(index)?.is_some() {
            while self.step(index)? == StepResult::Row {}

            let handle = self.statements[index].live_handle()?;
            let mut session = lock(&self.shared);
            let (engine, _) = session.parts()?;
            if engine.column_count(handle) == 0 {
                changed += engine.changes();
            }
            index += 1;
        }
        Ok(changed)
    }

    /// Run every statement to completion and return the first column of the first row
    /// produced, if any.
    ///
    /// # Errors
    /// Returns the first error raised while building or stepping a statement.
    pub fn execute_scalar(&mut self) -> SqlExecResult<Option<Value>> {
        let mut scalar = None;
        let mut index = 0;
        while self.get_statement(index)?.is_some() {
            while self.step(index)? == StepResult::Row {
                if scalar.is_none() {
                    scalar = Some(self.column_value(index, 0)?);
                }
            }
            index += 1;
        }
        Ok(scalar)
    }

    /// Finalize every built statement and start over from the beginning of the text.
    pub fn clear(&mut self) {
        let mut session = lock(&self.shared);
        for stmt in &mut self.statements {
            discard(&mut session, stmt);
        }
        drop(session);

        self.statements.clear();
        self.remaining = Some(0);
        self.unnamed_slots = 0;
        self.parameters.mark_dirty();
    }
}

fn not_built(index: usize) -> SqlExecError {
    SqlExecError::misuse(format!("statement {index} has not been built"))
}

/// Finalize `stmt` and stop tracking its handle. Failures are logged, never raised.
fn discard(session: &mut Session, stmt: &mut Statement) {
    let Some(handle) = stmt.handle() else {
        return;
    };
    session.registry.untrack(handle);
    match session.engine.as_deref_mut() {
        Some(engine) => {
            if let Err(err) = stmt.finalize(engine) {
                tracing::debug!(statement = stmt.index(), error = %err, "finalize failed");
            }
        }
        // a closed connection has already finalized every tracked handle
        None => stmt.forget(),
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        let mut session = lock(&self.shared);
        for stmt in &mut self.statements {
            discard(&mut session, stmt);
        }
        session.registry.unregister(self.id);
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("text", &self.text)
            .field("statements", &self.statements)
            .field("remaining", &self.remaining)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}
