//! In-memory engine with scriptable failures.
//!
//! [`ScriptedEngine`] understands just enough SQL to hand out statements: it splits text
//! into top-level statements, numbers placeholders the way SQLite does and rejects
//! unknown leading keywords as syntax errors. Row-returning statements (`SELECT`, `WITH`,
//! `VALUES`) produce exactly one row whose single column is the first bound parameter, or
//! the simulated last insert rowid when nothing is bound.
//!
//! Every engine opened by a [`ScriptedOpener`] shares one [`EngineScript`], which queues
//! failures for upcoming steps and prepares and counts every engine call.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::{
    Engine, EngineError, EngineOpener, EngineResult, OpenFlags, Prepared, ResetOutcome,
    StepOutcome, StmtHandle, codes,
};
use crate::error::{SqlExecError, SqlExecResult};
use crate::sql_text::{self, Placeholder};
use crate::types::Value;

const RANGE: i32 = 25;

const KEYWORDS: &[&str] = &[
    "ALTER", "ANALYZE", "ATTACH", "BEGIN", "COMMIT", "CREATE", "DELETE", "DETACH", "DROP", "END",
    "INSERT", "PRAGMA", "REINDEX", "RELEASE", "REPLACE", "ROLLBACK", "SAVEPOINT", "SELECT",
    "UPDATE", "VACUUM", "VALUES", "WITH",
];

#[derive(Debug, Default)]
struct ScriptState {
    step_failures: VecDeque<(i32, ResetOutcome)>,
    prepare_failures: VecDeque<EngineError>,
    always_locked: bool,
    dead: bool,
    fail_open: bool,
    next_handle: usize,
    opens: usize,
    prepares: usize,
    finalizes: usize,
    binds: usize,
    closes: usize,
    executed: Vec<String>,
    bound: HashMap<StmtHandle, Vec<Option<Value>>>,
}

/// Shared script and call counters for every engine of one [`ScriptedOpener`].
#[derive(Debug, Clone, Default)]
pub struct EngineScript {
    state: Arc<Mutex<ScriptState>>,
}

impl EngineScript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next step of any statement fail with `step_code`; the reset that follows
    /// reports `reset`.
    pub fn fail_next_step(&self, step_code: i32, reset: ResetOutcome) {
        self.lock().step_failures.push_back((step_code, reset));
    }

    /// Report the database as locked for the next `count` steps.
    pub fn lock_next_steps(&self, count: usize) {
        for _ in 0..count {
            self.fail_next_step(codes::BUSY, ResetOutcome::Locked(codes::BUSY));
        }
    }

    /// Invalidate the next stepped statement as if another connection altered the schema.
    pub fn change_schema_on_next_step(&self) {
        self.fail_next_step(codes::SCHEMA, ResetOutcome::SchemaChanged);
    }

    /// Keep every step locked until switched off.
    pub fn set_always_locked(&self, locked: bool) {
        self.lock().always_locked = locked;
    }

    pub fn fail_next_prepare(&self, code: i32, message: impl Into<String>) {
        self.lock()
            .prepare_failures
            .push_back(EngineError::new(code, message));
    }

    /// Mark every engine of this script as no longer live.
    pub fn kill(&self) {
        self.lock().dead = true;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    #[must_use]
    pub fn prepare_count(&self) -> usize {
        self.lock().prepares
    }

    #[must_use]
    pub fn finalize_count(&self) -> usize {
        self.lock().finalizes
    }

    #[must_use]
    pub fn bind_count(&self) -> usize {
        self.lock().binds
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Statements prepared and not yet finalized, across all engines.
    #[must_use]
    pub fn open_statements(&self) -> usize {
        let state = self.lock();
        state.prepares - state.finalizes
    }

    /// Text of every statement stepped to completion, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Values currently bound to `handle`, by 0-based slot.
    #[must_use]
    pub fn bound_values(&self, handle: StmtHandle) -> Option<Vec<Option<Value>>> {
        self.lock().bound.get(&handle).cloned()
    }
}

#[derive(Debug)]
struct FakeStatement {
    sql: String,
    names: Vec<Option<String>>,
    bound: Vec<Option<Value>>,
    returns_row: bool,
    row_emitted: bool,
    done: bool,
    /// Outcome the next reset reports after a failed step.
    failure: Option<ResetOutcome>,
}

impl FakeStatement {
    fn new(sql: String, keyword: &str) -> Self {
        let names = parameter_names(&sql);
        Self {
            bound: vec![None; names.len()],
            names,
            returns_row: matches!(keyword, "SELECT" | "WITH" | "VALUES"),
            row_emitted: false,
            done: false,
            failure: None,
            sql,
        }
    }
}

/// Parameter names by 0-based index, numbered as SQLite numbers them: `?` takes the next
/// index after the largest so far, `?NNN` takes `NNN`, a repeated name reuses its index.
fn parameter_names(sql: &str) -> Vec<Option<String>> {
    let mut names: Vec<Option<String>> = Vec::new();
    for placeholder in sql_text::placeholders(sql) {
        match placeholder {
            Placeholder::Anonymous => names.push(None),
            Placeholder::Numbered(n) => {
                if names.len() < n {
                    names.resize(n, None);
                }
                if let Some(slot) = n.checked_sub(1).and_then(|i| names.get_mut(i)) {
                    *slot = Some(format!("?{n}"));
                }
            }
            Placeholder::Named(name) => {
                if !names.iter().any(|n| n.as_deref() == Some(name.as_str())) {
                    names.push(Some(name));
                }
            }
        }
    }
    names
}

fn leading_keyword(text: &str) -> String {
    text.chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_uppercase()
}

/// A fake engine connection; see the module docs.
#[derive(Debug)]
pub struct ScriptedEngine {
    script: EngineScript,
    statements: HashMap<StmtHandle, FakeStatement>,
    last_error: String,
    changes: usize,
    last_rowid: i64,
}

impl ScriptedEngine {
    #[must_use]
    pub fn new(script: EngineScript) -> Self {
        Self {
            script,
            statements: HashMap::new(),
            last_error: "not an error".to_string(),
            changes: 0,
            last_rowid: 0,
        }
    }

    fn unknown(stmt: StmtHandle) -> EngineError {
        EngineError::new(codes::MISUSE, format!("unknown statement {stmt}"))
    }
}

impl Engine for ScriptedEngine {
    fn prepare(&mut self, sql: &str) -> EngineResult<Option<Prepared>> {
        let mut state = self.script.lock();
        if let Some(err) = state.prepare_failures.pop_front() {
            self.last_error.clone_from(&err.message);
            return Err(err);
        }

        let mut offset = 0;
        loop {
            let rest = &sql[offset..];
            let start = offset + sql_text::blank_prefix_len(rest);
            if start == sql.len() {
                return Ok(None);
            }
            let tail = start + sql_text::first_statement_len(&sql[start..]);
            let raw = &sql[start..tail];
            let text = raw.strip_suffix(';').unwrap_or(raw).trim();
            if text.is_empty() {
                offset = tail;
                continue;
            }

            let keyword = leading_keyword(text);
            if !KEYWORDS.contains(&keyword.as_str()) {
                let near: String = text.split_whitespace().next().unwrap_or(text).to_string();
                let err = EngineError::new(codes::ERROR, format!("near \"{near}\": syntax error"));
                self.last_error.clone_from(&err.message);
                return Err(err);
            }

            state.next_handle += 1;
            state.prepares += 1;
            let Some(raw_handle) = NonZeroUsize::new(state.next_handle) else {
                return Err(EngineError::new(codes::ERROR, "statement handles exhausted"));
            };
            let handle = StmtHandle::new(raw_handle);
            self.statements
                .insert(handle, FakeStatement::new(text.to_string(), &keyword));
            return Ok(Some(Prepared { handle, tail }));
        }
    }

    fn step(&mut self, stmt: StmtHandle) -> StepOutcome {
        let mut state = self.script.lock();
        let Some(fake) = self.statements.get_mut(&stmt) else {
            self.last_error = Self::unknown(stmt).message;
            return StepOutcome::Failed(codes::MISUSE);
        };

        let failure = if state.always_locked {
            Some((codes::BUSY, ResetOutcome::Locked(codes::BUSY)))
        } else {
            state.step_failures.pop_front()
        };
        if let Some((code, reset)) = failure {
            self.last_error = match code {
                codes::BUSY => "database is locked".to_string(),
                codes::SCHEMA => "database schema has changed".to_string(),
                _ => format!("scripted failure {code}"),
            };
            fake.failure = Some(reset);
            return StepOutcome::Failed(code);
        }

        if fake.done {
            return StepOutcome::Finished;
        }
        if fake.returns_row && !fake.row_emitted {
            fake.row_emitted = true;
            return StepOutcome::RowAvailable;
        }

        fake.done = true;
        match leading_keyword(&fake.sql).as_str() {
            "INSERT" | "REPLACE" => {
                self.last_rowid += 1;
                self.changes = 1;
            }
            "UPDATE" | "DELETE" => self.changes = 1,
            _ => {}
        }
        state.executed.push(fake.sql.clone());
        StepOutcome::Finished
    }

    fn reset(&mut self, stmt: StmtHandle) -> ResetOutcome {
        match self.statements.get_mut(&stmt) {
            Some(fake) => {
                fake.row_emitted = false;
                fake.done = false;
                fake.failure.take().unwrap_or(ResetOutcome::Ok)
            }
            None => ResetOutcome::Fatal {
                code: codes::MISUSE,
                message: Self::unknown(stmt).message,
            },
        }
    }

    fn finalize(&mut self, stmt: StmtHandle) -> EngineResult<()> {
        self.statements
            .remove(&stmt)
            .ok_or_else(|| Self::unknown(stmt))?;
        let mut state = self.script.lock();
        state.finalizes += 1;
        state.bound.remove(&stmt);
        Ok(())
    }

    fn bind(&mut self, stmt: StmtHandle, index: usize, value: &Value) -> EngineResult<()> {
        let fake = self
            .statements
            .get_mut(&stmt)
            .ok_or_else(|| Self::unknown(stmt))?;
        let slot = fake
            .bound
            .get_mut(index)
            .ok_or_else(|| EngineError::new(RANGE, "column index out of range"))?;
        *slot = Some(value.clone());

        let mut state = self.script.lock();
        state.binds += 1;
        state.bound.insert(stmt, fake.bound.clone());
        Ok(())
    }

    fn parameter_count(&self, stmt: StmtHandle) -> usize {
        self.statements.get(&stmt).map_or(0, |fake| fake.names.len())
    }

    fn parameter_name(&self, stmt: StmtHandle, index: usize) -> Option<String> {
        self.statements
            .get(&stmt)
            .and_then(|fake| fake.names.get(index).cloned().flatten())
    }

    fn last_error_text(&self) -> String {
        self.last_error.clone()
    }

    fn changes(&self) -> usize {
        self.changes
    }

    fn column_count(&self, stmt: StmtHandle) -> usize {
        self.statements
            .get(&stmt)
            .map_or(0, |fake| usize::from(fake.returns_row))
    }

    fn column_value(&self, stmt: StmtHandle, index: usize) -> Value {
        match self.statements.get(&stmt) {
            Some(fake) if index == 0 && fake.row_emitted && !fake.done => fake
                .bound
                .first()
                .cloned()
                .flatten()
                .unwrap_or(Value::Int(self.last_rowid)),
            _ => Value::Null,
        }
    }

    fn is_live(&self) -> bool {
        !self.script.lock().dead
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        self.script.lock().closes += 1;
        if self.statements.is_empty() {
            Ok(())
        } else {
            Err(EngineError::new(
                codes::BUSY,
                "unable to close due to unfinalized statements",
            ))
        }
    }
}

/// Opens [`ScriptedEngine`]s sharing one [`EngineScript`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedOpener {
    script: EngineScript,
}

impl ScriptedOpener {
    #[must_use]
    pub fn new(script: EngineScript) -> Self {
        Self { script }
    }

    #[must_use]
    pub fn script(&self) -> &EngineScript {
        &self.script
    }
}

impl EngineOpener for ScriptedOpener {
    fn open(&self, source: &str, _options: &OpenFlags) -> SqlExecResult<Box<dyn Engine>> {
        let mut state = self.script.lock();
        if state.fail_open {
            return Err(SqlExecError::ConnectionError(format!(
                "unable to open database file: {source}"
            )));
        }
        state.opens += 1;
        drop(state);
        Ok(Box::new(ScriptedEngine::new(self.script.clone())))
    }
}
