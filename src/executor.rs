//! Step/Reset retry loop.
//!
//! Two engine conditions are recovered here and never reach the caller as errors:
//! a locked database (randomized backoff until the command timeout elapses) and a schema
//! change (the statement is re-prepared from its source text and re-bound in place).
//! The session lock is never held while sleeping.

use std::ops::RangeInclusive;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::command::registry::CommandRegistry;
use crate::connection::shared::{SharedSession, lock};
use crate::engine::{Engine, Prepared, ResetOutcome, StepOutcome, codes};
use crate::error::{SqlExecError, SqlExecResult};
use crate::params::ParameterCollection;
use crate::statement::{StepResult, Statement};

/// Bounds of one randomized lock backoff, in milliseconds.
pub const BACKOFF_MS: RangeInclusive<u64> = 1..=150;

/// How often a prepare that keeps reporting a schema change is retried.
pub const MAX_PREPARE_SCHEMA_RETRIES: u32 = 3;

/// Lock retry budget of one operation; the clock starts at the first lock.
struct LockWait {
    timeout: Duration,
    first_lock: Option<Instant>,
}

impl LockWait {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            first_lock: None,
        }
    }

    /// Sleep one backoff interval, then fail if the budget has run out.
    fn back_off(&mut self, code: i32, message: String) -> SqlExecResult<()> {
        let first_lock = *self.first_lock.get_or_insert_with(Instant::now);
        let pause_ms = rand::rng().random_range(BACKOFF_MS);
        tracing::debug!(code, pause_ms, "database locked, backing off");
        thread::sleep(Duration::from_millis(pause_ms));

        if first_lock.elapsed() > self.timeout {
            tracing::warn!(
                code,
                timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                "lock retry budget exhausted"
            );
            return Err(SqlExecError::LockTimeout { code, message });
        }
        Ok(())
    }
}

/// Advance `stmt` by one row.
///
/// # Errors
/// Returns [`SqlExecError::LockTimeout`] when the database stays locked past the command
/// timeout, [`SqlExecError::Engine`] for unrecoverable engine failures and
/// [`SqlExecError::Misuse`] when the statement was already finalized.
pub(crate) fn step(
    shared: &SharedSession,
    stmt: &mut Statement,
    params: &ParameterCollection,
) -> SqlExecResult<StepResult> {
    let mut wait: Option<LockWait> = None;
    loop {
        let mut session = lock(shared);
        let timeout = session.timeout_for(stmt.owner());
        let (engine, registry) = session.parts()?;
        let handle = stmt.live_handle()?;

        let step_code = match engine.step(handle) {
            StepOutcome::RowAvailable => return Ok(StepResult::Row),
            StepOutcome::Finished => return Ok(StepResult::Done),
            StepOutcome::Failed(code) => code,
        };
        let step_message = engine.last_error_text();

        match engine.reset(handle) {
            ResetOutcome::Ok => return Err(SqlExecError::engine(step_code, step_message)),
            ResetOutcome::SchemaChanged => reflow(engine, registry, stmt, params)?,
            ResetOutcome::Locked(code) => {
                let message = engine.last_error_text();
                drop(session);
                wait.get_or_insert_with(|| LockWait::new(timeout))
                    .back_off(code, message)?;
            }
            ResetOutcome::Fatal { code, message } => {
                return Err(SqlExecError::engine(code, message));
            }
        }
    }
}

/// Reset `stmt` so it can run again. A schema change reported by the reset re-prepares it.
///
/// # Errors
/// Returns an error if the statement is finalized or a required reflow fails.
pub(crate) fn reset(
    shared: &SharedSession,
    stmt: &mut Statement,
    params: &ParameterCollection,
) -> SqlExecResult<()> {
    let mut session = lock(shared);
    let (engine, registry) = session.parts()?;
    let handle = stmt.live_handle()?;
    match engine.reset(handle) {
        ResetOutcome::SchemaChanged => reflow(engine, registry, stmt, params),
        // the outcome of the previous run was already reported by step
        _ => Ok(()),
    }
}

/// Reset `stmt` and bind the current parameter values to every slot.
///
/// # Errors
/// Returns [`SqlExecError::Misuse`] for an unresolved slot, or an engine error from binding.
pub(crate) fn rebind(
    shared: &SharedSession,
    stmt: &mut Statement,
    params: &ParameterCollection,
) -> SqlExecResult<()> {
    reset(shared, stmt, params)?;
    let mut session = lock(shared);
    let (engine, _) = session.parts()?;
    stmt.bind_parameters(engine, params)
}

/// Compile the first statement of `sql`, retrying lock contention until `timeout` and
/// schema changes a bounded number of times. The new handle is tracked by the registry.
///
/// # Errors
/// Returns the engine error when the text does not compile, or
/// [`SqlExecError::LockTimeout`] when the database stays locked.
pub(crate) fn prepare(
    shared: &SharedSession,
    sql: &str,
    timeout: Duration,
) -> SqlExecResult<Option<Prepared>> {
    let mut wait = LockWait::new(timeout);
    let mut schema_retries = 0;
    loop {
        let mut session = lock(shared);
        let (engine, registry) = session.parts()?;
        match engine.prepare(sql) {
            Ok(prepared) => {
                if let Some(prepared) = &prepared {
                    registry.track(prepared.handle);
                }
                return Ok(prepared);
            }
            Err(err) if err.is_locked() => {
                drop(session);
                wait.back_off(err.code, err.message)?;
            }
            Err(err) if err.is_schema_changed() && schema_retries < MAX_PREPARE_SCHEMA_RETRIES => {
                schema_retries += 1;
                tracing::debug!(attempt = schema_retries, "schema changed during prepare, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Replace the handle of `stmt` with a fresh compilation of its source text and re-apply
/// the bound values.
fn reflow(
    engine: &mut dyn Engine,
    registry: &mut CommandRegistry,
    stmt: &mut Statement,
    params: &ParameterCollection,
) -> SqlExecResult<()> {
    let prepared = engine.prepare(stmt.sql())?.ok_or_else(|| {
        SqlExecError::engine(codes::SCHEMA, "statement text no longer compiles after schema change")
    })?;
    registry.track(prepared.handle);
    if let Some(stale) = stmt.swap_handle(prepared.handle) {
        registry.untrack(stale);
        engine.finalize(stale)?;
    }
    stmt.bind_parameters(engine, params)?;
    tracing::debug!(
        statement = stmt.index(),
        reflows = stmt.reflow_count(),
        "statement re-prepared after schema change"
    );
    Ok(())
}
