//! One compiled SQL statement and its parameter slots.

use crate::command::CommandId;
use crate::engine::{Engine, StmtHandle};
use crate::error::{SqlExecError, SqlExecResult};
use crate::params::ParameterCollection;
use crate::params::binder::{names_match, positional_alias};

/// Result of a single step through a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available.
    Row,
    /// The statement has finished executing.
    Done,
}

/// A parameter placeholder of a statement and the caller parameter mapped to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlot {
    name: String,
    source: Option<usize>,
}

impl ParameterSlot {
    /// Placeholder name as reported by the engine, or its positional alias (`;N`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the caller parameter currently mapped to this slot.
    #[must_use]
    pub fn source(&self) -> Option<usize> {
        self.source
    }
}

/// Slot name for an engine-reported parameter name. `?NNN` placeholders are positional and
/// map to alias `;NNN-1`; anonymous ones take the next running alias.
fn slot_name(reported: Option<String>, next_unnamed: &mut usize) -> String {
    match reported {
        Some(name) => match name.strip_prefix('?').map(str::parse::<usize>) {
            Some(Ok(n)) => positional_alias(n.saturating_sub(1)),
            _ => name,
        },
        None => {
            *next_unnamed += 1;
            positional_alias(*next_unnamed - 1)
        }
    }
}

/// A compiled statement owned by a [`Command`](crate::command::Command).
///
/// The engine handle is released exactly once, by [`Statement::finalize`] (called by the
/// command on clear/drop, or by the connection on close). A schema-change reflow swaps a
/// new handle in place, so the statement keeps its identity and index.
#[derive(Debug)]
pub struct Statement {
    handle: Option<StmtHandle>,
    sql: String,
    slots: Vec<ParameterSlot>,
    unnamed: usize,
    owner: CommandId,
    index: usize,
    reflows: u32,
}

impl Statement {
    /// Wrap a freshly prepared handle. `unnamed_start` is the number of anonymous slots the
    /// command's earlier statements already used.
    pub(crate) fn new(
        engine: &dyn Engine,
        handle: StmtHandle,
        sql: String,
        owner: CommandId,
        index: usize,
        unnamed_start: usize,
    ) -> Self {
        let mut next_unnamed = unnamed_start;
        let slots = (0..engine.parameter_count(handle))
            .map(|i| ParameterSlot {
                name: slot_name(engine.parameter_name(handle, i), &mut next_unnamed),
                source: None,
            })
            .collect();
        Self {
            handle: Some(handle),
            sql,
            slots,
            unnamed: next_unnamed - unnamed_start,
            owner,
            index,
            reflows: 0,
        }
    }

    /// Source text this statement was compiled from.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Position of this statement within its command.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn slots(&self) -> &[ParameterSlot] {
        &self.slots
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(ParameterSlot::name)
    }

    /// Number of anonymous placeholders that received a running alias.
    #[must_use]
    pub fn unnamed_count(&self) -> usize {
        self.unnamed
    }

    /// Current engine handle, `None` once finalized.
    #[must_use]
    pub fn handle(&self) -> Option<StmtHandle> {
        self.handle
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.handle.is_none()
    }

    /// How many times the statement was transparently re-prepared after a schema change.
    #[must_use]
    pub fn reflow_count(&self) -> u32 {
        self.reflows
    }

    pub(crate) fn owner(&self) -> CommandId {
        self.owner
    }

    pub(crate) fn live_handle(&self) -> SqlExecResult<StmtHandle> {
        self.handle.ok_or_else(|| {
            SqlExecError::misuse(format!("statement {} has been finalized", self.index))
        })
    }

    pub(crate) fn clear_mapping(&mut self) {
        for slot in &mut self.slots {
            slot.source = None;
        }
    }

    /// Point the first slot matching `key` at caller parameter `source`.
    pub(crate) fn map_slot(&mut self, key: &str, source: usize) -> bool {
        match self.slots.iter_mut().find(|slot| names_match(&slot.name, key)) {
            Some(slot) => {
                slot.source = Some(source);
                true
            }
            None => false,
        }
    }

    /// Bind every slot's mapped value. A slot without a value is a caller error.
    pub(crate) fn bind_parameters(
        &self,
        engine: &mut dyn Engine,
        params: &ParameterCollection,
    ) -> SqlExecResult<()> {
        let handle = self.live_handle()?;
        for (i, slot) in self.slots.iter().enumerate() {
            let param = slot.source.and_then(|src| params.get(src)).ok_or_else(|| {
                SqlExecError::misuse(format!(
                    "insufficient parameters supplied to the command: no value for {}",
                    slot.name
                ))
            })?;
            engine.bind(handle, i, param.value())?;
        }
        Ok(())
    }

    /// Install a re-prepared handle, returning the stale one for finalization.
    pub(crate) fn swap_handle(&mut self, handle: StmtHandle) -> Option<StmtHandle> {
        self.reflows += 1;
        self.handle.replace(handle)
    }

    /// Release the engine handle. Finalizing twice is a no-op.
    pub(crate) fn finalize(&mut self, engine: &mut dyn Engine) -> SqlExecResult<()> {
        match self.handle.take() {
            Some(handle) => Ok(engine.finalize(handle)?),
            None => Ok(()),
        }
    }

    /// Drop the handle without touching the engine, for handles the connection already
    /// finalized when it closed.
    pub(crate) fn forget(&mut self) {
        self.handle = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names_alias_positional_placeholders() {
        let mut next = 3;
        assert_eq!(slot_name(None, &mut next), ";3");
        assert_eq!(next, 4);
        assert_eq!(slot_name(Some("?1".into()), &mut next), ";0");
        assert_eq!(slot_name(Some("?12".into()), &mut next), ";11");
        assert_eq!(slot_name(Some(":id".into()), &mut next), ":id");
        assert_eq!(slot_name(Some("?x".into()), &mut next), "?x");
        assert_eq!(next, 4);
    }
}
