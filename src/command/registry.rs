use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use crate::engine::StmtHandle;

/// Identity of a command within its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// Per-connection bookkeeping of live commands.
///
/// Statements reach their command's timeout through its [`CommandId`]; the set of live
/// statement handles lets the connection finalize them at close.
#[derive(Debug, Default)]
pub(crate) struct CommandRegistry {
    next_id: u64,
    timeouts: HashMap<CommandId, Duration>,
    handles: HashSet<StmtHandle>,
}

impl CommandRegistry {
    pub(crate) fn register(&mut self, timeout: Duration) -> CommandId {
        self.next_id += 1;
        let id = CommandId(self.next_id);
        self.timeouts.insert(id, timeout);
        id
    }

    pub(crate) fn unregister(&mut self, id: CommandId) {
        self.timeouts.remove(&id);
    }

    pub(crate) fn timeout(&self, id: CommandId) -> Option<Duration> {
        self.timeouts.get(&id).copied()
    }

    pub(crate) fn set_timeout(&mut self, id: CommandId, timeout: Duration) {
        if let Some(slot) = self.timeouts.get_mut(&id) {
            *slot = timeout;
        }
    }

    pub(crate) fn track(&mut self, handle: StmtHandle) {
        self.handles.insert(handle);
    }

    pub(crate) fn untrack(&mut self, handle: StmtHandle) {
        self.handles.remove(&handle);
    }

    pub(crate) fn drain_handles(&mut self) -> Vec<StmtHandle> {
        self.handles.drain().collect()
    }

    pub(crate) fn live_commands(&self) -> usize {
        self.timeouts.len()
    }

    pub(crate) fn live_statements(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    fn handle(raw: usize) -> StmtHandle {
        StmtHandle::new(NonZeroUsize::new(raw).unwrap())
    }

    #[test]
    fn ids_are_unique_and_timeouts_follow_them() {
        let mut registry = CommandRegistry::default();
        let a = registry.register(Duration::from_secs(30));
        let b = registry.register(Duration::from_secs(1));
        assert_ne!(a, b);

        registry.set_timeout(b, Duration::from_millis(5));
        assert_eq!(registry.timeout(a), Some(Duration::from_secs(30)));
        assert_eq!(registry.timeout(b), Some(Duration::from_millis(5)));

        registry.unregister(a);
        assert_eq!(registry.timeout(a), None);
        registry.set_timeout(a, Duration::ZERO);
        assert_eq!(registry.timeout(a), None);
        assert_eq!(registry.live_commands(), 1);
    }

    #[test]
    fn drained_handles_are_forgotten() {
        let mut registry = CommandRegistry::default();
        registry.track(handle(1));
        registry.track(handle(2));
        registry.untrack(handle(1));
        assert_eq!(registry.drain_handles(), vec![handle(2)]);
        assert_eq!(registry.live_statements(), 0);
    }
}
