use std::collections::VecDeque;

use crate::engine::Engine;

/// A resource the pool can keep idle between uses.
pub trait PooledResource: Send {
    /// Whether the resource can still be handed out. Checked when it is dequeued.
    fn is_live(&self) -> bool;

    /// Release the resource for good.
    fn close(self);
}

impl PooledResource for Box<dyn Engine> {
    fn is_live(&self) -> bool {
        self.as_ref().is_live()
    }

    fn close(self) {
        if let Err(err) = Engine::close(self) {
            tracing::debug!(code = err.code, error = %err.message, "pooled engine failed to close");
        }
    }
}

/// Idle resources for one key, oldest first.
#[derive(Debug)]
pub(crate) struct PoolEntry<H> {
    pub(crate) idle: VecDeque<H>,
    pub(crate) version: u64,
    pub(crate) max_size: usize,
}

impl<H> PoolEntry<H> {
    pub(crate) fn new(version: u64) -> Self {
        Self {
            idle: VecDeque::new(),
            version,
            max_size: 0,
        }
    }

    /// Remove the oldest idle resources until at most `limit` remain.
    pub(crate) fn trim_to(&mut self, limit: usize) -> Vec<H> {
        let excess = self.idle.len().saturating_sub(limit);
        self.idle.drain(..excess).collect()
    }
}
