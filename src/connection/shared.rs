use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::command::CommandId;
use crate::command::registry::CommandRegistry;
use crate::engine::Engine;
use crate::error::{SqlExecError, SqlExecResult};

/// State shared between a connection and the commands it created.
pub(crate) struct Session {
    /// `None` once the connection has been closed.
    pub(crate) engine: Option<Box<dyn Engine>>,
    pub(crate) registry: CommandRegistry,
    pub(crate) default_timeout: Duration,
}

pub(crate) type SharedSession = Arc<Mutex<Session>>;

impl Session {
    pub(crate) fn new(engine: Box<dyn Engine>, default_timeout: Duration) -> SharedSession {
        Arc::new(Mutex::new(Self {
            engine: Some(engine),
            registry: CommandRegistry::default(),
            default_timeout,
        }))
    }

    /// The engine together with the registry, or a connection error once closed.
    pub(crate) fn parts(&mut self) -> SqlExecResult<(&mut dyn Engine, &mut CommandRegistry)> {
        match self.engine.as_mut() {
            Some(engine) => {
                let engine: &mut dyn Engine = engine.as_mut();
                Ok((engine, &mut self.registry))
            }
            None => Err(closed()),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    /// Timeout of command `id`, falling back to the connection default.
    pub(crate) fn timeout_for(&self, id: CommandId) -> Duration {
        self.registry.timeout(id).unwrap_or(self.default_timeout)
    }
}

pub(crate) fn closed() -> SqlExecError {
    SqlExecError::ConnectionError("connection is closed".to_string())
}

/// Lock the session; a panic on another thread does not make the engine unusable.
pub(crate) fn lock(shared: &SharedSession) -> MutexGuard<'_, Session> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
