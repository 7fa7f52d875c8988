//! Connections: one physical engine connection plus the commands created on it.

pub(crate) mod shared;

use std::fmt;
use std::time::Duration;

use crate::command::Command;
use crate::config::ConnectionOptions;
use crate::engine::{Engine, EngineOpener};
use crate::error::{SqlExecError, SqlExecResult};
use crate::pool::global_pool;
use shared::{Session, SharedSession, lock};

/// An open connection to one data source.
///
/// With pooling enabled the physical connection is taken from, and handed back to, the
/// process-wide pool. Closing (explicitly or on drop) finalizes every statement that live
/// commands still hold; those commands then fail with a connection error.
pub struct Connection {
    shared: SharedSession,
    options: ConnectionOptions,
    /// Pool entry version the engine was checked out under; `None` without pooling.
    pool_version: Option<u64>,
}

impl Connection {
    /// Open a SQLite connection.
    ///
    /// # Errors
    /// Returns [`SqlExecError::ConfigError`] for invalid options and
    /// [`SqlExecError::ConnectionError`] if the database cannot be opened.
    #[cfg(feature = "sqlite")]
    pub fn open(options: ConnectionOptions) -> SqlExecResult<Self> {
        Self::open_with(options, &crate::engine::sqlite::SqliteOpener)
    }

    /// Open a connection through `opener`, reusing an idle pooled engine when allowed.
    ///
    /// # Errors
    /// Returns [`SqlExecError::ConfigError`] for invalid options, or the opener's error.
    pub fn open_with(options: ConnectionOptions, opener: &dyn EngineOpener) -> SqlExecResult<Self> {
        options.validate()?;

        let (pooled, pool_version) = if options.pooling {
            let (engine, version) = global_pool().acquire(&options.data_source, options.max_pool_size);
            (engine, Some(version))
        } else {
            (None, None)
        };
        let reused = pooled.is_some();
        let engine = match pooled {
            Some(engine) => engine,
            None => opener.open(&options.data_source, &options.open_flags())?,
        };

        tracing::debug!(
            data_source = %options.data_source,
            pooling = options.pooling,
            reused,
            "connection opened"
        );
        Ok(Self {
            shared: Session::new(engine, options.default_timeout()),
            options,
            pool_version,
        })
    }

    /// Create a command over `text`. It inherits the connection's default timeout.
    pub fn command(&self, text: impl Into<String>) -> Command {
        Command::new(self.shared.clone(), text.into())
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        lock(&self.shared).is_open()
    }

    #[must_use]
    pub fn data_source(&self) -> &str {
        &self.options.data_source
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    #[must_use]
    pub fn pool_version(&self) -> Option<u64> {
        self.pool_version
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        lock(&self.shared).default_timeout
    }

    /// Change the timeout given to commands created from now on.
    pub fn set_default_timeout(&self, timeout: Duration) {
        lock(&self.shared).default_timeout = timeout;
    }

    /// Statements compiled on this connection and not yet finalized.
    #[must_use]
    pub fn open_statement_count(&self) -> usize {
        lock(&self.shared).registry.live_statements()
    }

    /// Commands created from this connection that have not been dropped yet.
    #[must_use]
    pub fn open_command_count(&self) -> usize {
        lock(&self.shared).registry.live_commands()
    }

    /// Finalize outstanding statements, then return the engine to the pool or close it.
    /// Closing an already closed connection does nothing.
    ///
    /// # Errors
    /// Returns [`SqlExecError::ConnectionError`] if an unpooled engine fails to close.
    pub fn close(&mut self) -> SqlExecResult<()> {
        let engine = {
            let mut session = lock(&self.shared);
            let Some(mut engine) = session.engine.take() else {
                return Ok(());
            };
            for handle in session.registry.drain_handles() {
                if let Err(err) = engine.finalize(handle) {
                    tracing::debug!(%handle, error = %err, "finalize on close failed");
                }
            }
            engine
        };

        tracing::debug!(data_source = %self.options.data_source, "connection closed");
        match self.pool_version {
            Some(version) => {
                global_pool().release(&self.options.data_source, engine, version);
                Ok(())
            }
            None => Engine::close(engine).map_err(|err| {
                SqlExecError::ConnectionError(format!(
                    "failed to close {}: {}",
                    self.options.data_source, err.message
                ))
            }),
        }
    }

    /// Close and discard the idle pooled connections for this data source.
    pub fn clear_pool(&self) {
        global_pool().clear(&self.options.data_source);
    }

    /// Close and discard every idle pooled connection of the process.
    pub fn clear_all_pools() {
        global_pool().clear_all();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "connection close on drop failed");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("data_source", &self.options.data_source)
            .field("pooling", &self.options.pooling)
            .field("pool_version", &self.pool_version)
            .field("open", &self.is_open())
            .finish()
    }
}
