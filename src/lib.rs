//! Statement execution and connection lifecycle for embedded SQL engines.
//!
//! A [`Command`] turns a block of SQL text into consecutive prepared statements, compiled
//! lazily and in order. Caller parameters are mapped onto statement slots by name or by
//! position. Stepping a statement transparently rides out a locked database (randomized
//! backoff until the command timeout) and schema changes (re-prepare and re-bind in
//! place). Physical connections can be reused through a keyed, versioned pool.
//!
//! ```rust,no_run
//! use sql_exec::prelude::*;
//!
//! # fn main() -> Result<(), SqlExecError> {
//! let options = ConnectionOptions::builder("app.db").pooling(true).build()?;
//! let connection = Connection::open(options)?;
//!
//! let mut create = connection.command("CREATE TABLE IF NOT EXISTS t (id INTEGER, name TEXT)");
//! create.execute_non_query()?;
//!
//! let mut insert = connection.command("INSERT INTO t VALUES (:id, :name)");
//! insert
//!     .parameters_mut()
//!     .add_named("id", Value::Int(1))
//!     .add_named("name", Value::Text("alice".into()));
//! assert_eq!(insert.execute_non_query()?, 1);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod executor;
pub mod params;
pub mod pool;
pub mod prelude;
pub mod sql_text;
pub mod statement;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use command::{Command, CommandId};
pub use config::{ConnectionOptions, ConnectionOptionsBuilder};
pub use connection::Connection;
pub use error::{SqlExecError, SqlExecResult};
pub use params::{Parameter, ParameterCollection};
pub use pool::{ConnectionPool, PooledResource, global_pool};
pub use statement::{ParameterSlot, Statement, StepResult};
pub use types::Value;
