//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::command::Command;
pub use crate::config::{ConnectionOptions, ConnectionOptionsBuilder};
pub use crate::connection::Connection;
pub use crate::engine::{Engine, EngineOpener, OpenFlags};
pub use crate::error::{SqlExecError, SqlExecResult};
pub use crate::params::{Parameter, ParameterCollection};
pub use crate::statement::{Statement, StepResult};
pub use crate::types::Value;

#[cfg(feature = "sqlite")]
pub use crate::engine::sqlite::{SqliteEngine, SqliteOpener};
