use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::OpenFlags;
use crate::error::{SqlExecError, SqlExecResult};

pub const DEFAULT_MAX_POOL_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Options for opening a [`Connection`](crate::connection::Connection).
///
/// Deserializable, so they can live in an application's own config file; every field but
/// `data_source` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Path or URI of the database; also the pool key.
    pub data_source: String,
    pub pooling: bool,
    pub max_pool_size: usize,
    /// Budget for lock retries, inherited by every command of the connection.
    pub default_timeout_ms: u64,
    /// Time the engine itself waits on a busy database before reporting it locked.
    pub busy_timeout_ms: u32,
    pub read_only: bool,
    pub fail_if_missing: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            data_source: String::new(),
            pooling: false,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            busy_timeout_ms: 0,
            read_only: false,
            fail_if_missing: false,
        }
    }
}

impl ConnectionOptions {
    #[must_use]
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn builder(data_source: impl Into<String>) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new(data_source)
    }

    /// # Errors
    /// Returns [`SqlExecError::ConfigError`] when no data source is set.
    pub fn validate(&self) -> SqlExecResult<()> {
        if self.data_source.trim().is_empty() {
            return Err(SqlExecError::ConfigError(
                "data_source must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    #[must_use]
    pub fn open_flags(&self) -> OpenFlags {
        OpenFlags {
            read_only: self.read_only,
            fail_if_missing: self.fail_if_missing,
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

/// Fluent builder for [`ConnectionOptions`].
#[derive(Debug, Clone)]
pub struct ConnectionOptionsBuilder {
    opts: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    #[must_use]
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            opts: ConnectionOptions::new(data_source),
        }
    }

    #[must_use]
    pub fn pooling(mut self, pooling: bool) -> Self {
        self.opts.pooling = pooling;
        self
    }

    #[must_use]
    pub fn max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.opts.max_pool_size = max_pool_size;
        self
    }

    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.opts.default_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn busy_timeout_ms(mut self, busy_timeout_ms: u32) -> Self {
        self.opts.busy_timeout_ms = busy_timeout_ms;
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.opts.read_only = read_only;
        self
    }

    #[must_use]
    pub fn fail_if_missing(mut self, fail_if_missing: bool) -> Self {
        self.opts.fail_if_missing = fail_if_missing;
        self
    }

    /// The options as configured, without validation.
    #[must_use]
    pub fn finish(self) -> ConnectionOptions {
        self.opts
    }

    /// # Errors
    /// Returns [`SqlExecError::ConfigError`] if the options fail validation.
    pub fn build(self) -> SqlExecResult<ConnectionOptions> {
        self.opts.validate()?;
        Ok(self.opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let opts: ConnectionOptions =
            serde_json::from_str(r#"{"data_source": "app.db", "pooling": true}"#).unwrap();
        assert_eq!(opts.data_source, "app.db");
        assert!(opts.pooling);
        assert_eq!(opts.max_pool_size, DEFAULT_MAX_POOL_SIZE);
        assert_eq!(opts.default_timeout(), Duration::from_secs(30));
        assert!(!opts.read_only);
    }

    #[test]
    fn builder_sets_fields_and_validates() {
        let opts = ConnectionOptions::builder("x.db")
            .pooling(true)
            .max_pool_size(4)
            .default_timeout(Duration::from_millis(250))
            .read_only(true)
            .build()
            .unwrap();
        assert_eq!(opts.max_pool_size, 4);
        assert_eq!(opts.default_timeout_ms, 250);
        assert!(opts.open_flags().read_only);

        let err = ConnectionOptions::builder("  ").build().unwrap_err();
        assert!(matches!(err, SqlExecError::ConfigError(_)));
    }
}
