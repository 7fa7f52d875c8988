//! Pool behaviour through `Connection`. Every test uses its own data source so the
//! process-wide pool entries never collide.

use sql_exec::pool::INITIAL_VERSION;
use sql_exec::prelude::*;
use sql_exec::test_utils::{EngineScript, ScriptedOpener};
use sql_exec::{ConnectionPool, PooledResource, global_pool};

fn pooled(source: &str, max_pool_size: usize) -> Result<ConnectionOptions, SqlExecError> {
    ConnectionOptions::builder(source)
        .pooling(true)
        .max_pool_size(max_pool_size)
        .build()
}

#[test]
fn closed_connection_is_reused() -> Result<(), SqlExecError> {
    let opener = ScriptedOpener::default();
    let script = opener.script().clone();

    let mut first = Connection::open_with(pooled("pool-reuse.db", 4)?, &opener)?;
    first.command("INSERT INTO t VALUES (1)").execute_non_query()?;
    first.close()?;
    assert_eq!(global_pool().idle_count("POOL-REUSE.db"), 1);

    let second = Connection::open_with(pooled("Pool-Reuse.DB", 4)?, &opener)?;
    assert_eq!(script.open_count(), 1);
    assert_eq!(script.close_count(), 0);
    assert_eq!(second.pool_version(), first.pool_version());
    assert_eq!(global_pool().idle_count("pool-reuse.db"), 0);
    Ok(())
}

#[test]
fn unpooled_connections_are_closed() -> Result<(), SqlExecError> {
    let opener = ScriptedOpener::default();
    let script = opener.script().clone();

    let mut conn = Connection::open_with(ConnectionOptions::new("pool-off.db"), &opener)?;
    assert_eq!(conn.pool_version(), None);
    conn.close()?;
    assert_eq!(script.close_count(), 1);
    assert_eq!(global_pool().idle_count("pool-off.db"), 0);
    Ok(())
}

#[test]
fn zero_max_size_never_pools() -> Result<(), SqlExecError> {
    let opener = ScriptedOpener::default();
    let script = opener.script().clone();

    for _ in 0..3 {
        let conn = Connection::open_with(pooled("pool-zero.db", 0)?, &opener)?;
        drop(conn);
    }
    assert_eq!(script.open_count(), 3);
    assert_eq!(script.close_count(), 3);
    Ok(())
}

#[test]
fn clear_pool_invalidates_checked_out_connections() -> Result<(), SqlExecError> {
    let opener = ScriptedOpener::default();
    let script = opener.script().clone();

    let idle = Connection::open_with(pooled("pool-clear.db", 4)?, &opener)?;
    let mut busy = Connection::open_with(pooled("pool-clear.db", 4)?, &opener)?;
    drop(idle);
    assert_eq!(global_pool().idle_count("pool-clear.db"), 1);

    busy.clear_pool();
    assert_eq!(script.close_count(), 1);
    assert_eq!(global_pool().idle_count("pool-clear.db"), 0);

    // returned under the old version: closed, not queued
    busy.close()?;
    assert_eq!(script.close_count(), 2);
    assert_eq!(global_pool().idle_count("pool-clear.db"), 0);

    let fresh = Connection::open_with(pooled("pool-clear.db", 4)?, &opener)?;
    assert_eq!(script.open_count(), 3);
    assert!(fresh.pool_version() > busy.pool_version());
    Ok(())
}

#[test]
fn dead_engines_are_not_handed_out() -> Result<(), SqlExecError> {
    let opener = ScriptedOpener::default();
    let script = opener.script().clone();

    drop(Connection::open_with(pooled("pool-dead.db", 4)?, &opener)?);
    script.kill();

    let conn = Connection::open_with(pooled("pool-dead.db", 4)?, &opener)?;
    assert!(conn.is_open());
    assert_eq!(script.open_count(), 2);
    assert_eq!(script.close_count(), 1);
    Ok(())
}

#[test]
fn pool_returns_handles_with_their_versions() {
    #[derive(Debug, PartialEq)]
    struct Handle(u32);

    impl PooledResource for Handle {
        fn is_live(&self) -> bool {
            true
        }

        fn close(self) {}
    }

    let pool = ConnectionPool::new();
    assert_eq!(pool.acquire("db1", 3), (None, INITIAL_VERSION));
    pool.release("db1", Handle(9), INITIAL_VERSION);
    assert_eq!(pool.acquire("db1", 3), (Some(Handle(9)), INITIAL_VERSION));
}

#[test]
fn failed_open_is_reported() {
    let opener = ScriptedOpener::new(EngineScript::new());
    opener.script().set_fail_open(true);
    let err = Connection::open_with(pooled("pool-fail.db", 4).unwrap(), &opener).unwrap_err();
    assert!(matches!(err, SqlExecError::ConnectionError(_)), "{err}");

    let err = Connection::open_with(ConnectionOptions::default(), &opener).unwrap_err();
    assert!(matches!(err, SqlExecError::ConfigError(_)), "{err}");
}
