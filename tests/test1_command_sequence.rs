use sql_exec::prelude::*;
use sql_exec::test_utils::{EngineScript, ScriptedOpener};

fn open(source: &str) -> Result<(Connection, EngineScript), SqlExecError> {
    let opener = ScriptedOpener::default();
    let script = opener.script().clone();
    let conn = Connection::open_with(ConnectionOptions::new(source), &opener)?;
    Ok((conn, script))
}

#[test]
fn statements_are_built_in_order_until_text_runs_out() -> Result<(), SqlExecError> {
    let (conn, script) = open("seq-order")?;
    let mut cmd =
        conn.command("CREATE TABLE t (a); INSERT INTO t VALUES (1);\n  -- trailing note\n");

    let first = cmd.get_statement(0)?.map(|s| (s.index(), s.handle()));
    let second = cmd.get_statement(1)?.map(|s| (s.index(), s.handle()));
    assert_eq!(first.map(|f| f.0), Some(0));
    assert_eq!(second.map(|s| s.0), Some(1));
    assert_ne!(first.map(|f| f.1), second.map(|s| s.1));

    assert!(cmd.get_statement(2)?.is_none());
    assert!(cmd.get_statement(2)?.is_none());
    assert_eq!(cmd.statement_count(), 2);
    assert_eq!(script.prepare_count(), 2);
    assert_eq!(cmd.statement(1).map(Statement::sql), Some("INSERT INTO t VALUES (1);"));
    Ok(())
}

#[test]
fn statements_are_compiled_lazily() -> Result<(), SqlExecError> {
    let (conn, script) = open("seq-lazy")?;
    let mut cmd = conn.command("INSERT INTO t VALUES (1); INSERT INTO t VALUES (2)");
    assert_eq!(script.prepare_count(), 0);

    cmd.get_statement(0)?;
    assert_eq!(script.prepare_count(), 1);
    assert_eq!(cmd.step(0)?, StepResult::Done);
    assert_eq!(script.executed(), vec!["INSERT INTO t VALUES (1)"]);
    Ok(())
}

#[test]
fn skipping_ahead_is_a_misuse() -> Result<(), SqlExecError> {
    let (conn, _script) = open("seq-skip")?;
    let mut cmd = conn.command("SELECT 1; SELECT 2");
    let err = cmd.get_statement(1).unwrap_err();
    assert!(err.is_misuse(), "{err}");
    assert_eq!(err.code(), sql_exec::error::MISUSE_CODE);

    let err = cmd.step(0).unwrap_err();
    assert!(err.is_misuse());
    Ok(())
}

#[test]
fn blank_text_yields_no_statement() -> Result<(), SqlExecError> {
    let (conn, script) = open("seq-blank")?;
    for text in ["", "   \n\t", "-- nothing\n/* at all */", " ; ;"] {
        let mut cmd = conn.command(text);
        assert!(cmd.get_statement(0)?.is_none(), "{text:?}");
    }
    assert_eq!(script.prepare_count(), 0);
    Ok(())
}

#[test]
fn failed_prepare_ends_the_sequence() -> Result<(), SqlExecError> {
    let (conn, script) = open("seq-syntax")?;
    let mut cmd = conn.command("SELECT 1; SELEC 2; SELECT 3");
    assert!(cmd.get_statement(0)?.is_some());

    let err = cmd.get_statement(1).unwrap_err();
    assert!(matches!(err, SqlExecError::Engine { code: 1, .. }), "{err}");
    assert!(err.to_string().contains("syntax error"));

    // nothing after the broken statement is ever reached
    assert!(cmd.get_statement(1)?.is_none());
    assert_eq!(cmd.statement_count(), 1);
    assert_eq!(script.open_statements(), 1);

    // earlier statements remain usable
    assert!(cmd.get_statement(0)?.is_some());
    assert_eq!(cmd.step(0)?, StepResult::Row);
    Ok(())
}

#[test]
fn clear_finalizes_and_starts_over() -> Result<(), SqlExecError> {
    let (conn, script) = open("seq-clear")?;
    let mut cmd = conn.command("SELECT 1; SELECT 2");
    cmd.get_statement(0)?;
    cmd.get_statement(1)?;
    assert_eq!(conn.open_statement_count(), 2);

    cmd.clear();
    assert_eq!(cmd.statement_count(), 0);
    assert_eq!(script.finalize_count(), 2);
    assert_eq!(conn.open_statement_count(), 0);

    assert!(cmd.get_statement(0)?.is_some());
    assert_eq!(script.prepare_count(), 3);

    cmd.set_text("UPDATE t SET a = 1");
    assert_eq!(script.finalize_count(), 3);
    assert_eq!(cmd.get_statement(0)?.map(Statement::sql), Some("UPDATE t SET a = 1"));
    Ok(())
}

#[test]
fn execute_non_query_counts_only_statements_without_columns() -> Result<(), SqlExecError> {
    let (conn, script) = open("seq-nonquery")?;
    let mut cmd = conn.command("INSERT INTO t VALUES (1); SELECT a FROM t; UPDATE t SET a = 2;");
    assert_eq!(cmd.execute_non_query()?, 2);
    assert_eq!(script.executed().len(), 3);

    // a second run re-executes every statement without recompiling
    assert_eq!(cmd.execute_non_query()?, 2);
    assert_eq!(script.prepare_count(), 3);
    assert_eq!(script.executed().len(), 6);
    Ok(())
}

#[test]
fn execute_scalar_returns_first_column_of_first_row() -> Result<(), SqlExecError> {
    let (conn, _script) = open("seq-scalar")?;
    let mut cmd = conn.command(
        "INSERT INTO t VALUES (1); INSERT INTO t VALUES (2); SELECT last_insert_rowid()",
    );
    assert_eq!(cmd.execute_scalar()?, Some(Value::Int(2)));

    let mut none = conn.command("DELETE FROM t");
    assert_eq!(none.execute_scalar()?, None);
    Ok(())
}

#[test]
fn dropping_a_command_finalizes_its_statements() -> Result<(), SqlExecError> {
    let (conn, script) = open("seq-drop")?;
    {
        let mut cmd = conn.command("SELECT 1; SELECT 2");
        let _idle = conn.command("SELECT 3");
        assert_eq!(conn.open_command_count(), 2);
        cmd.get_statement(0)?;
        cmd.get_statement(1)?;
    }
    assert_eq!(script.finalize_count(), 2);
    assert_eq!(conn.open_statement_count(), 0);
    assert_eq!(conn.open_command_count(), 0);
    Ok(())
}

#[test]
fn closing_the_connection_finalizes_live_commands() -> Result<(), SqlExecError> {
    let (mut conn, script) = open("seq-close")?;
    let mut cmd = conn.command("SELECT 1; SELECT 2");
    cmd.get_statement(0)?;

    conn.close()?;
    assert!(!conn.is_open());
    assert_eq!(script.finalize_count(), 1);
    assert_eq!(script.close_count(), 1);

    let err = cmd.step(0).unwrap_err();
    assert!(matches!(err, SqlExecError::ConnectionError(_)), "{err}");
    let err = cmd.get_statement(1).unwrap_err();
    assert!(matches!(err, SqlExecError::ConnectionError(_)), "{err}");

    // idempotent, and dropping the orphaned command touches nothing
    conn.close()?;
    drop(cmd);
    assert_eq!(script.finalize_count(), 1);
    assert_eq!(script.close_count(), 1);
    Ok(())
}

#[test]
fn command_timeout_defaults_to_connection_timeout() -> Result<(), SqlExecError> {
    let opener = ScriptedOpener::default();
    let options = ConnectionOptions::builder("seq-timeout")
        .default_timeout(std::time::Duration::from_millis(1500))
        .build()?;
    let conn = Connection::open_with(options, &opener)?;
    let mut cmd = conn.command("SELECT 1");
    assert_eq!(cmd.timeout(), std::time::Duration::from_millis(1500));

    cmd.set_timeout(std::time::Duration::from_millis(10));
    assert_eq!(cmd.timeout(), std::time::Duration::from_millis(10));

    conn.set_default_timeout(std::time::Duration::from_secs(5));
    assert_eq!(conn.command("SELECT 2").timeout(), std::time::Duration::from_secs(5));
    assert_eq!(cmd.timeout(), std::time::Duration::from_millis(10));
    Ok(())
}
