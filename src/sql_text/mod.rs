//! Lightweight, quote- and comment-aware scanning of SQL command text.
//!
//! This is not a parser: it only knows enough about string literals, quoted identifiers
//! and comments to find top-level statement boundaries and parameter placeholders.
//! Statement bodies containing nested semicolons (e.g. `CREATE TRIGGER ... BEGIN ...; END`)
//! are split at the first top-level `;` like any other text.

mod parsers;
mod scanner;

use parsers::{is_ident_char, is_ident_start, scan_while};
use scanner::Scanner;

/// A parameter placeholder found in SQL text, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// A bare `?`.
    Anonymous,
    /// `?NNN`, carrying `NNN`.
    Numbered(usize),
    /// `:name`, `@name` or `$name`, including the sigil.
    Named(String),
}

/// Length in bytes of the leading whitespace and comments of `sql`.
#[must_use]
pub fn blank_prefix_len(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    Scanner::new(sql)
        .find(|s| s.quoted || !bytes[s.idx].is_ascii_whitespace())
        .map_or(sql.len(), |s| s.idx)
}

/// `true` when `sql` holds nothing but whitespace and comments.
#[must_use]
pub fn is_blank(sql: &str) -> bool {
    blank_prefix_len(sql) == sql.len()
}

/// Length in bytes of the first top-level statement of `sql`, including its terminating
/// `;` when there is one. Returns `sql.len()` for unterminated text.
#[must_use]
pub fn first_statement_len(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    Scanner::new(sql)
        .find(|s| !s.quoted && bytes[s.idx] == b';')
        .map_or(sql.len(), |s| s.idx + 1)
}

/// Split `sql` into its non-blank top-level statements, each trimmed of leading blanks and
/// keeping its terminating `;`.
#[cfg(test)]
pub(crate) fn split_statements(sql: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = sql;
    while !rest.is_empty() {
        let len = first_statement_len(rest);
        let stmt = &rest[..len];
        let body = &stmt[blank_prefix_len(stmt)..];
        if !body.is_empty() && body != ";" {
            out.push(body);
        }
        rest = &rest[len..];
    }
    out
}

/// Parameter placeholders appearing in `sql` outside literals and comments.
#[must_use]
pub fn placeholders(sql: &str) -> Vec<Placeholder> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut scanner = Scanner::new(sql);
    while let Some(s) = scanner.next() {
        if s.quoted {
            continue;
        }
        let idx = s.idx;
        match bytes[idx] {
            b'?' => {
                let end = scan_while(bytes, idx + 1, |b| b.is_ascii_digit());
                match sql[idx + 1..end].parse::<usize>() {
                    Ok(n) => out.push(Placeholder::Numbered(n)),
                    Err(_) => out.push(Placeholder::Anonymous),
                }
                scanner.jump_to(end);
            }
            b':' | b'@' | b'$' if bytes.get(idx + 1).is_some_and(|b| is_ident_start(*b)) => {
                let end = scan_while(bytes, idx + 1, is_ident_char);
                out.push(Placeholder::Named(sql[idx..end].to_string()));
                scanner.jump_to(end);
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_semicolons_only() {
        let sql = "INSERT INTO t VALUES('a;b'); -- c;d\nSELECT \"x;y\" FROM [t;1]; /* ; */ ";
        let parts = split_statements(sql);
        assert_eq!(
            parts,
            vec![
                "INSERT INTO t VALUES('a;b');",
                "SELECT \"x;y\" FROM [t;1];"
            ]
        );
    }

    #[test]
    fn first_statement_includes_terminator() {
        let sql = "SELECT 1; SELECT 2";
        assert_eq!(first_statement_len(sql), 9);
        assert_eq!(first_statement_len("SELECT 2"), 8);
    }

    #[test]
    fn blank_detection_ignores_comments() {
        assert!(is_blank(""));
        assert!(is_blank("  \n\t"));
        assert!(is_blank(" -- trailing comment"));
        assert!(is_blank("/* a */ /* b */\n"));
        assert!(!is_blank(" ''"));
        assert!(!is_blank("/* a */ SELECT 1"));
        assert_eq!(blank_prefix_len("/* a */ SELECT 1"), 8);
    }

    #[test]
    fn escaped_quotes_stay_inside_literals() {
        let sql = "SELECT 'it''s; fine' ; SELECT 2";
        assert_eq!(split_statements(sql).len(), 2);
    }

    #[test]
    fn finds_placeholders_outside_literals() {
        let sql = "SELECT ?, ?2, :name, @Other, $v_1, '?3', \":x\" -- ?4\n FROM t WHERE a = ?";
        assert_eq!(
            placeholders(sql),
            vec![
                Placeholder::Anonymous,
                Placeholder::Numbered(2),
                Placeholder::Named(":name".into()),
                Placeholder::Named("@Other".into()),
                Placeholder::Named("$v_1".into()),
                Placeholder::Anonymous,
            ]
        );
    }
}
