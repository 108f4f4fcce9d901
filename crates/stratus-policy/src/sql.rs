//! SQL batch splitting and leading-verb classification.
//!
//! Statements pass through to the engines verbatim; classification only
//! decides who may run them. Comments are stripped before splitting, so a
//! commented batch always classifies the same as its uncommented form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a single SQL statement, inferred from its leading verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatementCategory {
    Select,
    Write,
    DdlSafe,
    DdlDestructive,
    DmlDestructive,
    DmlUnboundedUpdate,
    BlockedSystem,
    TransactionControl,
}

impl StatementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementCategory::Select => "select",
            StatementCategory::Write => "write",
            StatementCategory::DdlSafe => "ddl-safe",
            StatementCategory::DdlDestructive => "ddl-destructive",
            StatementCategory::DmlDestructive => "dml-destructive",
            StatementCategory::DmlUnboundedUpdate => "dml-unbounded-update",
            StatementCategory::BlockedSystem => "blocked-system",
            StatementCategory::TransactionControl => "transaction-control",
        }
    }

    /// Dangerous categories imply irreversible data change and require
    /// password re-authentication even for MASTER.
    pub fn is_dangerous(&self) -> bool {
        matches!(
            self,
            StatementCategory::DdlDestructive
                | StatementCategory::DmlDestructive
                | StatementCategory::DmlUnboundedUpdate
        )
    }
}

impl fmt::Display for StatementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Lex {
    Normal,
    LineComment,
    BlockComment,
    SingleQuote,
    DoubleQuote,
    Dollar,
}

/// Split a batch into individual statements.
///
/// Strips `--` line comments and `/* */` block comments, then splits on
/// top-level `;`, honouring single/double-quoted strings and dollar-quoted
/// bodies (`$tag$ ... $tag$`). Empty fragments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let mut out = Vec::new();
    let mut current = String::new();
    let mut state = Lex::Normal;
    let mut dollar_tag = String::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, n)| n);

        match state {
            Lex::Normal => match c {
                '-' if next == Some('-') => {
                    state = Lex::LineComment;
                    i += 2;
                    continue;
                }
                '/' if next == Some('*') => {
                    state = Lex::BlockComment;
                    i += 2;
                    continue;
                }
                '\'' => {
                    state = Lex::SingleQuote;
                    current.push(c);
                }
                '"' => {
                    state = Lex::DoubleQuote;
                    current.push(c);
                }
                '$' => {
                    if let Some(tag) = read_dollar_tag(&sql[pos..]) {
                        current.push_str(&tag);
                        // Tags are ASCII, so char count equals byte length.
                        i += tag.len();
                        state = Lex::Dollar;
                        dollar_tag = tag;
                        continue;
                    }
                    current.push(c);
                }
                ';' => {
                    push_fragment(&mut out, &mut current);
                }
                _ => current.push(c),
            },
            Lex::LineComment => {
                if c == '\n' {
                    // Keep the line break so adjacent tokens stay separated.
                    current.push('\n');
                    state = Lex::Normal;
                }
            }
            Lex::BlockComment => {
                if c == '*' && next == Some('/') {
                    current.push(' ');
                    state = Lex::Normal;
                    i += 2;
                    continue;
                }
            }
            Lex::SingleQuote => {
                current.push(c);
                if c == '\'' {
                    // '' is an escaped quote inside the literal.
                    if next == Some('\'') {
                        current.push('\'');
                        i += 2;
                        continue;
                    }
                    state = Lex::Normal;
                }
            }
            Lex::DoubleQuote => {
                current.push(c);
                if c == '"' {
                    state = Lex::Normal;
                }
            }
            Lex::Dollar => {
                if c == '$' && sql[pos..].starts_with(dollar_tag.as_str()) {
                    current.push_str(&dollar_tag);
                    i += dollar_tag.len();
                    state = Lex::Normal;
                    continue;
                }
                current.push(c);
            }
        }
        i += 1;
    }
    push_fragment(&mut out, &mut current);
    out
}

fn push_fragment(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Read a `$tag$` opener starting at the `$`; returns the full tag
/// including both dollars, or None if this `$` does not open a body.
fn read_dollar_tag(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    debug_assert_eq!(bytes[0], b'$');
    let mut end = 1;
    while end < bytes.len() {
        let c = bytes[end] as char;
        if c == '$' {
            return Some(s[..=end].to_string());
        }
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        end += 1;
    }
    None
}

/// Uppercase words of a statement at paren depth 0, outside string
/// literals. Enough context for leading-verb classification and top-level
/// `WHERE` detection.
fn top_level_words(stmt: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut depth: i32 = 0;
    let mut in_single = false;
    let mut in_double = false;

    for c in stmt.chars() {
        if in_single {
            if c == '\'' {
                in_single = false;
            }
            continue;
        }
        if in_double {
            if c == '"' {
                in_double = false;
            }
            continue;
        }
        match c {
            '\'' => in_single = true,
            '"' => in_double = true,
            '(' => {
                flush_word(&mut words, &mut word, depth);
                depth += 1;
            }
            ')' => {
                flush_word(&mut words, &mut word, depth);
                depth -= 1;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => word.push(c.to_ascii_uppercase()),
            _ => flush_word(&mut words, &mut word, depth),
        }
    }
    flush_word(&mut words, &mut word, depth);
    words
}

fn flush_word(words: &mut Vec<String>, word: &mut String, depth: i32) {
    if !word.is_empty() {
        if depth == 0 {
            words.push(std::mem::take(word));
        } else {
            word.clear();
        }
    }
}

/// Classify every statement of a batch. Comments never affect the result.
pub fn classify_sql(sql: &str) -> Vec<StatementCategory> {
    split_statements(sql)
        .iter()
        .map(|stmt| classify_statement(stmt))
        .collect()
}

fn classify_statement(stmt: &str) -> StatementCategory {
    let words = top_level_words(stmt);
    let first = words.first().map(String::as_str).unwrap_or("");

    match first {
        "SELECT" | "EXPLAIN" | "SHOW" => StatementCategory::Select,
        "WITH" => classify_cte(&words),
        "INSERT" => StatementCategory::Write,
        "UPDATE" => classify_update(&words),
        "DELETE" | "TRUNCATE" => StatementCategory::DmlDestructive,
        "DROP" => classify_drop(&words),
        "CREATE" => classify_create(&words),
        "ALTER" => classify_alter(&words),
        "GRANT" | "REVOKE" => StatementCategory::BlockedSystem,
        "BEGIN" | "START" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" => {
            StatementCategory::TransactionControl
        }
        // Unlisted verbs (VACUUM, ANALYZE, SET, ...) are treated as plain
        // writes: READER denied, no re-auth required.
        _ => StatementCategory::Write,
    }
}

/// A CTE classifies by the first top-level verb after the CTE list; the
/// bodies themselves sit inside parens and are invisible here.
fn classify_cte(words: &[String]) -> StatementCategory {
    for (idx, w) in words.iter().enumerate() {
        match w.as_str() {
            "SELECT" => return StatementCategory::Select,
            "INSERT" => return StatementCategory::Write,
            "DELETE" => return StatementCategory::DmlDestructive,
            "UPDATE" => return classify_update(&words[idx..]),
            _ => {}
        }
    }
    StatementCategory::Select
}

fn classify_update(words: &[String]) -> StatementCategory {
    if words.iter().any(|w| w == "WHERE") {
        StatementCategory::Write
    } else {
        StatementCategory::DmlUnboundedUpdate
    }
}

fn classify_drop(words: &[String]) -> StatementCategory {
    match words.get(1).map(String::as_str) {
        Some("DATABASE") | Some("SCHEMA") | Some("ROLE") | Some("USER") => {
            StatementCategory::BlockedSystem
        }
        _ => StatementCategory::DdlDestructive,
    }
}

fn classify_create(words: &[String]) -> StatementCategory {
    match words.get(1).map(String::as_str) {
        Some("DATABASE") | Some("SCHEMA") | Some("ROLE") | Some("USER") => {
            StatementCategory::BlockedSystem
        }
        _ => StatementCategory::DdlSafe,
    }
}

fn classify_alter(words: &[String]) -> StatementCategory {
    match words.get(1).map(String::as_str) {
        Some("ROLE") | Some("USER") => StatementCategory::BlockedSystem,
        Some("TABLE") => {
            // ALTER TABLE <name> ADD (COLUMN | CONSTRAINT | INDEX) is the
            // only additive form considered safe.
            let add_form = words
                .iter()
                .position(|w| w == "ADD")
                .and_then(|idx| words.get(idx + 1))
                .map(|w| matches!(w.as_str(), "COLUMN" | "CONSTRAINT" | "INDEX"))
                .unwrap_or(false);
            if add_form {
                StatementCategory::DdlSafe
            } else {
                StatementCategory::DdlDestructive
            }
        }
        _ => StatementCategory::DdlDestructive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StatementCategory::*;

    #[test]
    fn test_split_basic() {
        let stmts = split_statements("SELECT 1; SELECT 2;");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_split_keeps_semicolons_in_strings() {
        let stmts = split_statements("INSERT INTO t VALUES ('a;b'); SELECT 1");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("'a;b'"));
    }

    #[test]
    fn test_split_honours_dollar_quotes() {
        let sql = "CREATE FUNCTION f() RETURNS void AS $body$ BEGIN; END; $body$ LANGUAGE plpgsql; SELECT 1";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("$body$ BEGIN; END; $body$"));
    }

    #[test]
    fn test_split_strips_comments() {
        let sql = "-- leading comment\nSELECT 1; /* block; with semicolon */ SELECT 2";
        let stmts = split_statements(sql);
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_split_escaped_single_quote() {
        let stmts = split_statements("SELECT 'it''s; fine'; SELECT 2");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_comments_never_change_classification() {
        let plain = "DELETE FROM t WHERE id=1";
        let commented = "/* cleanup */ DELETE FROM t -- targeted\n WHERE id=1";
        assert_eq!(classify_sql(plain), classify_sql(commented));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let sql = "BEGIN; UPDATE t SET x=1 WHERE id=1; COMMIT;";
        assert_eq!(classify_sql(sql), classify_sql(sql));
    }

    #[test]
    fn test_select_family() {
        assert_eq!(classify_sql("SELECT * FROM t"), vec![Select]);
        assert_eq!(classify_sql("EXPLAIN SELECT 1"), vec![Select]);
        assert_eq!(classify_sql("SHOW search_path"), vec![Select]);
        assert_eq!(
            classify_sql("WITH c AS (SELECT 1) SELECT * FROM c"),
            vec![Select]
        );
    }

    #[test]
    fn test_cte_with_dml_tail() {
        assert_eq!(
            classify_sql("WITH gone AS (SELECT id FROM t WHERE old) DELETE FROM t"),
            vec![DmlDestructive]
        );
        assert_eq!(
            classify_sql("WITH src AS (SELECT 1 AS x) INSERT INTO t SELECT * FROM src"),
            vec![Write]
        );
    }

    #[test]
    fn test_update_where_is_write() {
        assert_eq!(classify_sql("UPDATE t SET x=1 WHERE id=1"), vec![Write]);
    }

    #[test]
    fn test_update_without_where_is_unbounded() {
        assert_eq!(classify_sql("UPDATE t SET x=1"), vec![DmlUnboundedUpdate]);
    }

    #[test]
    fn test_subquery_where_does_not_bound_update() {
        // The WHERE lives inside the subselect; the UPDATE itself is unbounded.
        assert_eq!(
            classify_sql("UPDATE t SET x=(SELECT max(v) FROM u WHERE u.id=1)"),
            vec![DmlUnboundedUpdate]
        );
    }

    #[test]
    fn test_delete_is_destructive_with_or_without_where() {
        assert_eq!(classify_sql("DELETE FROM t WHERE id=1"), vec![DmlDestructive]);
        assert_eq!(classify_sql("DELETE FROM t"), vec![DmlDestructive]);
        assert_eq!(classify_sql("TRUNCATE t"), vec![DmlDestructive]);
    }

    #[test]
    fn test_ddl() {
        assert_eq!(classify_sql("CREATE TABLE t (id int)"), vec![DdlSafe]);
        assert_eq!(classify_sql("CREATE INDEX idx ON t (id)"), vec![DdlSafe]);
        assert_eq!(classify_sql("DROP TABLE t"), vec![DdlDestructive]);
        assert_eq!(classify_sql("DROP VIEW v"), vec![DdlDestructive]);
        assert_eq!(
            classify_sql("ALTER TABLE t ADD COLUMN y int"),
            vec![DdlSafe]
        );
        assert_eq!(
            classify_sql("ALTER TABLE t ADD CONSTRAINT c UNIQUE (y)"),
            vec![DdlSafe]
        );
        assert_eq!(
            classify_sql("ALTER TABLE t DROP COLUMN y"),
            vec![DdlDestructive]
        );
        assert_eq!(
            classify_sql("ALTER TABLE t RENAME TO u"),
            vec![DdlDestructive]
        );
    }

    #[test]
    fn test_blocked_system() {
        for sql in [
            "DROP DATABASE prod",
            "DROP SCHEMA app",
            "CREATE DATABASE scratch",
            "CREATE SCHEMA scratch",
            "GRANT ALL ON t TO joe",
            "REVOKE ALL ON t FROM joe",
            "CREATE ROLE r",
            "ALTER ROLE r",
            "DROP ROLE r",
            "CREATE USER u",
            "ALTER USER u",
            "DROP USER u",
        ] {
            assert_eq!(classify_sql(sql), vec![BlockedSystem], "{}", sql);
        }
    }

    #[test]
    fn test_transaction_control() {
        for sql in ["BEGIN", "START TRANSACTION", "COMMIT", "ROLLBACK", "SAVEPOINT s1"] {
            assert_eq!(classify_sql(sql), vec![TransactionControl], "{}", sql);
        }
    }

    #[test]
    fn test_unknown_verb_is_write() {
        assert_eq!(classify_sql("VACUUM t"), vec![Write]);
        assert_eq!(classify_sql("ANALYZE t"), vec![Write]);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify_sql("delete from t where id=1"), vec![DmlDestructive]);
        assert_eq!(classify_sql("Select 1"), vec![Select]);
    }

    #[test]
    fn test_batch_order_preserved() {
        let cats = classify_sql("BEGIN; UPDATE t SET x=1 WHERE id=1; INSERT INTO t VALUES(2); COMMIT;");
        assert_eq!(cats, vec![TransactionControl, Write, Write, TransactionControl]);
    }

    #[test]
    fn test_category_wire_names() {
        assert_eq!(
            serde_json::to_value(DmlUnboundedUpdate).unwrap(),
            serde_json::json!("dml-unbounded-update")
        );
        assert_eq!(
            serde_json::to_value(TransactionControl).unwrap(),
            serde_json::json!("transaction-control")
        );
    }

    #[test]
    fn test_dangerous_flags() {
        assert!(DmlDestructive.is_dangerous());
        assert!(DdlDestructive.is_dangerous());
        assert!(DmlUnboundedUpdate.is_dangerous());
        assert!(!Write.is_dangerous());
        assert!(!BlockedSystem.is_dangerous());
    }
}
