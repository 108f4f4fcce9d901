//! Log hygiene for operator-supplied SQL.
//!
//! Statements pass through verbatim to the engines, but anything that
//! reaches a log line goes through here first so credential-bearing
//! literals never land on disk.

/// Keywords whose nearby string literals must not be logged.
const SENSITIVE_KEYWORDS: &[&str] = &["PASSWORD", "SECRET", "TOKEN", "API_KEY"];

/// Redact quoted literals from statements that mention a sensitive
/// keyword. Statements without one pass through untouched.
pub fn redact_sensitive_sql(sql: &str) -> String {
    let upper = sql.to_uppercase();
    if !SENSITIVE_KEYWORDS.iter().any(|k| upper.contains(k)) {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars();
    while let Some(c) = chars.next() {
        if c == '\'' {
            out.push_str("'[REDACTED]'");
            // Skip to the closing quote, honouring '' escapes.
            while let Some(inner) = chars.next() {
                if inner == '\'' {
                    match chars.clone().next() {
                        Some('\'') => {
                            chars.next();
                        }
                        _ => break,
                    }
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sql_untouched() {
        let sql = "SELECT * FROM t WHERE name = 'alice'";
        assert_eq!(redact_sensitive_sql(sql), sql);
    }

    #[test]
    fn test_password_literal_redacted() {
        let sql = "UPDATE accounts SET password = 'hunter2' WHERE id = 1";
        let redacted = redact_sensitive_sql(sql);
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains("'[REDACTED]'"));
        assert!(redacted.contains("WHERE id = 1"));
    }

    #[test]
    fn test_every_literal_redacted_when_sensitive() {
        let sql = "INSERT INTO creds (name, token) VALUES ('svc', 'abc123')";
        let redacted = redact_sensitive_sql(sql);
        assert!(!redacted.contains("svc"));
        assert!(!redacted.contains("abc123"));
    }

    #[test]
    fn test_escaped_quote_inside_literal() {
        let sql = "SELECT set_password('it''s secret')";
        let redacted = redact_sensitive_sql(sql);
        assert!(!redacted.contains("secret"));
        assert!(redacted.ends_with(")"));
    }
}
