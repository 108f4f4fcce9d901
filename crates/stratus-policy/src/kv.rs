//! Cache-cluster command policy: command classes, the always-blocked list,
//! and input sanitisation.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::error::{PolicyError, Result};

/// Commands rejected for all roles, including in raw mode. Covers
/// data-destroying admin commands, cluster/replication management,
/// scripting, pub/sub, blocking list ops, and connection-state commands
/// that would corrupt a shared client.
pub static BLOCKED_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "FLUSHDB",
        "FLUSHALL",
        "SHUTDOWN",
        "DEBUG",
        "SLAVEOF",
        "REPLICAOF",
        "FAILOVER",
        "CLUSTER",
        "EVAL",
        "EVALSHA",
        "EVAL_RO",
        "EVALSHA_RO",
        "SCRIPT",
        "FUNCTION",
        "FCALL",
        "FCALL_RO",
        "MODULE",
        "MIGRATE",
        "ACL",
        "CONFIG",
        "SUBSCRIBE",
        "PSUBSCRIBE",
        "SSUBSCRIBE",
        "MONITOR",
        "WAIT",
        "WAITAOF",
        "BLPOP",
        "BRPOP",
        "BLMOVE",
        "BRPOPLPUSH",
        "BLMPOP",
        "BZPOPMIN",
        "BZPOPMAX",
        "BZMPOP",
        "SELECT",
        "SWAPDB",
        "MULTI",
        "EXEC",
        "DISCARD",
        "WATCH",
        "UNWATCH",
        "CLIENT",
        "RESET",
        "HELLO",
        "AUTH",
        "QUIT",
        "BGSAVE",
        "BGREWRITEAOF",
        "SAVE",
        "KEYS",
    ]
    .into_iter()
    .collect()
});

static READ_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "GET", "MGET", "EXISTS", "TTL", "PTTL", "TYPE", "STRLEN", "GETRANGE", "LLEN", "LRANGE",
        "LINDEX", "HGET", "HGETALL", "HMGET", "HLEN", "HKEYS", "HVALS", "SMEMBERS", "SISMEMBER",
        "SCARD", "ZRANGE", "ZRANGEBYSCORE", "ZSCORE", "ZCARD", "ZRANK", "DBSIZE", "MEMORY",
        "OBJECT", "RANDOMKEY",
    ]
    .into_iter()
    .collect()
});

static WRITE_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "SET", "SETEX", "PSETEX", "SETNX", "MSET", "APPEND", "SETRANGE", "GETSET", "GETDEL",
        "DEL", "UNLINK", "EXPIRE", "PEXPIRE", "EXPIREAT", "PERSIST", "INCR", "DECR", "INCRBY",
        "DECRBY", "INCRBYFLOAT", "LPUSH", "RPUSH", "LPOP", "RPOP", "LSET", "LREM", "LTRIM",
        "HSET", "HSETNX", "HDEL", "HINCRBY", "SADD", "SREM", "SPOP", "ZADD", "ZREM", "ZINCRBY",
        "ZPOPMIN", "ZPOPMAX",
    ]
    .into_iter()
    .collect()
});

/// Maximum accepted length for a SCAN pattern.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Maximum accepted length for a raw command line.
pub const MAX_RAW_COMMAND_LENGTH: usize = 10_000;

/// Class of a cache command for the authorization matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvCommandClass {
    Read,
    Write,
    Blocked,
    Raw,
}

/// Classify a command verb. `RAW` is the high-privilege passthrough mode;
/// its payload is checked separately with [`validate_raw_command`].
/// Unknown verbs are unsupported rather than silently passed through.
pub fn classify_kv_command(command: &str) -> Result<KvCommandClass> {
    let upper = command.trim().to_uppercase();
    if upper.is_empty() {
        return Err(PolicyError::InvalidInput("Command cannot be empty".into()));
    }
    if upper == "RAW" {
        return Ok(KvCommandClass::Raw);
    }
    if BLOCKED_COMMANDS.contains(upper.as_str()) {
        return Ok(KvCommandClass::Blocked);
    }
    if READ_COMMANDS.contains(upper.as_str()) {
        return Ok(KvCommandClass::Read);
    }
    if WRITE_COMMANDS.contains(upper.as_str()) {
        return Ok(KvCommandClass::Write);
    }
    Err(PolicyError::UnsupportedCommand(upper))
}

/// Sanitise keys/values/arguments: no NUL bytes anywhere.
pub fn validate_kv_args(args: &[String]) -> Result<()> {
    for arg in args {
        if arg.contains('\0') {
            return Err(PolicyError::NulByte);
        }
    }
    Ok(())
}

/// Sanitise a raw command line: length cap, NUL bytes, and the blocked
/// list applied to its leading verb. Returns the tokenised command.
pub fn validate_raw_command(raw: &str) -> Result<Vec<String>> {
    if raw.len() > MAX_RAW_COMMAND_LENGTH {
        return Err(PolicyError::TooLong {
            kind: "Raw command",
            len: raw.len(),
            max: MAX_RAW_COMMAND_LENGTH,
        });
    }
    if raw.contains('\0') {
        return Err(PolicyError::NulByte);
    }
    let tokens: Vec<String> = raw.split_whitespace().map(|t| t.to_string()).collect();
    let verb = tokens
        .first()
        .ok_or_else(|| PolicyError::InvalidInput("Raw command cannot be empty".into()))?
        .to_uppercase();
    if BLOCKED_COMMANDS.contains(verb.as_str()) {
        return Err(PolicyError::BlockedCommand(verb));
    }
    Ok(tokens)
}

/// Validate a SCAN pattern: bounded length, no NUL bytes, and never a
/// wildcard-only pattern that would match every key in the cluster.
pub fn validate_scan_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(PolicyError::InvalidInput("Pattern cannot be empty".into()));
    }
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(PolicyError::TooLong {
            kind: "Pattern",
            len: pattern.len(),
            max: MAX_PATTERN_LENGTH,
        });
    }
    if pattern.contains('\0') {
        return Err(PolicyError::NulByte);
    }
    if pattern.chars().all(|c| c == '*' || c == '?') {
        return Err(PolicyError::WildcardPattern(pattern.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_list_is_complete() {
        // Spot checks across the categories of the fixed list.
        for cmd in ["FLUSHALL", "CLUSTER", "EVAL", "SUBSCRIBE", "BLPOP", "MULTI", "KEYS", "WAITAOF"] {
            assert_eq!(classify_kv_command(cmd).unwrap(), KvCommandClass::Blocked);
        }
        assert_eq!(BLOCKED_COMMANDS.len(), 50);
    }

    #[test]
    fn test_classify_read_write() {
        assert_eq!(classify_kv_command("get").unwrap(), KvCommandClass::Read);
        assert_eq!(classify_kv_command("SET").unwrap(), KvCommandClass::Write);
        assert_eq!(classify_kv_command("unlink").unwrap(), KvCommandClass::Write);
        assert_eq!(classify_kv_command("RAW").unwrap(), KvCommandClass::Raw);
    }

    #[test]
    fn test_unknown_command_is_unsupported() {
        assert!(matches!(
            classify_kv_command("FROBNICATE"),
            Err(PolicyError::UnsupportedCommand(_))
        ));
    }

    #[test]
    fn test_raw_blocked_verb_rejected() {
        let err = validate_raw_command("FLUSHALL").unwrap_err();
        assert!(matches!(err, PolicyError::BlockedCommand(v) if v == "FLUSHALL"));
        // Case-insensitive.
        assert!(validate_raw_command("flushall ASYNC").is_err());
    }

    #[test]
    fn test_raw_passthrough_tokenises() {
        let tokens = validate_raw_command("SET session:1 abc").unwrap();
        assert_eq!(tokens, vec!["SET", "session:1", "abc"]);
    }

    #[test]
    fn test_raw_length_cap() {
        let raw = format!("SET k {}", "v".repeat(MAX_RAW_COMMAND_LENGTH));
        assert!(matches!(
            validate_raw_command(&raw),
            Err(PolicyError::TooLong { .. })
        ));
    }

    #[test]
    fn test_nul_bytes_rejected() {
        assert!(validate_kv_args(&["ok".into(), "bad\0".into()]).is_err());
        assert!(validate_raw_command("SET k v\0alue").is_err());
        assert!(validate_scan_pattern("session:\0*").is_err());
    }

    #[test]
    fn test_wildcard_only_patterns_refused() {
        for pattern in ["*", "**", "?", "*?*"] {
            assert!(
                matches!(
                    validate_scan_pattern(pattern),
                    Err(PolicyError::WildcardPattern(_))
                ),
                "{}",
                pattern
            );
        }
    }

    #[test]
    fn test_real_patterns_accepted() {
        assert!(validate_scan_pattern("session:*").is_ok());
        assert!(validate_scan_pattern("user:?:profile").is_ok());
    }

    #[test]
    fn test_pattern_length_cap() {
        let pattern = format!("session:{}", "x".repeat(MAX_PATTERN_LENGTH));
        assert!(matches!(
            validate_scan_pattern(&pattern),
            Err(PolicyError::TooLong { .. })
        ));
    }
}
