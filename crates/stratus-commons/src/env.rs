//! Recognised environment settings.
//!
//! All keys are optional; defaults match production expectations. Parsed
//! once at startup and passed down, so executors never read the process
//! environment themselves.

/// Default TTL for execution records in the shared store.
pub const DEFAULT_EXECUTION_TTL_SECONDS: u64 = 300;

/// Default upper bound for a whole request's statement timeout.
pub const DEFAULT_MAX_QUERY_TIMEOUT_MS: u64 = 300_000;

/// Default per-statement wall-clock timeout.
pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone)]
pub struct EnvSettings {
    pub redis_host: String,
    pub redis_port: u16,
    /// Use a cluster client for the shared execution store.
    pub redis_cluster_mode: bool,
    pub execution_ttl_seconds: u64,
    pub max_query_timeout_ms: u64,
    pub statement_timeout_ms: u64,
    /// Consumed by the external session layer; surfaced here so the whole
    /// environment contract lives in one place.
    pub session_ttl_seconds: Option<u64>,
}

impl EnvSettings {
    pub fn from_env() -> Self {
        Self {
            redis_host: var_or("REDIS_HOST", "localhost"),
            redis_port: parse_or("REDIS_PORT", 6379),
            redis_cluster_mode: bool_var("REDIS_CLUSTER_MODE"),
            execution_ttl_seconds: parse_or(
                "REDIS_EXECUTION_TTL_SECONDS",
                DEFAULT_EXECUTION_TTL_SECONDS,
            ),
            max_query_timeout_ms: parse_or("MAX_QUERY_TIMEOUT_MS", DEFAULT_MAX_QUERY_TIMEOUT_MS),
            statement_timeout_ms: parse_or("STATEMENT_TIMEOUT_MS", DEFAULT_STATEMENT_TIMEOUT_MS),
            session_ttl_seconds: std::env::var("SESSION_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// The in-memory execution store tier is permitted only against a local
    /// Redis; in production the shared tier is authoritative.
    pub fn redis_is_local(&self) -> bool {
        matches!(self.redis_host.as_str(), "localhost" | "127.0.0.1")
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_cluster_mode: false,
            execution_ttl_seconds: DEFAULT_EXECUTION_TTL_SECONDS,
            max_query_timeout_ms: DEFAULT_MAX_QUERY_TIMEOUT_MS,
            statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
            session_ttl_seconds: None,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn bool_var(key: &str) -> bool {
    std::env::var(key)
        .map(|v| {
            let v = v.to_lowercase();
            v == "true" || v == "1" || v == "yes"
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EnvSettings::default();
        assert_eq!(settings.execution_ttl_seconds, 300);
        assert_eq!(settings.max_query_timeout_ms, 300_000);
        assert!(settings.redis_is_local());
        assert_eq!(settings.redis_url(), "redis://localhost:6379/");
    }

    #[test]
    fn test_local_detection() {
        let mut settings = EnvSettings::default();
        settings.redis_host = "127.0.0.1".to_string();
        assert!(settings.redis_is_local());
        settings.redis_host = "redis.prod.internal".to_string();
        assert!(!settings.redis_is_local());
    }
}
