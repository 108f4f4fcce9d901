use std::fs;
use std::path::Path;

use super::types::CloudConfig;
use crate::errors::{ConfigError, ConfigResult};

/// Root of the mounted secret tree for `${SECRET:name:key}` placeholders.
const SECRETS_ROOT: &str = "/secrets";

impl CloudConfig {
    /// Load the topology from a JSON file, resolving `${VAR}` from the
    /// environment and `${SECRET:name:key}` from the secret mount, then
    /// validating the result.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_json(&raw)
    }

    /// Parse a topology document from raw JSON text (after substitution).
    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        let substituted = substitute_placeholders(raw, &env_lookup, &secret_lookup)?;
        let config: CloudConfig = serde_json::from_str(&substituted)?;
        config.validate()?;
        Ok(config)
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn secret_lookup(name: &str, key: &str) -> ConfigResult<String> {
    let path = Path::new(SECRETS_ROOT).join(name).join(key);
    fs::read_to_string(&path)
        .map(|s| s.trim_end_matches('\n').to_string())
        .map_err(|e| ConfigError::Secret {
            name: name.to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        })
}

/// Replace `${VAR}` and `${SECRET:name:key}` placeholders in `raw`.
///
/// Lookup functions are injected so tests run without touching the process
/// environment or a secret mount.
pub fn substitute_placeholders(
    raw: &str,
    env: &dyn Fn(&str) -> Option<String>,
    secret: &dyn Fn(&str, &str) -> ConfigResult<String>,
) -> ConfigResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::Invalid("unterminated ${...} placeholder".into()))?;
        let inner = &after[..end];
        if let Some(spec) = inner.strip_prefix("SECRET:") {
            let mut parts = spec.splitn(2, ':');
            let name = parts.next().unwrap_or("");
            let key = parts.next().unwrap_or("");
            if name.is_empty() || key.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "malformed secret placeholder '${{{}}}'",
                    inner
                )));
            }
            out.push_str(&secret(name, key)?);
        } else {
            let value =
                env(inner).ok_or_else(|| ConfigError::UnresolvedVariable(inner.to_string()))?;
            out.push_str(&value);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_env(name: &str) -> Option<String> {
        match name {
            "DB_HOST" => Some("db.internal".to_string()),
            "DB_PORT" => Some("5432".to_string()),
            _ => None,
        }
    }

    fn fake_secret(name: &str, key: &str) -> ConfigResult<String> {
        if name == "pg" && key == "password" {
            Ok("s3cret".to_string())
        } else {
            Err(ConfigError::Secret {
                name: name.to_string(),
                key: key.to_string(),
                reason: "not found".to_string(),
            })
        }
    }

    #[test]
    fn test_env_substitution() {
        let out =
            substitute_placeholders("host=${DB_HOST}:${DB_PORT}", &fake_env, &fake_secret).unwrap();
        assert_eq!(out, "host=db.internal:5432");
    }

    #[test]
    fn test_secret_substitution() {
        let out =
            substitute_placeholders("pw=${SECRET:pg:password}", &fake_env, &fake_secret).unwrap();
        assert_eq!(out, "pw=s3cret");
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let err = substitute_placeholders("${NOPE}", &fake_env, &fake_secret).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedVariable(v) if v == "NOPE"));
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        assert!(substitute_placeholders("${SECRET:pg:missing}", &fake_env, &fake_secret).is_err());
    }

    #[test]
    fn test_unterminated_placeholder() {
        assert!(substitute_placeholders("${DB_HOST", &fake_env, &fake_secret).is_err());
    }

    #[test]
    fn test_text_without_placeholders_untouched() {
        let raw = r#"{"primary": "alpha"}"#;
        assert_eq!(
            substitute_placeholders(raw, &fake_env, &fake_secret).unwrap(),
            raw
        );
    }
}
