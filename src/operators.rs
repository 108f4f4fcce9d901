//! Password-hash source for dangerous-verb re-authentication.
//!
//! The user subsystem owns accounts; this server only needs a read-only
//! view of operator password hashes. The export is a flat JSON map of
//! operator id to bcrypt hash, reloaded at startup.

use std::collections::HashMap;
use std::path::Path;

use log::info;
use stratus_api::auth::PasswordHashSource;
use stratus_commons::UserId;

pub struct FilePasswordSource {
    hashes: HashMap<String, String>,
}

impl FilePasswordSource {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let hashes: HashMap<String, String> = serde_json::from_str(&raw)?;
        info!(
            "Loaded {} operator password hash(es) from {}",
            hashes.len(),
            path.as_ref().display()
        );
        Ok(Self { hashes })
    }

    /// An empty source: every re-auth attempt fails. Used when no export
    /// is configured, so destructive verbs cannot clear re-auth.
    pub fn empty() -> Self {
        Self {
            hashes: HashMap::new(),
        }
    }
}

impl PasswordHashSource for FilePasswordSource {
    fn password_hash(&self, user_id: &UserId) -> Option<String> {
        self.hashes.get(user_id.as_str()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_has_no_hashes() {
        let source = FilePasswordSource::empty();
        assert!(source.password_hash(&UserId::from("anyone")).is_none());
    }

    #[test]
    fn test_lookup() {
        let source = FilePasswordSource {
            hashes: [("op-1".to_string(), "$2b$04$hash".to_string())]
                .into_iter()
                .collect(),
        };
        assert_eq!(
            source.password_hash(&UserId::from("op-1")).as_deref(),
            Some("$2b$04$hash")
        );
        assert!(source.password_hash(&UserId::from("op-2")).is_none());
    }
}
