use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, ConfigResult};

/// One logical database hosted by an SQL cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Logical name used in requests (e.g. "mydb").
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Physical database name on the engine.
    pub database: String,
    pub schemas: Vec<String>,
    #[serde(rename = "defaultSchema")]
    pub default_schema: String,
}

/// A named relational cluster hosting one or more databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlCloud {
    #[serde(rename = "cloudName")]
    pub cloud_name: String,
    pub db_configs: Vec<DbConfig>,
}

impl SqlCloud {
    pub fn db(&self, name: &str) -> Option<&DbConfig> {
        self.db_configs.iter().find(|d| d.name == name)
    }
}

/// A named cache cluster, addressed through a seed endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvCloud {
    #[serde(rename = "cloudName")]
    pub cloud_name: String,
    pub host: String,
    pub port: u16,
}

/// Declared topology: one primary SQL cloud, any number of secondary SQL
/// clouds, and the KV clouds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub primary: SqlCloud,
    #[serde(default)]
    pub secondary: Vec<SqlCloud>,
    #[serde(default)]
    pub kv: Vec<KvCloud>,
}

impl CloudConfig {
    /// All SQL clouds, primary first.
    pub fn sql_clouds(&self) -> impl Iterator<Item = &SqlCloud> {
        std::iter::once(&self.primary).chain(self.secondary.iter())
    }

    pub fn sql_cloud(&self, name: &str) -> Option<&SqlCloud> {
        self.sql_clouds().find(|c| c.cloud_name == name)
    }

    pub fn sql_target(&self, cloud: &str, database: &str) -> Option<&DbConfig> {
        self.sql_cloud(cloud).and_then(|c| c.db(database))
    }

    pub fn kv_cloud(&self, name: &str) -> Option<&KvCloud> {
        self.kv.iter().find(|c| c.cloud_name == name)
    }

    /// Structural validation: every declared cloud carries the fields the
    /// executors rely on. Missing pieces are fatal at startup.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_sql_cloud(&self.primary, "primary")?;
        for cloud in &self.secondary {
            validate_sql_cloud(cloud, "secondary")?;
        }
        for kv in &self.kv {
            if kv.cloud_name.is_empty() {
                return Err(ConfigError::Invalid("kv cloud is missing cloudName".into()));
            }
            if kv.host.is_empty() || kv.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "kv cloud '{}' is missing host/port",
                    kv.cloud_name
                )));
            }
        }
        Ok(())
    }
}

fn validate_sql_cloud(cloud: &SqlCloud, kind: &str) -> ConfigResult<()> {
    if cloud.cloud_name.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{} sql cloud is missing cloudName",
            kind
        )));
    }
    if cloud.db_configs.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "sql cloud '{}' declares no databases",
            cloud.cloud_name
        )));
    }
    for db in &cloud.db_configs {
        if db.name.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "sql cloud '{}' has a db_config without a name",
                cloud.cloud_name
            )));
        }
        if db.host.is_empty() || db.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "database '{}' on cloud '{}' is missing host/port",
                db.name, cloud.cloud_name
            )));
        }
        if db.user.is_empty() || db.database.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "database '{}' on cloud '{}' is missing user/database",
                db.name, cloud.cloud_name
            )));
        }
        if db.schemas.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "database '{}' on cloud '{}' declares no schemas",
                db.name, cloud.cloud_name
            )));
        }
        if !db.schemas.contains(&db.default_schema) {
            return Err(ConfigError::Invalid(format!(
                "database '{}' on cloud '{}': defaultSchema '{}' is not in schemas",
                db.name, cloud.cloud_name, db.default_schema
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CloudConfig {
        serde_json::from_value(serde_json::json!({
            "primary": {
                "cloudName": "alpha",
                "db_configs": [{
                    "name": "mydb",
                    "host": "db.alpha.internal",
                    "port": 5432,
                    "user": "stratus",
                    "password": "pw",
                    "database": "mydb_prod",
                    "schemas": ["public", "audit"],
                    "defaultSchema": "public"
                }]
            },
            "secondary": [{
                "cloudName": "beta",
                "db_configs": [{
                    "name": "mydb",
                    "host": "db.beta.internal",
                    "port": 5432,
                    "user": "stratus",
                    "password": "pw",
                    "database": "mydb_prod",
                    "schemas": ["public"],
                    "defaultSchema": "public"
                }]
            }],
            "kv": [{"cloudName": "cache-east", "host": "cache.east", "port": 6379}]
        }))
        .unwrap()
    }

    #[test]
    fn test_sample_validates() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_lookup_helpers() {
        let cfg = sample();
        assert!(cfg.sql_target("alpha", "mydb").is_some());
        assert!(cfg.sql_target("beta", "mydb").is_some());
        assert!(cfg.sql_target("gamma", "mydb").is_none());
        assert!(cfg.sql_target("alpha", "otherdb").is_none());
        assert!(cfg.kv_cloud("cache-east").is_some());
        assert_eq!(cfg.sql_clouds().count(), 2);
    }

    #[test]
    fn test_default_schema_must_be_declared() {
        let mut cfg = sample();
        cfg.primary.db_configs[0].default_schema = "missing".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_secondary_is_allowed() {
        let mut cfg = sample();
        cfg.secondary.clear();
        assert!(cfg.validate().is_ok());
    }
}
