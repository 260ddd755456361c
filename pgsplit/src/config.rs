//! Connection manager configuration.
//!
//! Configuration is loaded from a YAML file with environment variable overrides.
//! Variables prefixed with `PGSPLIT_` override YAML values; nested fields use
//! double underscores, e.g. `PGSPLIT_PRIMARY__HOST=db1` sets `primary.host`.
//!
//! ## Configuration Structure
//!
//! ```yaml
//! primary:
//!   host: db1.internal
//!   port: 5432
//!   username: app
//!   password: secret
//!   database: app
//! replica:          # optional; omit (or leave fields blank) for primary-only mode
//!   host: db2.internal
//!   port: 5432
//!   username: app
//!   password: secret
//!   database: app
//! pool:
//!   pool_size: 10
//!   max_overflow: 20
//!   pool_timeout: 30s
//!   pool_recycle: 1h
//! ```

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::time::Duration;

use crate::errors::Error;

/// Connection parameters for a single database backend.
///
/// Immutable once constructed; the manager never mutates it after `new()`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Database server hostname or IP address
    pub host: String,
    /// Database server port
    pub port: u16,
    /// Role to authenticate as
    pub username: String,
    /// Password for the role
    pub password: String,
    /// Database name to connect to
    pub database: String,
}

impl BackendConfig {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.is_empty() {
            missing.push("host");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if self.username.is_empty() {
            missing.push("username");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.database.is_empty() {
            missing.push("database");
        }
        missing
    }

    /// True when every field needed to reach the backend is populated.
    ///
    /// A replica entry with blank fields is treated the same as no replica at all.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Validate that all required fields are populated.
    pub fn validate(&self, role: &str) -> Result<(), Error> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration {
                message: format!("{role} config missing required fields: {}", missing.join(", ")),
            })
        }
    }

    /// Build sqlx connect options for this backend.
    ///
    /// Credentials go through typed options, never through a formatted URL.
    pub(crate) fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
    }
}

/// Pool tuning applied identically to both backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Base number of pooled connections per backend
    pub pool_size: u32,
    /// Additional connections allowed beyond `pool_size` under load
    pub max_overflow: u32,
    /// How long a checkout may wait for a free connection
    #[serde(with = "humantime_serde")]
    pub pool_timeout: Duration,
    /// Connections older than this are recycled rather than reused
    #[serde(with = "humantime_serde")]
    pub pool_recycle: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: 10,
            max_overflow: 20,
            pool_timeout: Duration::from_secs(30),
            pool_recycle: Duration::from_secs(3600),
        }
    }
}

/// Root configuration for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// The writable primary backend (required)
    pub primary: BackendConfig,
    /// Optional read-only replica backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica: Option<BackendConfig>,
    /// Pool tuning shared by both backends
    #[serde(default)]
    pub pool: PoolSettings,
}

impl DatabaseConfig {
    /// Load configuration from a YAML file with `PGSPLIT_` environment overrides.
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(path).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// The figment used by [`load`](Self::load), exposed for embedding in a
    /// larger application config.
    pub fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("PGSPLIT_").split("__"))
    }

    /// Validate the configuration for required fields.
    ///
    /// Only the primary is validated here: an incomplete replica entry means
    /// "no replica", not an error.
    pub fn validate(&self) -> Result<(), Error> {
        self.primary.validate("primary")
    }

    /// The replica backend, if one is fully configured.
    pub fn replica(&self) -> Option<&BackendConfig> {
        self.replica.as_ref().filter(|cfg| cfg.is_complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn backend(host: &str) -> BackendConfig {
        BackendConfig {
            host: host.to_string(),
            port: 5432,
            username: "app".to_string(),
            password: "secret".to_string(),
            database: "app".to_string(),
        }
    }

    #[test]
    fn test_load_with_replica() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
primary:
  host: db1
  port: 5432
  username: a
  password: b
  database: app
replica:
  host: db2
  port: 5432
  username: a
  password: b
  database: app
pool:
  pool_timeout: 5s
"#,
            )?;

            let config = DatabaseConfig::load("test.yaml")?;

            assert_eq!(config.primary.host, "db1");
            assert_eq!(config.replica().map(|r| r.host.as_str()), Some("db2"));
            assert_eq!(config.pool.pool_timeout, Duration::from_secs(5));
            // unspecified pool fields keep their defaults
            assert_eq!(config.pool.pool_size, 10);
            assert_eq!(config.pool.max_overflow, 20);
            assert_eq!(config.pool.pool_recycle, Duration::from_secs(3600));

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
primary:
  host: db1
  port: 5432
  username: a
  password: b
  database: app
"#,
            )?;

            jail.set_env("PGSPLIT_PRIMARY__HOST", "db1.override");
            jail.set_env("PGSPLIT_POOL__POOL_SIZE", "3");

            let config = DatabaseConfig::load("test.yaml")?;

            assert_eq!(config.primary.host, "db1.override");
            assert_eq!(config.pool.pool_size, 3);
            assert!(config.replica().is_none());

            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_blank_primary_fields() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
primary:
  host: db1
  port: 5432
  username: ""
  password: b
  database: app
"#,
            )?;

            let err = DatabaseConfig::load("test.yaml").unwrap_err();
            assert!(err.to_string().contains("username"));

            Ok(())
        });
    }

    #[test]
    fn test_incomplete_replica_counts_as_not_configured() {
        let mut replica = backend("db2");
        replica.password = String::new();

        let config = DatabaseConfig {
            primary: backend("db1"),
            replica: Some(replica),
            pool: PoolSettings::default(),
        };

        config.validate().unwrap();
        assert!(config.replica().is_none());
    }

    #[test]
    fn test_validate_lists_every_missing_field() {
        let config = BackendConfig {
            host: String::new(),
            port: 0,
            username: "a".to_string(),
            password: "b".to_string(),
            database: String::new(),
        };

        let err = config.validate("primary").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("host"));
        assert!(message.contains("port"));
        assert!(message.contains("database"));
        assert!(!message.contains("username"));
    }
}
