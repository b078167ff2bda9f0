//! Manager and database configuration

use crate::error::{RbacError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RbacConfig {
    /// Roles every user holds, with or without assignment rows
    #[serde(default)]
    pub default_roles: Vec<String>,

    /// PostgreSQL connection settings; `None` selects the in-memory store
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

impl RbacConfig {
    /// Build from the environment
    ///
    /// - `RBAC_DEFAULT_ROLES` - comma separated role names
    /// - `DATABASE_URL` - enables the PostgreSQL store
    /// - `RBAC_DB_MAX_CONNECTIONS`, `RBAC_DB_MIN_CONNECTIONS` - pool bounds
    pub fn from_env() -> Result<Self> {
        let default_roles = std::env::var("RBAC_DEFAULT_ROLES")
            .map(|raw| parse_role_list(&raw))
            .unwrap_or_default();

        let database = match std::env::var("DATABASE_URL") {
            Ok(url) => {
                let mut db = DatabaseConfig::new(url);
                if let Some(max) = env_number("RBAC_DB_MAX_CONNECTIONS")? {
                    db.max_connections = max;
                }
                if let Some(min) = env_number("RBAC_DB_MIN_CONNECTIONS")? {
                    db.min_connections = min;
                }
                Some(db)
            }
            Err(_) => None,
        };

        let config = Self {
            default_roles,
            database,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_default_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_roles.iter().any(|role| role.trim().is_empty()) {
            return Err(RbacError::InvalidInput(
                "default role names cannot be blank".to_string(),
            ));
        }

        if let Some(db) = &self.database {
            if db.min_connections > db.max_connections {
                return Err(RbacError::InvalidInput(format!(
                    "min_connections ({}) exceeds max_connections ({})",
                    db.min_connections, db.max_connections
                )));
            }
        }

        Ok(())
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

fn default_max_connections() -> u32 { 25 }
fn default_min_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_idle_timeout() -> u64 { 600 }
fn default_max_lifetime() -> u64 { 1800 }

fn parse_role_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_number(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RbacError::InvalidInput(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_list() {
        assert_eq!(
            parse_role_list(" guest, member ,,"),
            vec!["guest".to_string(), "member".to_string()]
        );
        assert!(parse_role_list("").is_empty());
    }

    #[test]
    fn test_database_defaults() {
        let db = DatabaseConfig::new("postgresql://localhost/rbac");
        assert_eq!(db.max_connections, 25);
        assert_eq!(db.min_connections, 5);
        assert_eq!(db.acquire_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: RbacConfig = serde_json::from_str(
            r#"{"default_roles": ["guest"], "database": {"url": "postgresql://db/rbac"}}"#,
        )
        .unwrap();

        assert_eq!(config.default_roles, vec!["guest".to_string()]);
        assert_eq!(config.database.unwrap().max_lifetime_secs, 1800);
    }

    #[test]
    fn test_validate_rejects_blank_roles() {
        let config = RbacConfig::default().with_default_roles(["guest", " "]);
        assert!(matches!(config.validate(), Err(RbacError::InvalidInput(_))));

        let mut db = DatabaseConfig::new("postgresql://db/rbac");
        db.min_connections = 30;
        let config = RbacConfig {
            default_roles: vec![],
            database: Some(db),
        };
        assert!(matches!(config.validate(), Err(RbacError::InvalidInput(_))));
    }

    #[test]
    fn test_env_number_rejects_garbage() {
        std::env::set_var("RBAC_TEST_ENV_NUMBER", "lots");
        let err = env_number("RBAC_TEST_ENV_NUMBER").unwrap_err();
        assert!(matches!(err, RbacError::InvalidInput(_)));
        assert!(err.to_string().starts_with("Invalid input: RBAC_TEST_ENV_NUMBER"));

        std::env::set_var("RBAC_TEST_ENV_NUMBER", " 12 ");
        assert_eq!(env_number("RBAC_TEST_ENV_NUMBER").unwrap(), Some(12));
        std::env::remove_var("RBAC_TEST_ENV_NUMBER");
        assert_eq!(env_number("RBAC_TEST_ENV_NUMBER").unwrap(), None);
    }
}
