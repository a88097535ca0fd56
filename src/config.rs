use serde::Deserialize;

use crate::error::Error;

fn default_max_connections() -> u32 {
    5
}

/// Connection settings for [`Db::connect`](crate::Db::connect).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// `postgres://...`, `postgresql://...` or `sqlite:...`
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub timestamps: TimestampConfig,
}

/// Field names the timestamp hooks look for on a model.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimestampConfig {
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: String,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            created_at: "created_at".to_string(),
            updated_at: "updated_at".to_string(),
            deleted_at: "deleted_at".to_string(),
        }
    }
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            timestamps: TimestampConfig::default(),
        }
    }

    /// Parse a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_string()))?;

        let mut config = Self::new(url);
        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = max.parse().map_err(|_| {
                Error::Config(format!("DATABASE_MAX_CONNECTIONS is not a number: {}", max))
            })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let config = Config::from_json(r#"{"url": "sqlite::memory:"}"#).unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.timestamps, TimestampConfig::default());
    }

    #[test]
    fn test_deserialize_partial_timestamps() {
        let config = Config::from_json(
            r#"{"url": "postgres://localhost/db", "timestamps": {"deleted_at": "removed_at"}}"#,
        )
        .unwrap();
        assert_eq!(config.timestamps.deleted_at, "removed_at");
        assert_eq!(config.timestamps.created_at, "created_at");
    }

    #[test]
    fn test_missing_url_is_config_error() {
        assert!(matches!(Config::from_json("{}"), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "DATABASE_MAX_CONNECTIONS" => Some("2".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.max_connections, 2);

        assert!(matches!(
            Config::from_lookup(|_| None),
            Err(Error::Config(_))
        ));
        assert!(Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            _ => Some("many".to_string()),
        })
        .is_err());
    }
}
