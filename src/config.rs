//! Process configuration from the environment.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend { Postgres, Memory }

impl FromStr for Backend {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid { key: "STORE_BACKEND", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub nats_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parse<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
            match raw {
                Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { key, value: v }),
                None => Ok(default),
            }
        }

        let backend = match get("STORE_BACKEND") {
            Some(v) => v.parse()?,
            None => Backend::Postgres,
        };
        let database_url = get("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if backend == Backend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        Ok(Self {
            port: parse("PORT", get("PORT"), 8083)?,
            backend,
            database_url,
            db_max_connections: parse("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 10)?,
            nats_url: get("NATS_URL").filter(|v| !v.trim().is_empty()),
        })
    }
}
