// src/config.rs

use std::{env, str::FromStr, time::Duration};

use dotenvy::dotenv;
use thiserror::Error;
use url::Url;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub port: u16,
    /// Deployment environment (development|staging|production).
    pub env: String,

    pub db_max_connections: u32,
    /// Deadline applied to every individual store call.
    pub db_query_timeout: Duration,

    pub limiter_enabled: bool,
    /// Interval, in seconds, after which one request of the quota is replenished.
    pub limiter_replenish_secs: u64,
    pub limiter_burst: u32,

    pub cors_trusted_origins: Vec<String>,

    /// Directory uploaded image files are written to.
    pub upload_dir: String,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let cors_trusted_origins = match env::var("CORS_TRUSTED_ORIGINS") {
            Ok(raw) => parse_origins(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            database_url,
            rust_log,
            port: parse_or("PORT", 4000)?,
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 25)?,
            db_query_timeout: Duration::from_secs(parse_or("DB_QUERY_TIMEOUT_SECS", 3)?),
            limiter_enabled: parse_or("LIMITER_ENABLED", true)?,
            limiter_replenish_secs: parse_or("LIMITER_REPLENISH_SECS", 1)?,
            limiter_burst: parse_or("LIMITER_BURST", 4)?,
            cors_trusted_origins,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads/images".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

/// Space separated list of origins, e.g. `"http://localhost:4200 https://blog.example.com"`.
fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split_whitespace()
        .map(|origin| {
            Url::parse(origin)
                .map(|_| origin.trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Invalid {
                    key: "CORS_TRUSTED_ORIGINS",
                    value: origin.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_on_whitespace() {
        let origins = parse_origins("http://localhost:4200  https://blog.example.com/").unwrap();
        assert_eq!(
            origins,
            vec!["http://localhost:4200", "https://blog.example.com"]
        );
    }

    #[test]
    fn malformed_origin_is_rejected() {
        let err = parse_origins("http://localhost:4200 not-a-url").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "CORS_TRUSTED_ORIGINS", .. }
        ));
    }
}
