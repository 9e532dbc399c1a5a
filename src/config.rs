//! Configuration management for the docshare server

use std::env;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Mark the session cookie `Secure` (production deployments)
    pub secure_cookie: bool,
    /// Require save/list tokens to match a live session
    pub verify: bool,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "SERVER_HOST",
                value: self.host.clone(),
            })
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let port = match lookup("SERVER_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "SERVER_PORT",
                value: raw,
            })?,
            None => 3000,
        };

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                port,
            },
            database: DatabaseConfig { url },
            session: SessionConfig {
                secure_cookie: lookup("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production")),
                verify: parse_flag("VERIFY_SESSIONS", lookup("VERIFY_SESSIONS"))?,
            },
        })
    }
}

fn parse_flag(name: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v == "0" || v.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            name,
            value: v.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(
            config(&[]),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
        assert!(matches!(
            config(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("DATABASE_URL", "sqlite:docs.db")]).unwrap();
        assert_eq!(config.database.url, "sqlite:docs.db");
        assert_eq!(config.server.bind_addr().unwrap().to_string(), "127.0.0.1:3000");
        assert!(!config.session.secure_cookie);
        assert!(!config.session.verify);
    }

    #[test]
    fn production_and_verification_flags() {
        let config = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("APP_ENV", "Production"),
            ("VERIFY_SESSIONS", "true"),
            ("SERVER_PORT", "8080"),
        ])
        .unwrap();
        assert!(config.session.secure_cookie);
        assert!(config.session.verify);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            config(&[("DATABASE_URL", "x"), ("SERVER_PORT", "http")]),
            Err(ConfigError::Invalid { name: "SERVER_PORT", .. })
        ));
        assert!(matches!(
            config(&[("DATABASE_URL", "x"), ("VERIFY_SESSIONS", "maybe")]),
            Err(ConfigError::Invalid { name: "VERIFY_SESSIONS", .. })
        ));
    }
}
