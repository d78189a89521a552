//! Configuration management for the server.

use std::env;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Upper bound on pooled database connections
    pub max_connections: u32,
    /// When set, every request must carry a bearer token
    pub auth_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => match raw.parse() {
                Ok(0) | Err(_) => return Err(ConfigError::InvalidMaxConnections(raw)),
                Ok(n) => n,
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let auth_secret = lookup("AUTH_SECRET").filter(|s| !s.is_empty());

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            auth_secret,
        })
    }

    /// `host:port` to bind the listener on.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value: {0}")]
    InvalidPort(String),

    #[error("Invalid DATABASE_MAX_CONNECTIONS value: {0}")]
    InvalidMaxConnections(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://db")])).unwrap();

        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.auth_secret, None);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://db"), ("PORT", "http")])),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://db"),
                ("DATABASE_MAX_CONNECTIONS", "0"),
            ])),
            Err(ConfigError::InvalidMaxConnections(_))
        ));
    }

    #[test]
    fn empty_secret_means_no_auth() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("AUTH_SECRET", ""),
        ]))
        .unwrap();
        assert_eq!(config.auth_secret, None);
    }
}
