use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::services::PurchasePolicy;
use crate::utils::error::AppError;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::apply_security_headers;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/agora";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub cors_allowed_origins: Vec<String>,
    /// Only sent when serving over HTTPS in production.
    pub include_hsts: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            cors_allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            include_hsts: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub max_tickets_per_purchase: i32,
    pub lock_timeout: Duration,
    pub gateway_timeout: Duration,
    pub pending_grace: Duration,
    pub reconcile_interval: Duration,
    pub http: HttpConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            bind_addr: parse(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().map_err(
                |_| AppError::ConfigError("invalid default bind address".to_string()),
            )?)?,
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            max_tickets_per_purchase: parse(&lookup, "MAX_TICKETS_PER_PURCHASE", 10)?,
            lock_timeout: Duration::from_millis(parse(&lookup, "LOCK_TIMEOUT_MS", 2_000)?),
            gateway_timeout: Duration::from_millis(parse(&lookup, "GATEWAY_TIMEOUT_MS", 10_000)?),
            pending_grace: Duration::from_secs(parse(&lookup, "PENDING_GRACE_SECS", 900)?),
            reconcile_interval: Duration::from_secs(parse(&lookup, "RECONCILE_INTERVAL_SECS", 60)?),
            http: HttpConfig {
                cors_allowed_origins: split_origins(
                    &lookup("CORS_ALLOWED_ORIGINS")
                        .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
                ),
                include_hsts: lookup("RUST_ENV")
                    .map(|v| v.eq_ignore_ascii_case("production"))
                    .unwrap_or(false),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.max_tickets_per_purchase < 1 {
            return Err(AppError::ConfigError(
                "MAX_TICKETS_PER_PURCHASE must be at least 1".to_string(),
            ));
        }
        if self.lock_timeout.is_zero() || self.gateway_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "LOCK_TIMEOUT_MS and GATEWAY_TIMEOUT_MS must be positive".to_string(),
            ));
        }
        // A purchase still waiting on its gateway must never be swept.
        if self.pending_grace <= self.gateway_timeout {
            return Err(AppError::ConfigError(
                "PENDING_GRACE_SECS must exceed GATEWAY_TIMEOUT_MS".to_string(),
            ));
        }
        if self.reconcile_interval.is_zero() {
            return Err(AppError::ConfigError(
                "RECONCILE_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn purchase_policy(&self) -> PurchasePolicy {
        PurchasePolicy {
            max_tickets_per_purchase: self.max_tickets_per_purchase,
            gateway_timeout: self.gateway_timeout,
            pending_grace: self.pending_grace,
        }
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::ConfigError(format!("{} has an invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_addr.port(), 3001);
        assert_eq!(config.max_tickets_per_purchase, 10);
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
        assert_eq!(config.pending_grace, Duration::from_secs(900));
        assert!(!config.http.include_hsts);
        assert_eq!(config.http.cors_allowed_origins.len(), 2);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("MAX_TICKETS_PER_PURCHASE", "4"),
            ("LOCK_TIMEOUT_MS", "250"),
            ("RUST_ENV", "Production"),
            ("CORS_ALLOWED_ORIGINS", "https://agora.example, ,"),
        ])
        .unwrap();
        assert_eq!(config.purchase_policy().max_tickets_per_purchase, 4);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert!(config.http.include_hsts);
        assert_eq!(config.http.cors_allowed_origins, vec!["https://agora.example"]);
    }

    #[test]
    fn test_garbage_value_is_a_config_error() {
        let err = config_from(&[("LOCK_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(msg) if msg.contains("LOCK_TIMEOUT_MS")));
    }

    #[test]
    fn test_grace_must_outlast_gateway_timeout() {
        let err = config_from(&[("GATEWAY_TIMEOUT_MS", "30000"), ("PENDING_GRACE_SECS", "30")])
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_zero_purchase_cap_is_rejected() {
        assert!(config_from(&[("MAX_TICKETS_PER_PURCHASE", "0")]).is_err());
    }
}
