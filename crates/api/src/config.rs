//! Application configuration loaded from environment variables.

use std::time::Duration;

use reconcile::{ReconcilerConfig, RetryPolicy};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// How purchase receipts are checked before granting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMode {
    /// Look the transaction up through the billing vendor.
    #[default]
    Vendor,
    /// Accept the client's assertion as made.
    Trust,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: Postgres ledger; unset uses the in-memory ledger
/// - `BILLING_API_KEY`: vendor server key; unset disables vendor verification
/// - `CATALOG_PATH`: JSON product catalog; unset uses the built-in catalog
/// - `RECONCILE_MAX_ATTEMPTS`, `RECONCILE_BASE_DELAY_MS`,
///   `RECONCILE_MAX_DELAY_MS`: server-side retry budget
/// - `REQUIRE_TRANSACTION_ID`: reject assertions without a vendor transaction
/// - `RECEIPT_VERIFICATION`: `vendor` or `trust`
/// - `DEV_SESSION_TOKEN`: registers a session token for a fresh user at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub billing_api_key: Option<String>,
    pub catalog_path: Option<String>,
    pub reconcile_max_attempts: u32,
    pub reconcile_base_delay_ms: u64,
    pub reconcile_max_delay_ms: u64,
    pub require_transaction_id: bool,
    pub receipt_verification: VerificationMode,
    pub dev_session_token: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let log_format = match var("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => defaults.log_format,
            Some(v) if v == "pretty" => LogFormat::Pretty,
            Some(v) if v == "json" => LogFormat::Json,
            Some(v) => return Err(invalid("LOG_FORMAT", "pretty or json", v)),
        };

        let receipt_verification = match var("RECEIPT_VERIFICATION")
            .as_deref()
            .map(str::to_ascii_lowercase)
        {
            None => defaults.receipt_verification,
            Some(v) if v == "vendor" => VerificationMode::Vendor,
            Some(v) if v == "trust" => VerificationMode::Trust,
            Some(v) => return Err(invalid("RECEIPT_VERIFICATION", "vendor or trust", v)),
        };

        let reconcile_max_attempts = parse(
            &var,
            "RECONCILE_MAX_ATTEMPTS",
            "a positive integer",
            defaults.reconcile_max_attempts,
        )?;
        if reconcile_max_attempts == 0 {
            return Err(invalid(
                "RECONCILE_MAX_ATTEMPTS",
                "a positive integer",
                "0".to_string(),
            ));
        }

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse(&var, "PORT", "a port number", defaults.port)?,
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: var("DATABASE_URL"),
            billing_api_key: var("BILLING_API_KEY"),
            catalog_path: var("CATALOG_PATH"),
            reconcile_max_attempts,
            reconcile_base_delay_ms: parse(
                &var,
                "RECONCILE_BASE_DELAY_MS",
                "milliseconds",
                defaults.reconcile_base_delay_ms,
            )?,
            reconcile_max_delay_ms: parse(
                &var,
                "RECONCILE_MAX_DELAY_MS",
                "milliseconds",
                defaults.reconcile_max_delay_ms,
            )?,
            require_transaction_id: parse(
                &var,
                "REQUIRE_TRANSACTION_ID",
                "true or false",
                defaults.require_transaction_id,
            )?,
            receipt_verification,
            dev_session_token: var("DEV_SESSION_TOKEN"),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reconciler settings derived from the retry and transaction variables.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            retry: RetryPolicy::exponential(
                self.reconcile_max_attempts,
                Duration::from_millis(self.reconcile_base_delay_ms),
                Duration::from_millis(self.reconcile_max_delay_ms),
            ),
            require_transaction_id: self.require_transaction_id,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            billing_api_key: None,
            catalog_path: None,
            reconcile_max_attempts: 4,
            reconcile_base_delay_ms: 50,
            reconcile_max_delay_ms: 2000,
            require_transaction_id: true,
            receipt_verification: VerificationMode::Vendor,
            dev_session_token: None,
        }
    }
}

fn parse<T, F>(var: &F, name: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(invalid(name, expected, value)),
        },
    }
}

fn invalid(name: &'static str, expected: &'static str, value: String) -> ConfigError {
    ConfigError::Invalid {
        name,
        expected,
        value,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert!(config.require_transaction_id);
        assert_eq!(config.receipt_verification, VerificationMode::Vendor);
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.reconcile_max_attempts, 4);
        assert_eq!(config.reconcile_base_delay_ms, 50);
        assert_eq!(config.reconcile_max_delay_ms, 2000);
    }

    #[test]
    fn test_reads_overrides() {
        let config = from_vars(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/entitlements"),
            ("BILLING_API_KEY", "sk_test"),
            ("RECONCILE_MAX_ATTEMPTS", "6"),
            ("REQUIRE_TRANSACTION_ID", "false"),
            ("RECEIPT_VERIFICATION", "trust"),
        ])
        .unwrap();

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/entitlements")
        );
        assert_eq!(config.billing_api_key.as_deref(), Some("sk_test"));
        assert_eq!(config.reconcile_max_attempts, 6);
        assert!(!config.require_transaction_id);
        assert_eq!(config.receipt_verification, VerificationMode::Trust);
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = from_vars(&[("BILLING_API_KEY", "  "), ("PORT", "")]).unwrap();
        assert!(config.billing_api_key.is_none());
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            from_vars(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        assert!(matches!(
            from_vars(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid {
                name: "LOG_FORMAT",
                ..
            })
        ));
        assert!(matches!(
            from_vars(&[("REQUIRE_TRANSACTION_ID", "maybe")]),
            Err(ConfigError::Invalid {
                name: "REQUIRE_TRANSACTION_ID",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = from_vars(&[("RECONCILE_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "RECONCILE_MAX_ATTEMPTS",
                ..
            }
        ));
        assert!(from_vars(&[("RECONCILE_MAX_ATTEMPTS", "1")]).is_ok());
    }

    #[test]
    fn test_reconciler_config() {
        let config = from_vars(&[
            ("RECONCILE_MAX_ATTEMPTS", "3"),
            ("RECONCILE_BASE_DELAY_MS", "10"),
            ("RECONCILE_MAX_DELAY_MS", "100"),
        ])
        .unwrap();

        let reconciler = config.reconciler_config();
        assert_eq!(reconciler.retry.max_attempts, 3);
        assert_eq!(reconciler.retry.base_delay, Duration::from_millis(10));
        assert_eq!(reconciler.retry.max_delay, Duration::from_millis(100));
        assert!(reconciler.require_transaction_id);
    }
}
