//! Application configuration loaded from environment variables.

use common::{Money, OrderStatus};
use domain::{DEFAULT_MARKER, OrderPolicy, ReconcilerConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL` — PostgreSQL URL; the in-memory store is used when unset
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `SHIPPING_FEE` — flat fee per order (default: `30000`)
/// - `TOTAL_TOLERANCE` — accepted declared-total gap (default: `0.01`)
/// - `COD_INITIAL_STATUS` — `PENDING` or `PROCESSING` (default: `PENDING`)
/// - `PAYMENT_MARKER` — token before the order id in transfers (default: `DONHANG`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub shipping_fee: Money,
    pub total_tolerance: Money,
    pub cod_initial_status: OrderStatus,
    pub payment_marker: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let log_format = match var("LOG_FORMAT") {
            None => defaults.log_format,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" | "text" => LogFormat::Pretty,
                _ => return Err(invalid("LOG_FORMAT", value, "expected pretty or json")),
            },
        };

        let cod_initial_status = match var("COD_INITIAL_STATUS") {
            None => defaults.cod_initial_status,
            Some(value) => match value.parse::<OrderStatus>() {
                Ok(status @ (OrderStatus::Pending | OrderStatus::Processing)) => status,
                _ => {
                    return Err(invalid(
                        "COD_INITIAL_STATUS",
                        value,
                        "expected PENDING or PROCESSING",
                    ));
                }
            },
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", var("PORT"), defaults.port)?,
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                var("DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
            )?,
            shipping_fee: parse_money("SHIPPING_FEE", var("SHIPPING_FEE"), defaults.shipping_fee)?,
            total_tolerance: parse_money(
                "TOTAL_TOLERANCE",
                var("TOTAL_TOLERANCE"),
                defaults.total_tolerance,
            )?,
            cod_initial_status,
            payment_marker: var("PAYMENT_MARKER")
                .map(|marker| marker.trim().to_string())
                .unwrap_or(defaults.payment_marker),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn order_policy(&self) -> OrderPolicy {
        OrderPolicy {
            shipping_fee: self.shipping_fee,
            total_tolerance: self.total_tolerance,
            cod_initial_status: self.cod_initial_status,
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            marker: self.payment_marker.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let policy = OrderPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            shipping_fee: policy.shipping_fee,
            total_tolerance: policy.total_tolerance,
            cod_initial_status: policy.cod_initial_status,
            payment_marker: DEFAULT_MARKER.to_string(),
        }
    }
}

fn invalid(var: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        reason: reason.into(),
    }
}

fn parse_var<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, value.clone(), e.to_string())),
    }
}

fn parse_money(
    var: &'static str,
    value: Option<String>,
    default: Money,
) -> Result<Money, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let amount: Money = raw
        .parse()
        .map_err(|_| invalid(var, raw.clone(), "expected a decimal amount"))?;
    if amount.amount().is_sign_negative() {
        return Err(invalid(var, raw, "must not be negative"));
    }
    Ok(amount)
}
