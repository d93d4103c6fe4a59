use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::billing::DEFAULT_TAX_RATE;

#[derive(Debug, Error)]
#[error("invalid {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub reason: String,
}

/// Runtime configuration, read from the environment (and `.env` via dotenv
/// in the binaries).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub server_host: String,

    /// Port the HTTP server binds to
    pub server_port: u16,

    /// PostgreSQL connection string; the in-memory gateway is used if unset
    pub database_url: Option<String>,

    /// HS256 secret for bearer tokens
    pub jwt_secret: String,

    /// Engine tuning
    pub engine: EngineConfig,

    /// How often the reconciliation worker polls
    pub worker_poll_interval: Duration,
}

/// Settings of the lifecycle and billing engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Tax rate for new estimates
    pub tax_rate: Decimal,

    /// Upper bound on any single gateway call
    pub persistence_timeout: Duration,

    /// How far a payment may exceed the balance before it is refused
    pub overpayment_tolerance: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tax_rate: DEFAULT_TAX_RATE,
            persistence_timeout: Duration::from_secs(5),
            overpayment_tolerance: Decimal::ZERO,
        }
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError {
            name,
            reason: format!("{:?}: {}", raw, e),
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Reads the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let tax_rate: Decimal = parse_var("TAX_RATE", defaults.tax_rate)?;
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
            return Err(ConfigError {
                name: "TAX_RATE",
                reason: format!("{} is outside 0..=1", tax_rate),
            });
        }

        let tolerance: Decimal =
            parse_var("OVERPAYMENT_TOLERANCE", defaults.overpayment_tolerance)?;
        if tolerance < Decimal::ZERO {
            return Err(ConfigError {
                name: "OVERPAYMENT_TOLERANCE",
                reason: format!("{} is negative", tolerance),
            });
        }

        let timeout_ms: u64 = parse_var("PERSISTENCE_TIMEOUT_MS", 5_000)?;
        if timeout_ms == 0 {
            return Err(ConfigError {
                name: "PERSISTENCE_TIMEOUT_MS",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 3000)?,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string()),
            engine: EngineConfig {
                tax_rate,
                persistence_timeout: Duration::from_millis(timeout_ms),
                overpayment_tolerance: tolerance,
            },
            worker_poll_interval: Duration::from_secs(parse_var(
                "WORKER_POLL_INTERVAL_SECONDS",
                60,
            )?),
        })
    }
}
