//! Configuration module for parts-invoicing-service.

use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

use crate::services::reconciler::default_tax_rate;

#[derive(Debug, Clone)]
pub struct InvoicingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store_backend: StoreBackend,
    /// Required for [`StoreBackend::Postgres`].
    pub database: Option<DatabaseConfig>,
    /// Sales tax applied to taxable parts, as a fraction (`0.05` is 5%).
    pub tax_rate: Decimal,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown STORE_BACKEND '{}', expected 'postgres' or 'memory'",
                other
            ))),
        }
    }
}

impl InvoicingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let store_backend = match env::var("STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::default(),
        };

        let database = match (store_backend, env::var("DATABASE_URL")) {
            (_, Ok(url)) => Some(DatabaseConfig {
                url,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            }),
            (StoreBackend::Postgres, Err(_)) => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required"
                )))
            }
            (StoreBackend::Memory, Err(_)) => None,
        };

        let tax_rate = match env::var("INVOICE_TAX_RATE") {
            Ok(value) => parse_tax_rate(&value)?,
            Err(_) => default_tax_rate(),
        };

        let config = Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "parts-invoicing-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            store_backend,
            database,
            tax_rate,
        };
        config.grpc_port()?;
        Ok(config)
    }

    /// gRPC binds the port after the HTTP one; `0` (ephemeral) stays `0`.
    pub fn grpc_port(&self) -> Result<u16, AppError> {
        match self.common.port {
            0 => Ok(0),
            port => port.checked_add(1).ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "APP__PORT {} leaves no port for gRPC",
                    port
                ))
            }),
        }
    }
}

fn parse_tax_rate(value: &str) -> Result<Decimal, AppError> {
    let rate = Decimal::from_str(value.trim()).map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Invalid INVOICE_TAX_RATE '{}': {}", value, e))
    })?;
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "INVOICE_TAX_RATE must be a fraction between 0 and 1, got {}",
            rate
        )));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!(" postgres ".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    fn with_port(port: u16) -> InvoicingConfig {
        InvoicingConfig {
            common: core_config::Config { port },
            service_name: "parts-invoicing-service".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            store_backend: StoreBackend::Memory,
            database: None,
            tax_rate: default_tax_rate(),
        }
    }

    #[test]
    fn grpc_port_follows_http_port() {
        assert_eq!(with_port(8080).grpc_port().unwrap(), 8081);
        assert_eq!(with_port(0).grpc_port().unwrap(), 0);
        assert!(matches!(
            with_port(u16::MAX).grpc_port(),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn tax_rate_must_be_a_fraction() {
        assert_eq!(parse_tax_rate("0.07").unwrap(), Decimal::new(7, 2));
        assert!(parse_tax_rate("7").is_err());
        assert!(parse_tax_rate("-0.01").is_err());
        assert!(parse_tax_rate("seven").is_err());
    }
}
