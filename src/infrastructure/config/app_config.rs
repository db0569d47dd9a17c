use crate::application::{
    CircuitBreakerConfig, GatewaySettings, ThreeDSecureConfig, DEFAULT_IDEMPOTENCY_TTL,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::adapters::{SimulationOptions, WebhookConfig, WebhookEndpoint};
use std::str::FromStr;
use std::time::Duration;

/// 服务配置
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,

    /// 未设置时使用内存存储
    pub database_url: Option<String>,

    /// 未设置时使用内存缓存
    pub redis_url: Option<String>,

    pub gateways: Vec<GatewaySettings>,
    pub simulation: SimulationOptions,
    pub circuit_breaker: CircuitBreakerConfig,
    pub three_ds: ThreeDSecureConfig,
    pub three_ds_cleanup_interval: Duration,
    pub idempotency_ttl: Duration,
    pub webhooks: WebhookConfig,
}

impl AppConfig {
    /// 从进程环境变量读取
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取，未设置的键取默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DomainResult<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let breaker_defaults = CircuitBreakerConfig::default();
        let three_ds_defaults = ThreeDSecureConfig::default();
        let webhook_defaults = WebhookConfig::default();
        let simulation_defaults = SimulationOptions::default();

        let acceptance_rate = parse_or(&get, "THREEDS_ACCEPTANCE_RATE", three_ds_defaults.acceptance_rate)?;
        check_rate("THREEDS_ACCEPTANCE_RATE", acceptance_rate)?;
        let fault_rate = parse_or(&get, "GATEWAY_FAULT_RATE", simulation_defaults.fault_rate)?;
        check_rate("GATEWAY_FAULT_RATE", fault_rate)?;

        Ok(Self {
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_or(&get, "SERVER_PORT", 3000)?,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            gateways: match get("GATEWAYS") {
                Some(raw) => parse_gateways(&raw)?,
                None => Vec::new(),
            },
            simulation: SimulationOptions {
                simulate_latency: parse_or(
                    &get,
                    "GATEWAY_SIMULATE_LATENCY",
                    simulation_defaults.simulate_latency,
                )?,
                fault_rate,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parse_or(
                    &get,
                    "CIRCUIT_FAILURE_THRESHOLD",
                    breaker_defaults.failure_threshold,
                )?,
                success_threshold: parse_or(
                    &get,
                    "CIRCUIT_SUCCESS_THRESHOLD",
                    breaker_defaults.success_threshold,
                )?,
                timeout: Duration::from_millis(parse_or(
                    &get,
                    "CIRCUIT_TIMEOUT_MS",
                    breaker_defaults.timeout.as_millis() as u64,
                )?),
            },
            three_ds: ThreeDSecureConfig {
                enrolled_cards: get("THREEDS_ENROLLED_CARDS")
                    .map(|raw| split_list(&raw))
                    .unwrap_or(three_ds_defaults.enrolled_cards),
                enrolled_bins: get("THREEDS_ENROLLED_BINS")
                    .map(|raw| split_list(&raw))
                    .unwrap_or(three_ds_defaults.enrolled_bins),
                acceptance_rate,
                challenge_ttl: Duration::from_secs(parse_or(
                    &get,
                    "THREEDS_CHALLENGE_TTL_SECS",
                    three_ds_defaults.challenge_ttl.as_secs(),
                )?),
            },
            three_ds_cleanup_interval: Duration::from_secs(parse_or(
                &get,
                "THREEDS_CLEANUP_INTERVAL_SECS",
                60,
            )?),
            idempotency_ttl: Duration::from_secs(parse_or(
                &get,
                "IDEMPOTENCY_TTL_SECS",
                DEFAULT_IDEMPOTENCY_TTL.as_secs(),
            )?),
            webhooks: WebhookConfig {
                endpoints: match get("WEBHOOK_ENDPOINTS") {
                    Some(raw) => parse_webhook_endpoints(&raw)?,
                    None => Vec::new(),
                },
                retry_attempts: parse_or(&get, "WEBHOOK_RETRY_ATTEMPTS", webhook_defaults.retry_attempts)?,
                retry_delay: Duration::from_millis(parse_or(
                    &get,
                    "WEBHOOK_RETRY_DELAY_MS",
                    webhook_defaults.retry_delay.as_millis() as u64,
                )?),
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> DomainResult<T> {
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            DomainError::ConfigurationError(format!("{} has an invalid value: {}", key, raw))
        }),
        None => Ok(default),
    }
}

fn check_rate(key: &str, rate: f64) -> DomainResult<()> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(DomainError::ConfigurationError(format!(
            "{} must be between 0 and 1, got {}",
            key, rate
        )))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// `name:api_key:api_secret,...`
fn parse_gateways(raw: &str) -> DomainResult<Vec<GatewaySettings>> {
    split_list(raw)
        .iter()
        .map(|entry| {
            let parts: Vec<&str> = entry.splitn(3, ':').collect();
            match parts.as_slice() {
                [name, key, secret] if !name.is_empty() => {
                    Ok(GatewaySettings::new(name, key, secret))
                }
                _ => Err(DomainError::ConfigurationError(format!(
                    "Invalid GATEWAYS entry: {}",
                    entry
                ))),
            }
        })
        .collect()
}

/// `merchant|url|secret,...`
fn parse_webhook_endpoints(raw: &str) -> DomainResult<Vec<WebhookEndpoint>> {
    split_list(raw)
        .iter()
        .map(|entry| {
            let parts: Vec<&str> = entry.splitn(3, '|').collect();
            match parts.as_slice() {
                [merchant_id, url, secret] if !merchant_id.is_empty() && !url.is_empty() => {
                    Ok(WebhookEndpoint {
                        merchant_id: merchant_id.to_string(),
                        url: url.to_string(),
                        secret: secret.to_string(),
                    })
                }
                _ => Err(DomainError::ConfigurationError(format!(
                    "Invalid WEBHOOK_ENDPOINTS entry: {}",
                    entry
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> DomainResult<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert!(config.database_url.is_none());
        assert!(config.gateways.is_empty());
        assert_eq!(config.circuit_breaker, CircuitBreakerConfig::default());
        assert_eq!(config.three_ds, ThreeDSecureConfig::default());
        assert_eq!(config.idempotency_ttl, Duration::from_secs(86_400));
        assert_eq!(config.webhooks.retry_attempts, 3);
    }

    #[test]
    fn test_parse_lists() {
        let config = config_from(&[
            ("GATEWAYS", "stripe:sk_test_1:whsec, paypal:client:secret"),
            ("WEBHOOK_ENDPOINTS", "merchant_1|http://localhost:9000/hook|s3cret"),
            ("THREEDS_ENROLLED_BINS", "400000, 510510"),
            ("CIRCUIT_TIMEOUT_MS", "1500"),
            ("GATEWAY_SIMULATE_LATENCY", "false"),
        ])
        .unwrap();

        assert_eq!(config.gateways.len(), 2);
        assert_eq!(config.gateways[1].name, "paypal");
        assert_eq!(config.gateways[0].api_secret, "whsec");
        assert_eq!(config.webhooks.endpoints[0].url, "http://localhost:9000/hook");
        assert_eq!(config.three_ds.enrolled_bins, vec!["400000", "510510"]);
        assert_eq!(config.circuit_breaker.timeout, Duration::from_millis(1500));
        assert!(!config.simulation.simulate_latency);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("SERVER_PORT", "http")]),
            Err(DomainError::ConfigurationError(_))
        ));
        assert!(matches!(
            config_from(&[("THREEDS_ACCEPTANCE_RATE", "1.5")]),
            Err(DomainError::ConfigurationError(_))
        ));
        assert!(matches!(
            config_from(&[("GATEWAYS", "stripe")]),
            Err(DomainError::ConfigurationError(_))
        ));
    }
}
