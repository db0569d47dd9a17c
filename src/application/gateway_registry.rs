use crate::domain::errors::DomainResult;
use crate::infrastructure::adapters::{
    PayPalGatewayAdapter, RazorpayGatewayAdapter, SimulationOptions, StripeGatewayAdapter,
};
use crate::ports::payment_gateway_port::PaymentStatusResponse;
use crate::ports::PaymentGatewayPort;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// 兜底网关名称
pub const FALLBACK_GATEWAY: &str = "simulator";

/// 支持的网关种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Stripe,
    PayPal,
    Razorpay,
    Simulator,
}

impl GatewayKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "stripe" => Some(GatewayKind::Stripe),
            "paypal" => Some(GatewayKind::PayPal),
            "razorpay" => Some(GatewayKind::Razorpay),
            "simulator" => Some(GatewayKind::Simulator),
            _ => None,
        }
    }
}

/// 单个网关的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySettings {
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    pub enabled: bool,
}

impl GatewaySettings {
    pub fn new(name: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            name: name.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            enabled: true,
        }
    }
}

/// 网关健康检查结果
#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub gateway: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// 网关注册表
///
/// 构造后即存在 simulator 兜底适配器，`get_adapter` 永不失败。
pub struct GatewayRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn PaymentGatewayPort>>>,
    options: SimulationOptions,
}

impl GatewayRegistry {
    pub fn new(options: SimulationOptions) -> Self {
        let mut adapters: HashMap<String, Arc<dyn PaymentGatewayPort>> = HashMap::new();
        adapters.insert(
            FALLBACK_GATEWAY.to_string(),
            Arc::new(StripeGatewayAdapter::simulator(options)),
        );

        Self {
            adapters: RwLock::new(adapters),
            options,
        }
    }

    /// 按配置构造适配器，未知种类跳过
    pub fn initialize(&self, configs: &[GatewaySettings]) {
        for config in configs.iter().filter(|c| c.enabled) {
            if !self.register_adapter(&config.name, &config.api_key, &config.api_secret) {
                warn!("Unknown gateway type: {}, skipping", config.name);
            }
        }

        info!(
            "Gateway registry initialized: {}",
            self.available_gateways().join(", ")
        );
    }

    fn build_adapter(&self, kind: GatewayKind, api_key: &str, api_secret: &str) -> Arc<dyn PaymentGatewayPort> {
        match kind {
            GatewayKind::Stripe => Arc::new(StripeGatewayAdapter::new(api_key, api_secret, self.options)),
            GatewayKind::PayPal => Arc::new(PayPalGatewayAdapter::new(api_key, api_secret, self.options)),
            GatewayKind::Razorpay => {
                Arc::new(RazorpayGatewayAdapter::new(api_key, api_secret, self.options))
            }
            GatewayKind::Simulator => Arc::new(StripeGatewayAdapter::simulator(self.options)),
        }
    }

    /// 运行时注册网关，返回是否识别该网关种类
    pub fn register_adapter(&self, name: &str, api_key: &str, api_secret: &str) -> bool {
        let Some(kind) = GatewayKind::from_name(name) else {
            return false;
        };

        let adapter = self.build_adapter(kind, api_key, api_secret);
        self.register_instance(name, adapter);
        true
    }

    /// 注册自定义适配器实例（覆盖同名适配器）
    pub fn register_instance(&self, name: &str, adapter: Arc<dyn PaymentGatewayPort>) {
        self.adapters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_ascii_lowercase(), adapter);
        info!("Registered gateway adapter: {}", name);
    }

    /// 查找网关适配器（名称不区分大小写），未注册时返回 simulator
    pub fn get_adapter(&self, name: &str) -> Arc<dyn PaymentGatewayPort> {
        let adapters = self.adapters.read().unwrap_or_else(|e| e.into_inner());

        if let Some(adapter) = adapters.get(&name.to_ascii_lowercase()) {
            return adapter.clone();
        }

        warn!("Gateway {} not found, using {}", name, FALLBACK_GATEWAY);
        match adapters.get(FALLBACK_GATEWAY) {
            Some(adapter) => adapter.clone(),
            None => Arc::new(StripeGatewayAdapter::simulator(self.options)),
        }
    }

    pub fn available_gateways(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// 通过状态查询探测网关连通性
    pub async fn check_gateway_health(&self, name: &str) -> GatewayHealth {
        let adapter = self.get_adapter(name);
        let started = std::time::Instant::now();

        let result: DomainResult<PaymentStatusResponse> =
            adapter.get_payment_status("health_check").await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(_) => GatewayHealth {
                gateway: adapter.name().to_string(),
                healthy: true,
                latency_ms,
                error: None,
            },
            Err(e) => {
                warn!("Gateway {} health check failed: {}", name, e);
                GatewayHealth {
                    gateway: adapter.name().to_string(),
                    healthy: false,
                    latency_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_exists_without_config() {
        let registry = GatewayRegistry::new(SimulationOptions::instant());
        registry.initialize(&[]);

        assert_eq!(registry.available_gateways(), vec!["simulator".to_string()]);
        assert_eq!(registry.get_adapter("stripe").name(), "simulator");
        assert_eq!(registry.get_adapter("does-not-exist").name(), "simulator");
    }

    #[test]
    fn test_initialize_skips_unknown_and_disabled() {
        let registry = GatewayRegistry::new(SimulationOptions::instant());
        let mut disabled = GatewaySettings::new("razorpay", "rzp", "secret");
        disabled.enabled = false;

        registry.initialize(&[
            GatewaySettings::new("stripe", "sk_test", "secret"),
            GatewaySettings::new("PayPal", "client", "secret"),
            GatewaySettings::new("square", "key", "secret"),
            disabled,
        ]);

        assert_eq!(
            registry.available_gateways(),
            vec!["paypal".to_string(), "simulator".to_string(), "stripe".to_string()]
        );
        assert_eq!(registry.get_adapter("stripe").name(), "stripe");
        assert_eq!(registry.get_adapter("paypal").name(), "paypal");
        assert_eq!(registry.get_adapter("razorpay").name(), "simulator");
    }

    #[test]
    fn test_register_adapter_at_runtime() {
        let registry = GatewayRegistry::new(SimulationOptions::instant());
        assert!(registry.register_adapter("razorpay", "rzp", "secret"));
        assert!(!registry.register_adapter("square", "key", "secret"));
        assert_eq!(registry.get_adapter("razorpay").name(), "razorpay");
    }

    #[test]
    fn test_lookup_ignores_case() {
        let registry = GatewayRegistry::new(SimulationOptions::instant());
        registry.initialize(&[GatewaySettings::new("stripe", "sk_test", "secret")]);

        assert_eq!(registry.get_adapter("Stripe").name(), "stripe");
        assert_eq!(registry.get_adapter("STRIPE").name(), "stripe");
        assert_eq!(registry.get_adapter("Simulator").name(), "simulator");
    }

    #[tokio::test]
    async fn test_health_check() {
        let registry = GatewayRegistry::new(SimulationOptions::instant());
        let health = registry.check_gateway_health("simulator").await;
        assert!(health.healthy);

        let faulty = GatewayRegistry::new(SimulationOptions {
            simulate_latency: false,
            fault_rate: 1.0,
        });
        let health = faulty.check_gateway_health("simulator").await;
        assert!(!health.healthy);
        assert!(health.error.is_some());
    }
}
