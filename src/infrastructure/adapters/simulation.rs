use crate::domain::errors::{DomainError, DomainResult};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// 模拟行为开关（来自配置）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    /// 是否模拟网络延迟
    pub simulate_latency: bool,
    /// 模拟传输层故障的概率（0.0 - 1.0）
    pub fault_rate: f64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            simulate_latency: true,
            fault_rate: 0.0,
        }
    }
}

impl SimulationOptions {
    /// 测试用：无延迟、无故障
    pub fn instant() -> Self {
        Self {
            simulate_latency: false,
            fault_rate: 0.0,
        }
    }
}

/// 单个网关的网络特征
#[derive(Debug, Clone, Copy)]
pub struct SimulationProfile {
    min_delay_ms: u64,
    max_delay_ms: u64,
    options: SimulationOptions,
}

impl SimulationProfile {
    pub fn new(min_delay_ms: u64, max_delay_ms: u64, options: SimulationOptions) -> Self {
        Self {
            min_delay_ms,
            max_delay_ms: max_delay_ms.max(min_delay_ms),
            options,
        }
    }

    /// 模拟一次网络往返；按故障率返回传输层错误
    pub async fn round_trip(&self, gateway: &str) -> DomainResult<()> {
        let (delay_ms, fault) = {
            let mut rng = rand::thread_rng();
            let delay = rng.gen_range(self.min_delay_ms..=self.max_delay_ms);
            let fault = rng.gen_bool(self.options.fault_rate.clamp(0.0, 1.0));
            (delay, fault)
        };

        if self.options.simulate_latency {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if fault {
            warn!("Simulated transport fault on gateway {}", gateway);
            return Err(DomainError::GatewayError(format!(
                "{} connection reset after {}ms",
                gateway, delay_ms
            )));
        }

        Ok(())
    }
}

/// 生成大写字母数字随机码
pub fn random_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect()
}

/// 网关侧交易号
pub fn gateway_reference(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        chrono::Utc::now().timestamp_millis(),
        random_code(6).to_ascii_lowercase()
    )
}

/// 截取凭证前缀用于日志
pub fn key_prefix(key: &str) -> &str {
    key.get(..8.min(key.len())).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_code() {
        let code = random_code(13);
        assert_eq!(code.len(), 13);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_key_prefix() {
        assert_eq!(key_prefix("sk_test_123456"), "sk_test_");
        assert_eq!(key_prefix("abc"), "abc");
    }

    #[tokio::test]
    async fn test_round_trip_fault_rate() {
        let always_fail = SimulationProfile::new(
            0,
            0,
            SimulationOptions {
                simulate_latency: false,
                fault_rate: 1.0,
            },
        );
        assert!(matches!(
            always_fail.round_trip("stripe").await,
            Err(DomainError::GatewayError(_))
        ));

        let never_fail = SimulationProfile::new(0, 0, SimulationOptions::instant());
        assert!(never_fail.round_trip("stripe").await.is_ok());
    }
}
