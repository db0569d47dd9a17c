use crate::domain::errors::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// 正常放行
    Closed,
    /// 拒绝所有调用
    Open,
    /// 探测中
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

impl FromStr for CircuitState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLOSED" => Ok(CircuitState::Closed),
            "OPEN" => Ok(CircuitState::Open),
            "HALF_OPEN" => Ok(CircuitState::HalfOpen),
            other => Err(DomainError::InternalError(format!(
                "Invalid circuit state: {}",
                other
            ))),
        }
    }
}

/// 熔断器持久化状态，每个受保护服务一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub service_name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CircuitBreakerState {
    pub fn closed(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            next_attempt_at: None,
            updated_at: Utc::now(),
        }
    }

    /// OPEN 状态下是否已到允许探测的时间
    pub fn probe_allowed(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_none_or(|at| now >= at)
    }

    /// 与另一快照比较时忽略更新时间
    pub fn same_as(&self, other: &CircuitBreakerState) -> bool {
        self.state == other.state
            && self.failure_count == other.failure_count
            && self.success_count == other.success_count
            && self.last_failure_at == other.last_failure_at
            && self.next_attempt_at == other.next_attempt_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_state_str() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!("OPEN".parse::<CircuitState>().unwrap(), CircuitState::Open);
        assert!("open".parse::<CircuitState>().is_err());
    }

    #[test]
    fn test_probe_allowed() {
        let now = Utc::now();
        let mut state = CircuitBreakerState::closed("gateway_stripe");
        assert!(state.probe_allowed(now));

        state.next_attempt_at = Some(now + Duration::seconds(30));
        assert!(!state.probe_allowed(now));
        assert!(state.probe_allowed(now + Duration::seconds(30)));
    }
}
