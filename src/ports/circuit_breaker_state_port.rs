use crate::domain::errors::DomainResult;
use crate::domain::CircuitBreakerState;
use async_trait::async_trait;

/// 熔断器状态存储端口接口
#[async_trait]
pub trait CircuitBreakerStatePort: Send + Sync {
    async fn load(&self, service_name: &str) -> DomainResult<Option<CircuitBreakerState>>;

    /// 按服务名插入或更新
    async fn save(&self, state: &CircuitBreakerState) -> DomainResult<()>;
}
