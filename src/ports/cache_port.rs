use crate::domain::errors::DomainResult;
use async_trait::async_trait;
use std::time::Duration;

/// 缓存端口接口
#[async_trait]
pub trait CachePort: Send + Sync {
    async fn get(&self, key: &str) -> DomainResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DomainResult<()>;

    async fn delete(&self, key: &str) -> DomainResult<()>;
}
