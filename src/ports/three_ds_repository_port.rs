use crate::domain::errors::DomainResult;
use crate::domain::ThreeDSChallenge;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 3DS挑战仓储端口接口
#[async_trait]
pub trait ThreeDSecureRepositoryPort: Send + Sync {
    async fn create(&self, challenge: &ThreeDSChallenge) -> DomainResult<()>;

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ThreeDSChallenge>>;

    async fn update(&self, challenge: &ThreeDSChallenge) -> DomainResult<()>;

    /// 将所有已过期的 REQUIRED 挑战批量置为 EXPIRED，返回影响条数
    async fn expire_overdue(&self, now: DateTime<Utc>) -> DomainResult<u64>;
}
