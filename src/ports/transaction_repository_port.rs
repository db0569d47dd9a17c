use crate::domain::errors::DomainResult;
use crate::domain::Transaction;
use async_trait::async_trait;
use uuid::Uuid;

/// 交易仓储端口接口
#[async_trait]
pub trait TransactionRepositoryPort: Send + Sync {
    /// 保存交易
    async fn save(&self, transaction: &Transaction) -> DomainResult<()>;

    /// 根据ID和商户查找交易
    async fn find_by_id(&self, id: Uuid, merchant_id: &str) -> DomainResult<Option<Transaction>>;

    /// 更新交易
    async fn update(&self, transaction: &Transaction) -> DomainResult<()>;
}
