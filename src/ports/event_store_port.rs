use crate::domain::errors::DomainResult;
use crate::domain::events::{DomainEvent, EventFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// 事件存储端口接口（只追加，不提供更新和删除）
#[async_trait]
pub trait EventStorePort: Send + Sync {
    /// 追加单个事件，返回存储ID
    async fn append(&self, event: &DomainEvent) -> DomainResult<Uuid>;

    /// 原子追加一批事件：全部成功或全部不可见
    async fn append_all(&self, events: &[DomainEvent]) -> DomainResult<Vec<Uuid>>;

    /// 按条件查询，按版本升序
    async fn query(&self, filter: &EventFilter) -> DomainResult<Vec<DomainEvent>>;

    /// 聚合的最新版本，无事件时为 0
    async fn latest_version(&self, aggregate_id: &str, aggregate_type: &str) -> DomainResult<i64>;

    /// 某聚合类型的事件流，按创建时间升序
    async fn stream(
        &self,
        aggregate_type: &str,
        from: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<DomainEvent>>;

    /// 按事件类型统计数量
    async fn statistics(&self) -> DomainResult<HashMap<String, u64>>;
}
