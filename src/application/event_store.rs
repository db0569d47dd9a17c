use crate::domain::errors::DomainResult;
use crate::domain::events::{DomainEvent, EventFilter, EventType};
use crate::ports::EventStorePort;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// 事件日志服务
#[derive(Clone)]
pub struct EventStoreService {
    store: Arc<dyn EventStorePort>,
}

impl EventStoreService {
    pub fn new(store: Arc<dyn EventStorePort>) -> Self {
        Self { store }
    }

    /// 追加单个事件（版本由调用方提供）
    pub async fn append_event(&self, event: &DomainEvent) -> DomainResult<Uuid> {
        let id = self.store.append(event).await?;
        debug!(
            "Event {} v{} appended for {} {}",
            event.event_type, event.version, event.aggregate_type, event.aggregate_id
        );
        Ok(id)
    }

    /// 原子追加一批事件
    pub async fn append_events(&self, events: &[DomainEvent]) -> DomainResult<Vec<Uuid>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        self.store.append_all(events).await
    }

    pub async fn get_events(&self, filter: &EventFilter) -> DomainResult<Vec<DomainEvent>> {
        self.store.query(filter).await
    }

    /// 聚合最新版本，无事件时为 0
    pub async fn get_latest_version(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> DomainResult<i64> {
        self.store.latest_version(aggregate_id, aggregate_type).await
    }

    /// 按版本顺序取回聚合的完整历史
    pub async fn replay_events(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> DomainResult<Vec<DomainEvent>> {
        let filter = EventFilter {
            limit: Some(usize::MAX),
            ..EventFilter::for_aggregate(aggregate_id, aggregate_type)
        };
        self.store.query(&filter).await
    }

    /// 以普通事件的形式写入快照
    pub async fn create_snapshot(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        state: serde_json::Value,
    ) -> DomainResult<Uuid> {
        let version = self.get_latest_version(aggregate_id, aggregate_type).await? + 1;
        let event = DomainEvent::new(
            aggregate_id,
            aggregate_type,
            EventType::Snapshot,
            state,
            version,
        )
        .with_metadata(json!({ "is_snapshot": true }));

        let id = self.store.append(&event).await?;
        info!(
            "Snapshot created for {} {} at version {}",
            aggregate_type, aggregate_id, version
        );
        Ok(id)
    }

    /// 某聚合类型的事件流，按创建时间升序
    pub async fn get_event_stream(
        &self,
        aggregate_type: &str,
        from: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<DomainEvent>> {
        self.store.stream(aggregate_type, from).await
    }

    pub async fn get_event_statistics(&self) -> DomainResult<HashMap<String, u64>> {
        self.store.statistics().await
    }
}
