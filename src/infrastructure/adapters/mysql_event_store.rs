use crate::domain::errors::DomainResult;
use crate::domain::events::{DomainEvent, EventFilter};
use crate::ports::EventStorePort;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool, QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT id, aggregate_id, aggregate_type, event_type, event_data, version,
           metadata, causation_id, correlation_id, created_at
    FROM domain_events
"#;

const INSERT_EVENT: &str = r#"
    INSERT INTO domain_events (
        id, aggregate_id, aggregate_type, event_type, event_data, version,
        metadata, causation_id, correlation_id, created_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// MySQL事件存储实现（只追加）
#[derive(Clone)]
pub struct MySqlEventStore {
    pool: Arc<Pool<MySql>>,
}

impl MySqlEventStore {
    pub fn new(pool: Arc<Pool<MySql>>) -> Self {
        Self { pool }
    }
}

fn insert_query(event: &DomainEvent) -> sqlx::query::Query<'_, MySql, sqlx::mysql::MySqlArguments> {
    sqlx::query(INSERT_EVENT)
        .bind(event.id)
        .bind(&event.aggregate_id)
        .bind(&event.aggregate_type)
        .bind(&event.event_type)
        .bind(event.event_data.to_string())
        .bind(event.version)
        .bind(event.metadata.to_string())
        .bind(&event.causation_id)
        .bind(&event.correlation_id)
        .bind(event.created_at)
}

#[async_trait]
impl EventStorePort for MySqlEventStore {
    async fn append(&self, event: &DomainEvent) -> DomainResult<Uuid> {
        event.validate()?;
        insert_query(event).execute(self.pool.as_ref()).await?;

        debug!(
            "Event appended: {} v{} for {}",
            event.event_type, event.version, event.aggregate_id
        );
        Ok(event.id)
    }

    /// 一个数据库事务内写入整批事件
    async fn append_all(&self, events: &[DomainEvent]) -> DomainResult<Vec<Uuid>> {
        for event in events {
            event.validate()?;
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            insert_query(event).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!("Appended batch of {} events", events.len());
        Ok(events.iter().map(|e| e.id).collect())
    }

    async fn query(&self, filter: &EventFilter) -> DomainResult<Vec<DomainEvent>> {
        let mut builder = QueryBuilder::<MySql>::new(SELECT_COLUMNS);
        builder.push(" WHERE 1 = 1");

        if let Some(aggregate_id) = &filter.aggregate_id {
            builder.push(" AND aggregate_id = ").push_bind(aggregate_id.clone());
        }
        if let Some(aggregate_type) = &filter.aggregate_type {
            builder
                .push(" AND aggregate_type = ")
                .push_bind(aggregate_type.clone());
        }
        if let Some(event_type) = &filter.event_type {
            builder.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if let Some(from_version) = filter.from_version {
            builder.push(" AND version >= ").push_bind(from_version);
        }
        if let Some(to_version) = filter.to_version {
            builder.push(" AND version <= ").push_bind(to_version);
        }

        builder
            .push(" ORDER BY version ASC, created_at ASC LIMIT ")
            .push_bind(filter.limit_or_default().min(i64::MAX as usize) as i64);

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn latest_version(&self, aggregate_id: &str, aggregate_type: &str) -> DomainResult<i64> {
        let version = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(version) FROM domain_events WHERE aggregate_id = ? AND aggregate_type = ?",
        )
        .bind(aggregate_id)
        .bind(aggregate_type)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(version.unwrap_or(0))
    }

    async fn stream(
        &self,
        aggregate_type: &str,
        from: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<DomainEvent>> {
        let mut builder = QueryBuilder::<MySql>::new(SELECT_COLUMNS);
        builder
            .push(" WHERE aggregate_type = ")
            .push_bind(aggregate_type.to_string());
        if let Some(from) = from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        builder.push(" ORDER BY created_at ASC");

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn statistics(&self) -> DomainResult<HashMap<String, u64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT event_type, COUNT(*) FROM domain_events GROUP BY event_type",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(event_type, count)| (event_type, count.max(0) as u64))
            .collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    aggregate_id: String,
    aggregate_type: String,
    event_type: String,
    event_data: String,
    version: i64,
    metadata: Option<String>,
    causation_id: Option<String>,
    correlation_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn into_event(self) -> DomainResult<DomainEvent> {
        let metadata = match self.metadata.as_deref() {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => serde_json::Value::Object(Default::default()),
        };

        Ok(DomainEvent {
            id: self.id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            event_type: self.event_type,
            event_data: serde_json::from_str(&self.event_data)?,
            version: self.version,
            metadata,
            causation_id: self.causation_id,
            correlation_id: self.correlation_id,
            created_at: self.created_at,
        })
    }
}
