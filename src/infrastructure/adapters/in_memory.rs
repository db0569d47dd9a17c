use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::events::{DomainEvent, EventFilter};
use crate::domain::{CircuitBreakerState, ThreeDSChallenge, Transaction};
use crate::ports::{
    CachePort, CircuitBreakerStatePort, EventStorePort, ThreeDSecureRepositoryPort,
    TransactionRepositoryPort,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// 内存交易仓储（开发与测试用）
#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<HashMap<Uuid, Transaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepositoryPort for InMemoryTransactionRepository {
    async fn save(&self, transaction: &Transaction) -> DomainResult<()> {
        self.transactions
            .write()
            .await
            .insert(transaction.id, transaction.clone());
        debug!("Transaction saved: {}", transaction.id);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid, merchant_id: &str) -> DomainResult<Option<Transaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .get(&id)
            .filter(|tx| tx.merchant_id == merchant_id)
            .cloned())
    }

    async fn update(&self, transaction: &Transaction) -> DomainResult<()> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&transaction.id) {
            Some(existing) => {
                *existing = transaction.clone();
                debug!("Transaction updated: {}", transaction.id);
                Ok(())
            }
            None => Err(DomainError::PaymentNotFound(transaction.id.to_string())),
        }
    }
}

/// 内存事件存储
///
/// 只追加；批量追加在同一把写锁内完成，读者看不到半批事件。
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<DomainEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStorePort for InMemoryEventStore {
    async fn append(&self, event: &DomainEvent) -> DomainResult<Uuid> {
        event.validate()?;
        self.events.write().await.push(event.clone());
        Ok(event.id)
    }

    async fn append_all(&self, events: &[DomainEvent]) -> DomainResult<Vec<Uuid>> {
        for event in events {
            event.validate()?;
        }

        let mut store = self.events.write().await;
        store.extend(events.iter().cloned());
        Ok(events.iter().map(|e| e.id).collect())
    }

    async fn query(&self, filter: &EventFilter) -> DomainResult<Vec<DomainEvent>> {
        let mut matched: Vec<DomainEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        // 稳定排序，同版本保持写入顺序
        matched.sort_by_key(|e| e.version);
        matched.truncate(filter.limit_or_default());
        Ok(matched)
    }

    async fn latest_version(&self, aggregate_id: &str, aggregate_type: &str) -> DomainResult<i64> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.aggregate_type == aggregate_type)
            .map(|e| e.version)
            .max()
            .unwrap_or(0))
    }

    async fn stream(
        &self,
        aggregate_type: &str,
        from: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<DomainEvent>> {
        let mut matched: Vec<DomainEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.aggregate_type == aggregate_type)
            .filter(|e| from.is_none_or(|t| e.created_at >= t))
            .cloned()
            .collect();

        matched.sort_by_key(|e| e.created_at);
        Ok(matched)
    }

    async fn statistics(&self) -> DomainResult<HashMap<String, u64>> {
        let mut stats = HashMap::new();
        for event in self.events.read().await.iter() {
            *stats.entry(event.event_type.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

/// 内存熔断器状态存储
#[derive(Default)]
pub struct InMemoryCircuitBreakerStateStore {
    states: RwLock<HashMap<String, CircuitBreakerState>>,
}

impl InMemoryCircuitBreakerStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CircuitBreakerStatePort for InMemoryCircuitBreakerStateStore {
    async fn load(&self, service_name: &str) -> DomainResult<Option<CircuitBreakerState>> {
        Ok(self.states.read().await.get(service_name).cloned())
    }

    async fn save(&self, state: &CircuitBreakerState) -> DomainResult<()> {
        self.states
            .write()
            .await
            .insert(state.service_name.clone(), state.clone());
        Ok(())
    }
}

/// 内存3DS挑战仓储
#[derive(Default)]
pub struct InMemoryThreeDSRepository {
    challenges: RwLock<HashMap<String, ThreeDSChallenge>>,
}

impl InMemoryThreeDSRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreeDSecureRepositoryPort for InMemoryThreeDSRepository {
    async fn create(&self, challenge: &ThreeDSChallenge) -> DomainResult<()> {
        self.challenges
            .write()
            .await
            .insert(challenge.id.clone(), challenge.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ThreeDSChallenge>> {
        Ok(self.challenges.read().await.get(id).cloned())
    }

    async fn update(&self, challenge: &ThreeDSChallenge) -> DomainResult<()> {
        let mut challenges = self.challenges.write().await;
        match challenges.get_mut(&challenge.id) {
            Some(existing) => {
                *existing = challenge.clone();
                Ok(())
            }
            None => Err(DomainError::ThreeDSChallengeNotFound(challenge.id.clone())),
        }
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let mut challenges = self.challenges.write().await;
        let expired = challenges
            .values_mut()
            .map(|c| c.expire_if_due(now))
            .filter(|changed| *changed)
            .count();
        Ok(expired as u64)
    }
}

/// 带过期时间的内存缓存
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CachePort for InMemoryCache {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires_at)) if *expires_at > now => return Ok(Some(value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // 过期条目惰性清理
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DomainResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
