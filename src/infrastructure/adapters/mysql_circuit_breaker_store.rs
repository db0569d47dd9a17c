use crate::domain::errors::DomainResult;
use crate::domain::CircuitBreakerState;
use crate::ports::CircuitBreakerStatePort;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};
use std::sync::Arc;
use tracing::debug;

/// MySQL熔断器状态存储
#[derive(Clone)]
pub struct MySqlCircuitBreakerStateStore {
    pool: Arc<Pool<MySql>>,
}

impl MySqlCircuitBreakerStateStore {
    pub fn new(pool: Arc<Pool<MySql>>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CircuitBreakerStatePort for MySqlCircuitBreakerStateStore {
    async fn load(&self, service_name: &str) -> DomainResult<Option<CircuitBreakerState>> {
        let query = r#"
            SELECT service_name, state, failure_count, success_count,
                   last_failure_at, next_attempt_at, updated_at
            FROM circuit_breaker_states
            WHERE service_name = ?
        "#;

        let row = sqlx::query_as::<_, CircuitBreakerRow>(query)
            .bind(service_name)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.map(CircuitBreakerRow::into_state).transpose()
    }

    async fn save(&self, state: &CircuitBreakerState) -> DomainResult<()> {
        let query = r#"
            INSERT INTO circuit_breaker_states (
                service_name, state, failure_count, success_count,
                last_failure_at, next_attempt_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                state = VALUES(state),
                failure_count = VALUES(failure_count),
                success_count = VALUES(success_count),
                last_failure_at = VALUES(last_failure_at),
                next_attempt_at = VALUES(next_attempt_at),
                updated_at = VALUES(updated_at)
        "#;

        sqlx::query(query)
            .bind(&state.service_name)
            .bind(state.state.to_string())
            .bind(state.failure_count)
            .bind(state.success_count)
            .bind(state.last_failure_at)
            .bind(state.next_attempt_at)
            .bind(state.updated_at)
            .execute(self.pool.as_ref())
            .await?;

        debug!("Circuit breaker state saved: {} {}", state.service_name, state.state);
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CircuitBreakerRow {
    service_name: String,
    state: String,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl CircuitBreakerRow {
    fn into_state(self) -> DomainResult<CircuitBreakerState> {
        Ok(CircuitBreakerState {
            service_name: self.service_name,
            state: self.state.parse()?,
            failure_count: self.failure_count,
            success_count: self.success_count,
            last_failure_at: self.last_failure_at,
            next_attempt_at: self.next_attempt_at,
            updated_at: self.updated_at,
        })
    }
}
