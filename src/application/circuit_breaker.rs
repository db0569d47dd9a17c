use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::{CircuitBreakerState, CircuitState};
use crate::ports::CircuitBreakerStatePort;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// 熔断器参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    /// 连续失败多少次后打开
    pub failure_threshold: u32,
    /// 半开状态下连续成功多少次后关闭
    pub success_threshold: u32,
    /// 打开后多久允许探测
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// 熔断器统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    pub service_name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl From<&CircuitBreakerState> for CircuitBreakerStats {
    fn from(state: &CircuitBreakerState) -> Self {
        Self {
            service_name: state.service_name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_at: state.last_failure_at,
            next_attempt_at: state.next_attempt_at,
        }
    }
}

/// 单个服务的熔断器
///
/// 只负责放行或拒绝，不做重试。状态变化后尽力持久化，持久化失败只记日志。
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    store: Arc<dyn CircuitBreakerStatePort>,
    state: Mutex<CircuitBreakerState>,
    loaded: OnceCell<()>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        store: Arc<dyn CircuitBreakerStatePort>,
    ) -> Self {
        let name = name.into();
        Self {
            state: Mutex::new(CircuitBreakerState::closed(name.clone())),
            name,
            config,
            store,
            loaded: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 在熔断保护下执行操作
    pub async fn execute<T, F, Fut>(&self, operation: F) -> DomainResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        self.ensure_loaded().await;

        let (before, after) = self.update(|state, now| {
            if state.state != CircuitState::Open {
                return Ok(());
            }
            if !state.probe_allowed(now) {
                return Err(());
            }
            state.state = CircuitState::HalfOpen;
            state.success_count = 0;
            Ok(())
        });

        match after {
            Err(()) => {
                warn!("Circuit breaker {}: rejecting call, circuit is OPEN", self.name);
                return Err(DomainError::CircuitOpen(self.name.clone()));
            }
            Ok(snapshot) => {
                if !before.same_as(&snapshot) {
                    info!("Circuit breaker {}: attempting half-open state", self.name);
                    self.persist(&snapshot).await;
                }
            }
        }

        let result = operation().await;

        match &result {
            Ok(_) => self.on_success().await,
            Err(e) => self.on_failure(e).await,
        }

        result
    }

    async fn on_success(&self) {
        let threshold = self.config.success_threshold;
        let (before, after) = self.update(|state, _| {
            state.failure_count = 0;
            state.last_failure_at = None;

            if state.state == CircuitState::HalfOpen {
                state.success_count += 1;
                if state.success_count >= threshold {
                    state.state = CircuitState::Closed;
                    state.success_count = 0;
                    state.next_attempt_at = None;
                }
            }
            Ok::<(), ()>(())
        });

        if let Ok(snapshot) = after {
            if before.state == CircuitState::HalfOpen && snapshot.state == CircuitState::Closed {
                info!("Circuit breaker {}: closing circuit", self.name);
            }
            if !before.same_as(&snapshot) {
                self.persist(&snapshot).await;
            }
        }
    }

    async fn on_failure(&self, cause: &DomainError) {
        let threshold = self.config.failure_threshold;
        let timeout = chrono::Duration::from_std(self.config.timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        let (before, after) = self.update(|state, now| {
            state.failure_count += 1;
            state.last_failure_at = Some(now);

            if state.state == CircuitState::HalfOpen {
                state.state = CircuitState::Open;
                state.failure_count = 0;
                state.success_count = 0;
                state.next_attempt_at = Some(now + timeout);
            } else if state.failure_count >= threshold {
                state.state = CircuitState::Open;
                state.next_attempt_at = Some(now + timeout);
            }
            Ok::<(), ()>(())
        });

        if let Ok(snapshot) = after {
            warn!(
                "Circuit breaker {}: failure recorded ({}/{}): {}",
                self.name, snapshot.failure_count, threshold, cause
            );
            if before.state != CircuitState::Open && snapshot.state == CircuitState::Open {
                error!("Circuit breaker {}: opening circuit", self.name);
            }
            if !before.same_as(&snapshot) {
                self.persist(&snapshot).await;
            }
        }
    }

    /// 当前统计
    pub async fn stats(&self) -> CircuitBreakerStats {
        self.ensure_loaded().await;
        CircuitBreakerStats::from(&self.snapshot())
    }

    /// 手动关闭熔断器
    pub async fn reset(&self) {
        self.ensure_loaded().await;
        info!("Circuit breaker {}: manual reset", self.name);

        let (_, after) = self.update(|state, _| {
            state.state = CircuitState::Closed;
            state.failure_count = 0;
            state.success_count = 0;
            state.last_failure_at = None;
            state.next_attempt_at = None;
            Ok::<(), ()>(())
        });

        if let Ok(snapshot) = after {
            self.persist(&snapshot).await;
        }
    }

    fn snapshot(&self) -> CircuitBreakerState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 在锁内修改状态，返回修改前快照与修改结果（修改后快照或拒绝）
    fn update<E>(
        &self,
        apply: impl FnOnce(&mut CircuitBreakerState, DateTime<Utc>) -> Result<(), E>,
    ) -> (CircuitBreakerState, Result<CircuitBreakerState, E>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.clone();
        let now = Utc::now();

        let outcome = apply(&mut *state, now).map(|_| {
            if !before.same_as(&*state) {
                state.updated_at = now;
            }
            state.clone()
        });

        (before, outcome)
    }

    /// 首次使用前加载持久化状态
    async fn ensure_loaded(&self) {
        self.loaded
            .get_or_init(|| async {
                match self.store.load(&self.name).await {
                    Ok(Some(saved)) => {
                        info!(
                            "Circuit breaker {}: state loaded - {}",
                            self.name, saved.state
                        );
                        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = saved;
                    }
                    Ok(None) => {}
                    Err(e) => error!(
                        "Failed to load circuit breaker state for {}: {}",
                        self.name, e
                    ),
                }
            })
            .await;
    }

    async fn persist(&self, state: &CircuitBreakerState) {
        if let Err(e) = self.store.save(state).await {
            error!(
                "Failed to persist circuit breaker state for {}: {}",
                self.name, e
            );
        }
    }
}

/// 熔断器注册表：每个服务名一个实例，首次使用时创建
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    store: Arc<dyn CircuitBreakerStatePort>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, store: Arc<dyn CircuitBreakerStatePort>) -> Self {
        Self {
            config,
            store,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_breaker(&self, service_name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self
            .breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(service_name)
        {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(service_name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    service_name,
                    self.config,
                    self.store.clone(),
                ))
            })
            .clone()
    }

    /// 所有已创建熔断器的统计，按名称排序
    pub async fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        let mut stats = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            stats.push(breaker.stats().await);
        }
        stats.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::InMemoryCircuitBreakerStateStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> DomainResult<()> {
        breaker
            .execute(|| async { Err::<(), _>(DomainError::GatewayError("boom".into())) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> DomainResult<()> {
        breaker.execute(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_rejects_without_calling() {
        let store = Arc::new(InMemoryCircuitBreakerStateStore::new());
        let breaker = CircuitBreaker::new("gateway_test", config(60_000), store.clone());

        for _ in 0..3 {
            assert!(matches!(fail(&breaker).await, Err(DomainError::GatewayError(_))));
        }
        assert_eq!(breaker.stats().await.state, CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DomainError::CircuitOpen(name)) if name == "gateway_test"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let persisted = store.load("gateway_test").await.unwrap().unwrap();
        assert_eq!(persisted.state, CircuitState::Open);
        assert!(persisted.next_attempt_at.is_some());
    }

    #[tokio::test]
    async fn test_half_open_recovery() {
        let store = Arc::new(InMemoryCircuitBreakerStateStore::new());
        let breaker = CircuitBreaker::new("gateway_test", config(30), store);

        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.stats().await.state, CircuitState::HalfOpen);

        succeed(&breaker).await.unwrap();
        let stats = breaker.stats().await;
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let store = Arc::new(InMemoryCircuitBreakerStateStore::new());
        let breaker = CircuitBreaker::new("gateway_test", config(30), store);

        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let _ = fail(&breaker).await;
        let stats = breaker.stats().await;
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.failure_count, 0);
        assert!(matches!(
            succeed(&breaker).await,
            Err(DomainError::CircuitOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failures_when_closed() {
        let store = Arc::new(InMemoryCircuitBreakerStateStore::new());
        let breaker = CircuitBreaker::new("gateway_test", config(60_000), store);

        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;

        let stats = breaker.stats().await;
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 2);
    }

    #[tokio::test]
    async fn test_restart_resumes_persisted_state() {
        let store: Arc<dyn CircuitBreakerStatePort> =
            Arc::new(InMemoryCircuitBreakerStateStore::new());

        let first = CircuitBreaker::new("gateway_test", config(60_000), store.clone());
        for _ in 0..3 {
            let _ = fail(&first).await;
        }

        let restarted = CircuitBreaker::new("gateway_test", config(60_000), store);
        assert!(matches!(
            succeed(&restarted).await,
            Err(DomainError::CircuitOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_reset() {
        let store = Arc::new(InMemoryCircuitBreakerStateStore::new());
        let breaker = CircuitBreaker::new("gateway_test", config(60_000), store);
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }

        breaker.reset().await;
        assert_eq!(breaker.stats().await.state, CircuitState::Closed);
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test]
    async fn test_registry_reuses_instances() {
        let registry = CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default(),
            Arc::new(InMemoryCircuitBreakerStateStore::new()),
        );

        let a = registry.get_breaker("gateway_stripe");
        let b = registry.get_breaker("gateway_stripe");
        let c = registry.get_breaker("gateway_paypal");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let stats = registry.all_stats().await;
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].service_name, "gateway_paypal");
    }
}
