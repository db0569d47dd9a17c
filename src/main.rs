use payment_gateway::api::{self, AppState};
use payment_gateway::application::{
    CircuitBreakerRegistry, EventStoreService, GatewayRegistry, PaymentService,
    PaymentServiceDeps, ThreeDSecureService,
};
use payment_gateway::infrastructure::{
    AppConfig, InMemoryCache, InMemoryCircuitBreakerStateStore, InMemoryEventStore,
    InMemoryThreeDSRepository, InMemoryTransactionRepository, MySqlCircuitBreakerStateStore,
    MySqlEventStore, MySqlThreeDSecureRepository, MySqlTransactionRepository, RedisCache,
    WebhookNotifier,
};
use payment_gateway::ports::{
    CachePort, CircuitBreakerStatePort, EventStorePort, ThreeDSecureRepositoryPort,
    TransactionRepositoryPort,
};
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct Stores {
    transactions: Arc<dyn TransactionRepositoryPort>,
    events: Arc<dyn EventStorePort>,
    breakers: Arc<dyn CircuitBreakerStatePort>,
    three_ds: Arc<dyn ThreeDSecureRepositoryPort>,
}

async fn build_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL not set, using in-memory storage");
        return Ok(Stores {
            transactions: Arc::new(InMemoryTransactionRepository::new()),
            events: Arc::new(InMemoryEventStore::new()),
            breakers: Arc::new(InMemoryCircuitBreakerStateStore::new()),
            three_ds: Arc::new(InMemoryThreeDSRepository::new()),
        });
    };

    info!("Connecting to database...");
    let pool = Arc::new(MySqlPool::connect(database_url).await?);
    info!("Database connected successfully");

    Ok(Stores {
        transactions: Arc::new(MySqlTransactionRepository::new(pool.clone())),
        events: Arc::new(MySqlEventStore::new(pool.clone())),
        breakers: Arc::new(MySqlCircuitBreakerStateStore::new(pool.clone())),
        three_ds: Arc::new(MySqlThreeDSecureRepository::new(pool)),
    })
}

async fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn CachePort>> {
    match &config.redis_url {
        Some(url) => {
            info!("Connecting to redis...");
            Ok(Arc::new(RedisCache::connect(url).await?))
        }
        None => {
            warn!("REDIS_URL not set, using in-memory idempotency cache");
            Ok(Arc::new(InMemoryCache::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting Payment Gateway...");

    let config = AppConfig::from_env()?;
    let stores = build_stores(&config).await?;
    let cache = build_cache(&config).await?;

    // 网关与熔断器
    let gateways = Arc::new(GatewayRegistry::new(config.simulation));
    gateways.initialize(&config.gateways);
    let breakers = Arc::new(CircuitBreakerRegistry::new(
        config.circuit_breaker,
        stores.breakers,
    ));

    let three_ds = Arc::new(ThreeDSecureService::new(
        stores.three_ds,
        config.three_ds.clone(),
    ));

    // 通知
    let notifier = Arc::new(WebhookNotifier::new(config.webhooks.clone()));
    notifier.start().await;

    let payment_service = Arc::new(PaymentService::new(PaymentServiceDeps {
        transactions: stores.transactions,
        events: EventStoreService::new(stores.events),
        gateways: gateways.clone(),
        breakers,
        three_ds: three_ds.clone(),
        cache,
        notifier: notifier.clone(),
        idempotency_ttl: config.idempotency_ttl,
    }));

    // 定期清理过期的3DS挑战
    let cleanup_interval = config.three_ds_cleanup_interval.max(Duration::from_secs(1));
    let cleanup = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_interval);
        loop {
            ticker.tick().await;
            three_ds.cleanup_expired_challenges().await;
        }
    });

    let app = api::create_router(AppState {
        payment_service,
        gateways,
    });

    let addr = config.bind_address();
    info!("Server listening on {}", addr);
    info!("Available endpoints:");
    info!("  GET  /health - Health check");
    info!("  POST /api/payments - Create payment");
    info!("  GET  /api/payments/:id - Query payment");
    info!("  POST /api/payments/:id/capture - Capture payment");
    info!("  POST /api/payments/:id/void - Void payment");
    info!("  POST /api/payments/:id/refund - Refund payment");
    info!("  POST /api/payments/:id/3ds/complete - Complete 3DS authentication");
    info!("  GET  /api/gateways/circuit-breakers - Circuit breaker states");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    notifier.shutdown().await;
    info!("Payment Gateway stopped");

    Ok(())
}
