pub mod in_memory;
pub mod mysql_circuit_breaker_store;
pub mod mysql_event_store;
pub mod mysql_three_ds_repository;
pub mod mysql_transaction_repository;
pub mod paypal_gateway_adapter;
pub mod razorpay_gateway_adapter;
pub mod redis_cache;
pub mod simulation;
pub mod stripe_gateway_adapter;
pub mod webhook_notifier;

pub use in_memory::{
    InMemoryCache, InMemoryCircuitBreakerStateStore, InMemoryEventStore,
    InMemoryThreeDSRepository, InMemoryTransactionRepository,
};
pub use mysql_circuit_breaker_store::MySqlCircuitBreakerStateStore;
pub use mysql_event_store::MySqlEventStore;
pub use mysql_three_ds_repository::MySqlThreeDSecureRepository;
pub use mysql_transaction_repository::MySqlTransactionRepository;
pub use paypal_gateway_adapter::PayPalGatewayAdapter;
pub use razorpay_gateway_adapter::RazorpayGatewayAdapter;
pub use redis_cache::RedisCache;
pub use simulation::SimulationOptions;
pub use stripe_gateway_adapter::StripeGatewayAdapter;
pub use webhook_notifier::{WebhookConfig, WebhookEndpoint, WebhookNotifier};
