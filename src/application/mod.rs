pub mod circuit_breaker;
pub mod dto;
pub mod event_store;
pub mod gateway_registry;
pub mod payment_service;
pub mod three_ds_service;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats,
};
pub use dto::*;
pub use event_store::EventStoreService;
pub use gateway_registry::{GatewayHealth, GatewayRegistry, GatewaySettings, FALLBACK_GATEWAY};
pub use payment_service::{PaymentService, PaymentServiceDeps, DEFAULT_IDEMPOTENCY_TTL};
pub use three_ds_service::{ThreeDSecureConfig, ThreeDSecureService};
