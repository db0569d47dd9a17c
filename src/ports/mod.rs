pub mod cache_port;
pub mod circuit_breaker_state_port;
pub mod event_store_port;
pub mod notification_port;
pub mod payment_gateway_port;
pub mod three_ds_repository_port;
pub mod transaction_repository_port;

pub use cache_port::CachePort;
pub use circuit_breaker_state_port::CircuitBreakerStatePort;
pub use event_store_port::EventStorePort;
pub use notification_port::{Notification, NotificationPort, NotificationType};
pub use payment_gateway_port::PaymentGatewayPort;
pub use three_ds_repository_port::ThreeDSecureRepositoryPort;
pub use transaction_repository_port::TransactionRepositoryPort;
