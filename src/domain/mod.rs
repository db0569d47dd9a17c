pub mod circuit_breaker;
pub mod entities;
pub mod errors;
pub mod events;
pub mod three_ds;
pub mod value_objects;

pub use circuit_breaker::{CircuitBreakerState, CircuitState};
pub use entities::Transaction;
pub use errors::{DomainError, DomainResult};
pub use events::*;
pub use three_ds::{AuthenticationValues, ThreeDSChallenge, ThreeDSStatus};
pub use value_objects::{CardDetails, CardNetwork, Currency, TransactionStatus, TransactionType};
