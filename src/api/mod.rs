pub mod handlers;
pub mod routes;

pub use handlers::{AppState, MERCHANT_HEADER};
pub use routes::create_router;
