use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/payments", post(create_payment))
        .route("/api/payments/:id", get(get_payment))
        .route("/api/payments/:id/capture", post(capture_payment))
        .route("/api/payments/:id/void", post(void_payment))
        .route("/api/payments/:id/refund", post(refund_payment))
        .route("/api/payments/:id/3ds/complete", post(complete_3ds))
        .route("/api/3ds/:challenge_id", get(three_ds_status))
        .route("/api/gateways", get(list_gateways))
        .route("/api/gateways/circuit-breakers", get(circuit_breakers))
        .route("/api/gateways/:name/health", get(gateway_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
