use crate::application::{
    CaptureRequest, Complete3DSRequest, CreatePaymentRequest, ErrorResponse, GatewayRegistry,
    PaymentService, RefundRequest,
};
use crate::domain::errors::DomainError;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 商户ID请求头
pub const MERCHANT_HEADER: &str = "X-Merchant-Id";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub payment_service: Arc<PaymentService>,
    pub gateways: Arc<GatewayRegistry>,
}

fn status_for(e: &DomainError) -> StatusCode {
    match e {
        DomainError::ValidationError(_) | DomainError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        DomainError::PaymentNotFound(_) | DomainError::ThreeDSChallengeNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DomainError::InvalidState { .. }
        | DomainError::RefundExceedsAmount { .. }
        | DomainError::ThreeDSAlreadyProcessed(_)
        | DomainError::ThreeDSExpired(_)
        | DomainError::ThreeDSNotRequired => StatusCode::CONFLICT,
        DomainError::ThreeDSAuthenticationFailed => StatusCode::PAYMENT_REQUIRED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn code_for(e: &DomainError) -> &'static str {
    match e {
        DomainError::ValidationError(_) => "VALIDATION_ERROR",
        DomainError::InvalidAmount(_) => "INVALID_AMOUNT",
        DomainError::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
        DomainError::ThreeDSChallengeNotFound(_) => "CHALLENGE_NOT_FOUND",
        DomainError::InvalidState { .. } => "INVALID_STATE",
        DomainError::RefundExceedsAmount { .. } => "REFUND_EXCEEDS_AMOUNT",
        DomainError::ThreeDSAlreadyProcessed(_) => "CHALLENGE_ALREADY_PROCESSED",
        DomainError::ThreeDSExpired(_) => "CHALLENGE_EXPIRED",
        DomainError::ThreeDSNotRequired => "THREE_DS_NOT_REQUIRED",
        DomainError::ThreeDSAuthenticationFailed => "3DS_AUTHENTICATION_FAILED",
        DomainError::CircuitOpen(_) | DomainError::GatewayError(_) | DomainError::HttpError(_) => {
            "GATEWAY_ERROR"
        }
        _ => "INTERNAL_ERROR",
    }
}

/// 领域错误转为HTTP错误响应
pub fn api_error(operation: &str, e: DomainError) -> ApiError {
    let status = status_for(&e);
    if status.is_server_error() {
        error!("{} failed: {}", operation, e);
    } else {
        warn!("{} rejected: {}", operation, e);
    }
    (status, Json(ErrorResponse::new(code_for(&e), e.to_string())))
}

fn merchant_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(MERCHANT_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "MISSING_MERCHANT",
                    format!("Missing {} header", MERCHANT_HEADER),
                )),
            )
        })
}

/// 创建支付
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    info!(
        "Received payment creation request from {}: {}",
        merchant_id, request.amount
    );

    state
        .payment_service
        .create_payment(&merchant_id, request)
        .await
        .map(|response| (StatusCode::CREATED, Json(response)))
        .map_err(|e| api_error("Payment creation", e))
}

/// 查询支付
pub async fn get_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let merchant_id = merchant_id(&headers)?;

    state
        .payment_service
        .get_payment(id, &merchant_id)
        .await
        .map(Json)
        .map_err(|e| api_error("Payment query", e))
}

/// 请款
pub async fn capture_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Option<Json<CaptureRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    info!("Received capture request for payment {}", id);

    state
        .payment_service
        .capture_payment(id, &merchant_id, request.amount)
        .await
        .map(Json)
        .map_err(|e| api_error("Capture", e))
}

/// 撤销授权
pub async fn void_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    info!("Received void request for payment {}", id);

    state
        .payment_service
        .void_payment(id, &merchant_id)
        .await
        .map(Json)
        .map_err(|e| api_error("Void", e))
}

/// 退款
pub async fn refund_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Option<Json<RefundRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    info!("Received refund request for payment {}", id);

    state
        .payment_service
        .refund_payment(id, &merchant_id, request.amount, request.reason)
        .await
        .map(|response| (StatusCode::CREATED, Json(response)))
        .map_err(|e| api_error("Refund", e))
}

/// 完成3DS认证
pub async fn complete_3ds(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<Complete3DSRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    info!(
        "Received 3DS completion for payment {} (challenge {})",
        id, request.challenge_id
    );

    state
        .payment_service
        .complete_3ds_authentication(id, &merchant_id, &request.challenge_id, &request.pa_res)
        .await
        .map(Json)
        .map_err(|e| api_error("3DS completion", e))
}

/// 查询3DS挑战状态
pub async fn three_ds_status(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .payment_service
        .three_ds()
        .get_authentication_status(&challenge_id)
        .await
        .map(Json)
        .map_err(|e| api_error("3DS status", e))
}

/// 已注册网关
pub async fn list_gateways(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "gateways": state.gateways.available_gateways() }))
}

pub async fn gateway_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let health = state.gateways.check_gateway_health(&name).await;
    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// 熔断器状态
pub async fn circuit_breakers(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.payment_service.breakers().all_stats().await)
}

/// 健康检查
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
