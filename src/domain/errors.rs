use thiserror::Error;

/// 领域层错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 金额无效
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// 支付记录未找到
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// 交易状态错误
    #[error("Invalid payment state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// 退款金额超出可退金额
    #[error("Refund amount exceeds payment amount: requested {requested}, remaining {remaining}")]
    RefundExceedsAmount { requested: i64, remaining: i64 },

    /// 熔断器打开，调用被拒绝
    #[error("Circuit breaker is OPEN for {0}")]
    CircuitOpen(String),

    /// 支付网关传输层错误
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// 卡片不需要3DS认证
    #[error("Transaction does not require 3D Secure authentication")]
    ThreeDSNotRequired,

    /// 3DS挑战未找到
    #[error("3DS challenge not found: {0}")]
    ThreeDSChallengeNotFound(String),

    /// 3DS挑战已处理
    #[error("3DS challenge already processed: {0}")]
    ThreeDSAlreadyProcessed(String),

    /// 3DS挑战已过期
    #[error("3DS challenge expired: {0}")]
    ThreeDSExpired(String),

    /// 3DS认证失败
    #[error("3D Secure authentication failed")]
    ThreeDSAuthenticationFailed,

    /// 数据库错误
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// 缓存错误
    #[error("Cache error: {0}")]
    CacheError(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP请求错误
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<redis::RedisError> for DomainError {
    fn from(err: redis::RedisError) -> Self {
        DomainError::CacheError(err.to_string())
    }
}

impl DomainError {
    /// 是否为请求校验类错误（不产生任何持久化副作用）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DomainError::ValidationError(_) | DomainError::InvalidAmount(_)
        )
    }

    /// 是否为网关传输层故障（含熔断拒绝）
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            DomainError::GatewayError(_) | DomainError::CircuitOpen(_) | DomainError::HttpError(_)
        )
    }
}

/// 领域结果类型
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(DomainError::ValidationError("x".into()).is_validation());
        assert!(DomainError::InvalidAmount("x".into()).is_validation());
        assert!(DomainError::CircuitOpen("gateway_stripe".into()).is_transport_fault());
        assert!(!DomainError::ThreeDSAuthenticationFailed.is_transport_fault());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = DomainError::InvalidState {
            expected: "authorized".to_string(),
            actual: "captured".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid payment state: expected authorized, got captured"
        );
    }
}
