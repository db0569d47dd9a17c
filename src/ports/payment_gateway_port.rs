use crate::domain::errors::DomainResult;
use crate::domain::value_objects::CardDetails;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 网关支付请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPaymentRequest {
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub card: CardDetails,
    pub description: Option<String>,
    pub require_3ds: bool,
    pub merchant_id: String,
    pub customer_id: Option<String>,
}

/// 网关拒绝信息（错误码为各网关自有词汇）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayDecline {
    pub code: String,
    pub message: String,
}

/// 网关支付响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPaymentResponse {
    pub success: bool,
    pub transaction_id: String,
    pub authorization_code: Option<String>,
    /// 网关原始状态字符串
    pub status: String,
    pub decline: Option<GatewayDecline>,
    pub three_d_secure_required: bool,
    pub three_d_secure_url: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl GatewayPaymentResponse {
    pub fn approved(
        transaction_id: String,
        authorization_code: String,
        status: &str,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            success: true,
            transaction_id,
            authorization_code: Some(authorization_code),
            status: status.to_string(),
            decline: None,
            three_d_secure_required: false,
            three_d_secure_url: None,
            metadata,
        }
    }

    pub fn declined(transaction_id: String, status: &str, code: &str, message: &str) -> Self {
        Self {
            success: false,
            transaction_id,
            authorization_code: None,
            status: status.to_string(),
            decline: Some(GatewayDecline {
                code: code.to_string(),
                message: message.to_string(),
            }),
            three_d_secure_required: false,
            three_d_secure_url: None,
            metadata: HashMap::new(),
        }
    }

    pub fn requires_action(transaction_id: String, url: String) -> Self {
        Self {
            success: false,
            transaction_id,
            authorization_code: None,
            status: "requires_action".to_string(),
            decline: None,
            three_d_secure_required: true,
            three_d_secure_url: Some(url),
            metadata: HashMap::new(),
        }
    }
}

/// 请款响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub success: bool,
    pub transaction_id: String,
    pub captured_amount: i64,
    pub status: String,
}

/// 退款响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResponse {
    pub success: bool,
    pub refund_id: String,
    pub amount: i64,
    pub status: String,
    pub error_message: Option<String>,
}

/// 查询状态响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub transaction_id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
}

/// 3DS校验数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreeDSecureData {
    pub transaction_id: String,
    pub pa_res: Option<String>,
    pub md: Option<String>,
    pub authentication_value: Option<String>,
}

/// 3DS校验结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeDSecureResponse {
    pub success: bool,
    pub authenticated: bool,
    pub eci: Option<String>,
    pub cavv: Option<String>,
    pub xid: Option<String>,
    pub status: String,
}

/// 支付网关端口接口
///
/// 业务拒绝通过 `success: false` 返回，只有传输层故障才返回 `Err`。
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// 网关名称
    fn name(&self) -> &str;

    /// 发起支付
    async fn process_payment(
        &self,
        request: GatewayPaymentRequest,
    ) -> DomainResult<GatewayPaymentResponse>;

    /// 请款
    async fn capture_payment(&self, transaction_id: &str, amount: i64)
    -> DomainResult<CaptureResponse>;

    /// 退款
    async fn refund_payment(&self, transaction_id: &str, amount: i64)
    -> DomainResult<RefundResponse>;

    /// 查询支付状态
    async fn get_payment_status(&self, transaction_id: &str) -> DomainResult<PaymentStatusResponse>;

    /// 3DS校验
    async fn verify_3d_secure(&self, data: ThreeDSecureData) -> DomainResult<ThreeDSecureResponse>;
}
