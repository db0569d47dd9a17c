use crate::domain::value_objects::CardDetails;
use crate::domain::Transaction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_capture() -> bool {
    true
}

/// 支付方式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodInput {
    /// 目前只支持 card
    #[serde(rename = "type", default = "PaymentMethodInput::default_type")]
    pub method_type: String,

    pub card: Option<CardDetails>,
}

impl PaymentMethodInput {
    fn default_type() -> String {
        "card".to_string()
    }

    pub fn card(card: CardDetails) -> Self {
        Self {
            method_type: Self::default_type(),
            card: Some(card),
        }
    }
}

/// 创建支付请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    /// 金额（最小货币单位）
    pub amount: i64,

    /// 币种，缺省为 USD
    #[serde(default)]
    pub currency: Option<String>,

    pub payment_method: Option<PaymentMethodInput>,

    pub customer_id: Option<String>,

    pub description: Option<String>,

    /// 是否立即请款
    #[serde(default = "default_capture")]
    pub capture: bool,

    /// 幂等键，也可放在 metadata.idempotency_key
    pub idempotency_key: Option<String>,

    /// 网关名称，缺省为 simulator
    pub gateway: Option<String>,

    #[serde(default, alias = "require_3d_secure")]
    pub require_3ds: bool,

    pub metadata: Option<serde_json::Value>,
}

impl Default for CreatePaymentRequest {
    fn default() -> Self {
        Self {
            amount: 0,
            currency: None,
            payment_method: None,
            customer_id: None,
            description: None,
            capture: true,
            idempotency_key: None,
            gateway: None,
            require_3ds: false,
            metadata: None,
        }
    }
}

impl CreatePaymentRequest {
    /// 显式字段优先，其次取 metadata.idempotency_key
    pub fn resolved_idempotency_key(&self) -> Option<String> {
        self.idempotency_key
            .clone()
            .or_else(|| {
                self.metadata
                    .as_ref()
                    .and_then(|m| m.get("idempotency_key"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .filter(|key| !key.is_empty())
    }

    pub fn card(&self) -> Option<&CardDetails> {
        self.payment_method.as_ref().and_then(|m| m.card.as_ref())
    }
}

/// 请款请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub amount: Option<i64>,
}

/// 退款请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

/// 完成3DS认证请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complete3DSRequest {
    pub challenge_id: String,
    #[serde(alias = "paRes")]
    pub pa_res: String,
}

/// 错误详情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentError {
    pub code: String,
    pub message: String,
}

/// 卡片摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSummary {
    pub last4: String,
    pub network: Option<String>,
}

/// 调用方需要执行的下一步操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub challenge_url: String,
    pub acs_url: String,
    pub challenge_id: String,
}

impl NextAction {
    pub fn three_ds(challenge_id: String, challenge_url: String, acs_url: String) -> Self {
        Self {
            action_type: "3ds_authentication".to_string(),
            challenge_url,
            acs_url,
            challenge_id,
        }
    }
}

/// 支付响应（对外的交易表示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: Uuid,

    pub object: String,

    pub amount: i64,

    pub currency: String,

    /// 小写状态
    pub status: String,

    /// 小写类型
    #[serde(rename = "type")]
    pub transaction_type: String,

    pub description: Option<String>,

    pub gateway: String,

    pub authorization_code: Option<String>,

    pub captured_amount: Option<i64>,

    pub refunded_amount: i64,

    pub error: Option<PaymentError>,

    pub card: Option<CardSummary>,

    pub parent_id: Option<Uuid>,

    pub next_action: Option<NextAction>,

    pub metadata: serde_json::Value,

    /// 创建时间（Unix 秒）
    pub created: i64,

    /// 更新时间（Unix 秒）
    pub updated: i64,
}

impl PaymentResponse {
    pub fn with_next_action(mut self, next_action: NextAction) -> Self {
        self.next_action = Some(next_action);
        self
    }
}

impl From<&Transaction> for PaymentResponse {
    fn from(tx: &Transaction) -> Self {
        let error = tx.error_code.as_ref().map(|code| PaymentError {
            code: code.clone(),
            message: tx.error_message.clone().unwrap_or_default(),
        });

        let card = tx.card_last4.as_ref().map(|last4| CardSummary {
            last4: last4.clone(),
            network: tx.card_network.clone(),
        });

        Self {
            id: tx.id,
            object: "payment".to_string(),
            amount: tx.amount,
            currency: tx.currency.to_string(),
            status: tx.status.to_string(),
            transaction_type: tx.transaction_type.to_string(),
            description: tx.description.clone(),
            gateway: tx.gateway.clone(),
            authorization_code: tx.authorization_code.clone(),
            captured_amount: tx.captured_amount,
            refunded_amount: tx.refunded_amount,
            error,
            card,
            parent_id: tx.parent_id,
            next_action: None,
            metadata: tx.metadata.clone(),
            created: tx.created_at.timestamp(),
            updated: tx.updated_at.timestamp(),
        }
    }
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: CreatePaymentRequest = serde_json::from_value(json!({
            "amount": 1000,
            "payment_method": {
                "card": {
                    "number": "4242424242424242",
                    "exp_month": 12,
                    "exp_year": 2030,
                    "cvv": "123"
                }
            },
            "require_3d_secure": true
        }))
        .unwrap();

        assert!(request.capture);
        assert!(request.require_3ds);
        assert!(request.gateway.is_none());
        assert_eq!(request.payment_method.as_ref().unwrap().method_type, "card");
        assert_eq!(request.card().unwrap().last4(), "4242");
    }

    #[test]
    fn test_idempotency_key_from_metadata() {
        let request = CreatePaymentRequest {
            metadata: Some(json!({ "idempotency_key": "order-42" })),
            ..Default::default()
        };
        assert_eq!(request.resolved_idempotency_key().as_deref(), Some("order-42"));

        let explicit = CreatePaymentRequest {
            idempotency_key: Some("explicit".to_string()),
            ..request
        };
        assert_eq!(explicit.resolved_idempotency_key().as_deref(), Some("explicit"));
    }

    #[test]
    fn test_response_shape() {
        let mut tx = Transaction::new_payment(
            Uuid::new_v4(),
            "merchant_1".to_string(),
            1000,
            Currency::default(),
            "simulator".to_string(),
        )
        .unwrap();
        tx.mark_as_failed("card_declined".to_string(), "Your card was declined".to_string())
            .unwrap();

        let value = serde_json::to_value(PaymentResponse::from(&tx)).unwrap();
        assert_eq!(value["object"], "payment");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["type"], "payment");
        assert_eq!(value["error"]["code"], "card_declined");
        assert!(value["captured_amount"].is_null());
        assert_eq!(value["created"], tx.created_at.timestamp());
    }
}
