use crate::domain::errors::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 支付聚合类型
pub const PAYMENT_AGGREGATE: &str = "Payment";

/// 交易聚合类型
pub const TRANSACTION_AGGREGATE: &str = "Transaction";

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PaymentInitiated,
    PaymentAuthorized,
    PaymentCaptured,
    PaymentDeclined,
    PaymentFailed,
    PaymentRefunded,
    PaymentCancelled,
    ThreeDsRequired,
    ThreeDsAuthenticated,
    ThreeDsFailed,
    TransactionCreated,
    TransactionUpdated,
    TransactionCompleted,
    TransactionRefunded,
    /// 快照，保留类型
    Snapshot,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PaymentInitiated => "PAYMENT_INITIATED",
            EventType::PaymentAuthorized => "PAYMENT_AUTHORIZED",
            EventType::PaymentCaptured => "PAYMENT_CAPTURED",
            EventType::PaymentDeclined => "PAYMENT_DECLINED",
            EventType::PaymentFailed => "PAYMENT_FAILED",
            EventType::PaymentRefunded => "PAYMENT_REFUNDED",
            EventType::PaymentCancelled => "PAYMENT_CANCELLED",
            EventType::ThreeDsRequired => "THREE_DS_REQUIRED",
            EventType::ThreeDsAuthenticated => "THREE_DS_AUTHENTICATED",
            EventType::ThreeDsFailed => "THREE_DS_FAILED",
            EventType::TransactionCreated => "TRANSACTION_CREATED",
            EventType::TransactionUpdated => "TRANSACTION_UPDATED",
            EventType::TransactionCompleted => "TRANSACTION_COMPLETED",
            EventType::TransactionRefunded => "TRANSACTION_REFUNDED",
            EventType::Snapshot => "SNAPSHOT",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| DomainError::InternalError(format!("Unknown event type: {}", s)))
    }
}

/// 事件载荷trait
pub trait EventPayload: Serialize {
    fn event_type(&self) -> EventType;
    fn aggregate_type(&self) -> &'static str {
        PAYMENT_AGGREGATE
    }
}

/// 领域事件（事件存储中的一条不可变记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    /// 聚合内单调递增的版本号，由调用方提供
    pub version: i64,
    pub metadata: serde_json::Value,
    pub causation_id: Option<String>,
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        event_type: EventType,
        event_data: serde_json::Value,
        version: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            event_type: event_type.as_str().to_string(),
            event_data,
            version,
            metadata: serde_json::Value::Object(Default::default()),
            causation_id: None,
            correlation_id: None,
            created_at: Utc::now(),
        }
    }

    /// 从类型化载荷构造事件
    pub fn from_payload<P: EventPayload>(
        aggregate_id: impl Into<String>,
        version: i64,
        payload: &P,
    ) -> DomainResult<Self> {
        Ok(Self::new(
            aggregate_id,
            payload.aggregate_type(),
            payload.event_type(),
            serde_json::to_value(payload)?,
            version,
        ))
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn is_snapshot(&self) -> bool {
        self.event_type == EventType::Snapshot.as_str()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.aggregate_id.is_empty() || self.aggregate_type.is_empty() {
            return Err(DomainError::ValidationError(
                "Event aggregate id and type are required".to_string(),
            ));
        }
        if self.version < 1 {
            return Err(DomainError::ValidationError(format!(
                "Event version must be >= 1, got {}",
                self.version
            )));
        }
        Ok(())
    }
}

/// 事件查询条件
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub aggregate_id: Option<String>,
    pub aggregate_type: Option<String>,
    pub event_type: Option<String>,
    pub from_version: Option<i64>,
    pub to_version: Option<i64>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn for_aggregate(aggregate_id: impl Into<String>, aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_id: Some(aggregate_id.into()),
            aggregate_type: Some(aggregate_type.into()),
            ..Default::default()
        }
    }

    pub fn limit_or_default(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn matches(&self, event: &DomainEvent) -> bool {
        self.aggregate_id
            .as_ref()
            .is_none_or(|id| *id == event.aggregate_id)
            && self
                .aggregate_type
                .as_ref()
                .is_none_or(|t| *t == event.aggregate_type)
            && self
                .event_type
                .as_ref()
                .is_none_or(|t| *t == event.event_type)
            && self.from_version.is_none_or(|v| event.version >= v)
            && self.to_version.is_none_or(|v| event.version <= v)
    }
}

/// 支付发起事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiated {
    pub amount: i64,
    pub currency: String,
    /// 掩码后的卡号
    pub card_number: String,
    pub gateway: String,
    pub merchant_id: String,
}

impl EventPayload for PaymentInitiated {
    fn event_type(&self) -> EventType {
        EventType::PaymentInitiated
    }
}

/// 支付授权/请款成功事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSucceeded {
    #[serde(skip)]
    pub captured: bool,
    pub amount: i64,
    pub authorization_code: Option<String>,
    pub gateway_transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eci: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cavv: Option<String>,
}

impl EventPayload for PaymentSucceeded {
    fn event_type(&self) -> EventType {
        if self.captured {
            EventType::PaymentCaptured
        } else {
            EventType::PaymentAuthorized
        }
    }
}

/// 支付失败事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub error_code: String,
    pub error_message: String,
}

impl EventPayload for PaymentFailed {
    fn event_type(&self) -> EventType {
        EventType::PaymentFailed
    }
}

/// 支付撤销事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCancelled {
    pub previous_status: String,
}

impl EventPayload for PaymentCancelled {
    fn event_type(&self) -> EventType {
        EventType::PaymentCancelled
    }
}

/// 退款事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefunded {
    pub refund_id: Uuid,
    pub amount: i64,
    pub total_refunded: i64,
    pub gateway_refund_id: String,
}

impl EventPayload for PaymentRefunded {
    fn event_type(&self) -> EventType {
        EventType::PaymentRefunded
    }
}

/// 需要3DS认证事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeDSRequired {
    pub challenge_id: String,
}

impl EventPayload for ThreeDSRequired {
    fn event_type(&self) -> EventType {
        EventType::ThreeDsRequired
    }
}

/// 3DS认证结果事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeDSCompleted {
    #[serde(skip)]
    pub authenticated: bool,
    pub challenge_id: String,
    pub eci: Option<String>,
}

impl EventPayload for ThreeDSCompleted {
    fn event_type(&self) -> EventType {
        if self.authenticated {
            EventType::ThreeDsAuthenticated
        } else {
            EventType::ThreeDsFailed
        }
    }
}

/// 交易生命周期事件（Transaction 聚合）
#[derive(Debug, Clone, Serialize)]
pub struct TransactionLifecycle {
    #[serde(skip)]
    pub kind: EventType,
    pub previous_status: Option<String>,
    pub new_status: String,
    pub gateway: String,
}

impl EventPayload for TransactionLifecycle {
    fn event_type(&self) -> EventType {
        self.kind
    }

    fn aggregate_type(&self) -> &'static str {
        TRANSACTION_AGGREGATE
    }
}
