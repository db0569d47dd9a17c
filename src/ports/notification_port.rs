use serde::{Deserialize, Serialize};
use std::fmt;

/// 通知事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    PaymentCaptured,
    PaymentAuthorized,
    PaymentRequiresAction,
    PaymentFailed,
    PaymentRefunded,
    PaymentVoided,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationType::PaymentCaptured => write!(f, "PAYMENT_CAPTURED"),
            NotificationType::PaymentAuthorized => write!(f, "PAYMENT_AUTHORIZED"),
            NotificationType::PaymentRequiresAction => write!(f, "PAYMENT_REQUIRES_ACTION"),
            NotificationType::PaymentFailed => write!(f, "PAYMENT_FAILED"),
            NotificationType::PaymentRefunded => write!(f, "PAYMENT_REFUNDED"),
            NotificationType::PaymentVoided => write!(f, "PAYMENT_VOIDED"),
        }
    }
}

/// 商户通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub merchant_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub data: serde_json::Value,
}

/// 通知端口接口
///
/// 发送即返回，不等待投递结果。
pub trait NotificationPort: Send + Sync {
    fn notify(&self, merchant_id: &str, notification_type: NotificationType, data: serde_json::Value);
}
