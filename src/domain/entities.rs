use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{Currency, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 交易实体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// 交易ID（同时作为事件流的聚合ID）
    pub id: Uuid,

    /// 商户ID
    pub merchant_id: String,

    /// 客户ID
    pub customer_id: Option<String>,

    /// 父交易ID（退款交易指向原支付）
    pub parent_id: Option<Uuid>,

    /// 金额（最小货币单位）
    pub amount: i64,

    /// 币种
    pub currency: Currency,

    /// 交易状态
    pub status: TransactionStatus,

    /// 交易类型
    pub transaction_type: TransactionType,

    /// 描述
    pub description: Option<String>,

    /// 处理该交易的网关名称
    pub gateway: String,

    /// 网关侧交易号
    pub gateway_transaction_id: Option<String>,

    /// 授权码
    pub authorization_code: Option<String>,

    /// 错误码（网关原样返回，不做统一映射）
    pub error_code: Option<String>,

    /// 错误信息
    pub error_message: Option<String>,

    /// 已请款金额
    pub captured_amount: Option<i64>,

    /// 累计退款金额
    pub refunded_amount: i64,

    /// 卡号后四位
    pub card_last4: Option<String>,

    /// 卡组织
    pub card_network: Option<String>,

    /// 3DS挑战ID
    pub three_ds_challenge_id: Option<String>,

    /// 幂等键
    pub idempotency_key: Option<String>,

    /// 附加数据
    pub metadata: serde_json::Value,

    /// 创建时间
    pub created_at: DateTime<Utc>,

    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// 创建新的支付交易（初始状态为 pending）
    pub fn new_payment(
        id: Uuid,
        merchant_id: String,
        amount: i64,
        currency: Currency,
        gateway: String,
    ) -> DomainResult<Self> {
        if amount <= 0 {
            return Err(DomainError::InvalidAmount(
                "Amount must be greater than 0".to_string(),
            ));
        }

        if merchant_id.is_empty() {
            return Err(DomainError::ValidationError(
                "Merchant id is required".to_string(),
            ));
        }

        let now = Utc::now();

        Ok(Self {
            id,
            merchant_id,
            customer_id: None,
            parent_id: None,
            amount,
            currency,
            status: TransactionStatus::Pending,
            transaction_type: TransactionType::Payment,
            description: None,
            gateway,
            gateway_transaction_id: None,
            authorization_code: None,
            error_code: None,
            error_message: None,
            captured_amount: None,
            refunded_amount: 0,
            card_last4: None,
            card_network: None,
            three_ds_challenge_id: None,
            idempotency_key: None,
            metadata: serde_json::Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        })
    }

    /// 为原支付创建退款交易
    pub fn new_refund(parent: &Transaction, amount: i64, reason: Option<String>) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            merchant_id: parent.merchant_id.clone(),
            customer_id: parent.customer_id.clone(),
            parent_id: Some(parent.id),
            amount,
            currency: parent.currency.clone(),
            status: TransactionStatus::Captured,
            transaction_type: TransactionType::Refund,
            description: Some(reason.unwrap_or_else(|| "Refund".to_string())),
            gateway: parent.gateway.clone(),
            gateway_transaction_id: None,
            authorization_code: None,
            error_code: None,
            error_message: None,
            captured_amount: None,
            refunded_amount: 0,
            card_last4: parent.card_last4.clone(),
            card_network: parent.card_network.clone(),
            three_ds_challenge_id: None,
            idempotency_key: None,
            metadata: serde_json::Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_status(&self, allowed: &[TransactionStatus]) -> DomainResult<()> {
        if allowed.contains(&self.status) {
            return Ok(());
        }

        Err(DomainError::InvalidState {
            expected: allowed
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" or "),
            actual: self.status.to_string(),
        })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// 标记为已授权
    pub fn mark_as_authorized(
        &mut self,
        authorization_code: Option<String>,
        gateway_transaction_id: String,
    ) -> DomainResult<()> {
        self.ensure_status(&[TransactionStatus::Pending])?;

        self.status = TransactionStatus::Authorized;
        self.authorization_code = authorization_code;
        self.gateway_transaction_id = Some(gateway_transaction_id);
        self.touch();
        Ok(())
    }

    /// 标记为已请款（创建时即请款）
    pub fn mark_as_captured(
        &mut self,
        authorization_code: Option<String>,
        gateway_transaction_id: String,
    ) -> DomainResult<()> {
        self.ensure_status(&[TransactionStatus::Pending])?;

        self.status = TransactionStatus::Captured;
        self.authorization_code = authorization_code;
        self.gateway_transaction_id = Some(gateway_transaction_id);
        self.captured_amount = Some(self.amount);
        self.touch();
        Ok(())
    }

    /// 标记为等待3DS认证
    pub fn mark_as_requires_action(
        &mut self,
        challenge_id: String,
        gateway_transaction_id: String,
    ) -> DomainResult<()> {
        self.ensure_status(&[TransactionStatus::Pending])?;

        self.status = TransactionStatus::RequiresAction;
        self.three_ds_challenge_id = Some(challenge_id);
        self.gateway_transaction_id = Some(gateway_transaction_id);
        self.touch();
        Ok(())
    }

    /// 标记为失败
    pub fn mark_as_failed(&mut self, error_code: String, error_message: String) -> DomainResult<()> {
        self.ensure_status(&[TransactionStatus::Pending, TransactionStatus::RequiresAction])?;

        self.status = TransactionStatus::Failed;
        self.error_code = Some(error_code);
        self.error_message = Some(error_message);
        self.touch();
        Ok(())
    }

    /// 对已授权交易请款
    pub fn capture(&mut self, amount: Option<i64>) -> DomainResult<i64> {
        self.ensure_status(&[TransactionStatus::Authorized])?;

        let capture_amount = amount.unwrap_or(self.amount);
        if capture_amount <= 0 || capture_amount > self.amount {
            return Err(DomainError::InvalidAmount(format!(
                "Capture amount must be between 1 and {}",
                self.amount
            )));
        }

        self.status = TransactionStatus::Captured;
        self.captured_amount = Some(capture_amount);
        self.touch();
        Ok(capture_amount)
    }

    /// 3DS认证通过后完成请款
    pub fn complete_three_ds(&mut self, authorization_code: Option<String>) -> DomainResult<()> {
        self.ensure_status(&[TransactionStatus::RequiresAction])?;

        self.status = TransactionStatus::Captured;
        self.captured_amount = Some(self.amount);
        if authorization_code.is_some() {
            self.authorization_code = authorization_code;
        }
        self.touch();
        Ok(())
    }

    /// 撤销已授权交易
    pub fn void(&mut self) -> DomainResult<()> {
        self.ensure_status(&[TransactionStatus::Authorized])?;

        self.status = TransactionStatus::Voided;
        self.touch();
        Ok(())
    }

    /// 剩余可退金额
    pub fn refundable_amount(&self) -> i64 {
        self.captured_amount.unwrap_or(self.amount) - self.refunded_amount
    }

    /// 登记退款，返回新状态
    pub fn apply_refund(&mut self, amount: i64) -> DomainResult<TransactionStatus> {
        self.ensure_status(&[
            TransactionStatus::Captured,
            TransactionStatus::PartiallyRefunded,
        ])?;

        if amount <= 0 {
            return Err(DomainError::InvalidAmount(
                "Refund amount must be greater than 0".to_string(),
            ));
        }

        let remaining = self.refundable_amount();
        if amount > remaining {
            return Err(DomainError::RefundExceedsAmount {
                requested: amount,
                remaining,
            });
        }

        self.refunded_amount += amount;
        self.status = if self.refundable_amount() == 0 {
            TransactionStatus::Refunded
        } else {
            TransactionStatus::PartiallyRefunded
        };
        self.touch();
        Ok(self.status)
    }

    /// 合并附加数据
    pub fn merge_metadata(&mut self, extra: serde_json::Value) {
        if let (serde_json::Value::Object(target), serde_json::Value::Object(source)) =
            (&mut self.metadata, extra)
        {
            target.extend(source);
        }
    }

    /// 检查是否已处于终态
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Failed | TransactionStatus::Voided | TransactionStatus::Refunded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payment(amount: i64) -> Transaction {
        Transaction::new_payment(
            Uuid::new_v4(),
            "merchant_1".to_string(),
            amount,
            Currency::default(),
            "simulator".to_string(),
        )
        .unwrap()
    }

    fn captured(amount: i64) -> Transaction {
        let mut tx = payment(amount);
        tx.mark_as_captured(Some("AUTH".to_string()), "sim_1".to_string())
            .unwrap();
        tx
    }

    #[test]
    fn test_create_payment() {
        let tx = payment(1000);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.transaction_type, TransactionType::Payment);
        assert_eq!(tx.refunded_amount, 0);
        assert!(!tx.is_finished());
    }

    #[test]
    fn test_invalid_amount() {
        let result = Transaction::new_payment(
            Uuid::new_v4(),
            "merchant_1".to_string(),
            0,
            Currency::default(),
            "simulator".to_string(),
        );
        assert!(matches!(result, Err(DomainError::InvalidAmount(_))));
    }

    #[test]
    fn test_capture_requires_authorized() {
        let mut tx = captured(1000);
        let err = tx.capture(None).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));

        let mut tx = payment(1000);
        tx.mark_as_authorized(None, "sim_2".to_string()).unwrap();
        assert_eq!(tx.capture(Some(600)).unwrap(), 600);
        assert_eq!(tx.status, TransactionStatus::Captured);
        assert_eq!(tx.captured_amount, Some(600));
    }

    #[test]
    fn test_void_only_authorized() {
        let mut tx = payment(500);
        assert!(tx.void().is_err());

        tx.mark_as_authorized(None, "sim_3".to_string()).unwrap();
        tx.void().unwrap();
        assert_eq!(tx.status, TransactionStatus::Voided);
        assert!(tx.is_finished());
    }

    #[test]
    fn test_partial_refunds_accumulate() {
        let mut tx = captured(1000);

        assert_eq!(tx.apply_refund(300).unwrap(), TransactionStatus::PartiallyRefunded);
        assert_eq!(tx.apply_refund(200).unwrap(), TransactionStatus::PartiallyRefunded);
        assert_eq!(tx.refunded_amount, 500);
        assert_eq!(tx.refundable_amount(), 500);

        let err = tx.apply_refund(501).unwrap_err();
        assert!(matches!(
            err,
            DomainError::RefundExceedsAmount {
                requested: 501,
                remaining: 500
            }
        ));

        assert_eq!(tx.apply_refund(500).unwrap(), TransactionStatus::Refunded);
        assert!(tx.apply_refund(1).is_err());
    }

    #[test]
    fn test_refund_rejected_for_authorized() {
        let mut tx = payment(1000);
        tx.mark_as_authorized(None, "sim_4".to_string()).unwrap();
        assert!(matches!(
            tx.apply_refund(100),
            Err(DomainError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_three_ds_completion() {
        let mut tx = payment(1000);
        tx.mark_as_requires_action("3ds_1".to_string(), "sim_5".to_string())
            .unwrap();
        tx.complete_three_ds(Some("XID".to_string())).unwrap();
        assert_eq!(tx.status, TransactionStatus::Captured);
        assert_eq!(tx.captured_amount, Some(1000));
        assert!(tx.complete_three_ds(None).is_err());
    }

    #[test]
    fn test_merge_metadata() {
        let mut tx = payment(100);
        tx.merge_metadata(json!({ "gateway": "stripe" }));
        tx.merge_metadata(json!({ "requires_3ds": false }));
        assert_eq!(tx.metadata["gateway"], "stripe");
        assert_eq!(tx.metadata["requires_3ds"], false);
    }
}
