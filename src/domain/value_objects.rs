use crate::domain::errors::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 交易状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// 处理中
    Pending,
    /// 已授权（未请款）
    Authorized,
    /// 已请款
    Captured,
    /// 需要3DS认证
    RequiresAction,
    /// 失败
    Failed,
    /// 已撤销
    Voided,
    /// 已全额退款
    Refunded,
    /// 部分退款
    PartiallyRefunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Authorized => "authorized",
            TransactionStatus::Captured => "captured",
            TransactionStatus::RequiresAction => "requires_action",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Voided => "voided",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::PartiallyRefunded => "partially_refunded",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "authorized" => Ok(TransactionStatus::Authorized),
            "captured" => Ok(TransactionStatus::Captured),
            "requires_action" => Ok(TransactionStatus::RequiresAction),
            "failed" => Ok(TransactionStatus::Failed),
            "voided" => Ok(TransactionStatus::Voided),
            "refunded" => Ok(TransactionStatus::Refunded),
            "partially_refunded" => Ok(TransactionStatus::PartiallyRefunded),
            other => Err(DomainError::InternalError(format!(
                "Invalid transaction status: {}",
                other
            ))),
        }
    }
}

/// 交易类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// 支付
    Payment,
    /// 退款
    Refund,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Payment => write!(f, "payment"),
            TransactionType::Refund => write!(f, "refund"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "payment" => Ok(TransactionType::Payment),
            "refund" => Ok(TransactionType::Refund),
            other => Err(DomainError::InternalError(format!(
                "Invalid transaction type: {}",
                other
            ))),
        }
    }
}

/// 卡组织
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardNetwork {
    Visa,
    Mastercard,
    Amex,
    RuPay,
    Unknown,
}

impl fmt::Display for CardNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardNetwork::Visa => write!(f, "Visa"),
            CardNetwork::Mastercard => write!(f, "Mastercard"),
            CardNetwork::Amex => write!(f, "Amex"),
            CardNetwork::RuPay => write!(f, "RuPay"),
            CardNetwork::Unknown => write!(f, "Unknown"),
        }
    }
}

/// 币种（ISO 4217 三位字母代码）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> DomainResult<Self> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::ValidationError(format!(
                "Currency must be a 3-letter code, got '{}'",
                code
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self("USD".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 银行卡信息
///
/// `Debug` 输出只包含卡号后四位，CVV 永不输出。
#[derive(Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub cvv: String,
    pub cardholder_name: Option<String>,
}

impl CardDetails {
    pub fn last4(&self) -> &str {
        last4(&self.number)
    }

    pub fn masked(&self) -> String {
        mask_card_number(&self.number)
    }

    /// 校验卡片基本格式
    pub fn validate(&self) -> DomainResult<()> {
        let len = self.number.len();
        if !(12..=19).contains(&len) || !self.number.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::ValidationError(
                "Card number must be 12-19 digits".to_string(),
            ));
        }
        if !(1..=12).contains(&self.exp_month) {
            return Err(DomainError::ValidationError(
                "Card expiry month must be 1-12".to_string(),
            ));
        }
        if !(3..=4).contains(&self.cvv.len()) || !self.cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::ValidationError(
                "CVV must be 3 or 4 digits".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &self.masked())
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .field("cvv", &"***")
            .field("cardholder_name", &self.cardholder_name)
            .finish()
    }
}

/// 卡号后四位
pub fn last4(card_number: &str) -> &str {
    let start = card_number.len().saturating_sub(4);
    card_number.get(start..).unwrap_or("")
}

/// 掩码卡号，仅保留后四位
pub fn mask_card_number(card_number: &str) -> String {
    format!("****{}", last4(card_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(number: &str) -> CardDetails {
        CardDetails {
            number: number.to_string(),
            exp_month: 12,
            exp_year: 2030,
            cvv: "123".to_string(),
            cardholder_name: Some("Test User".to_string()),
        }
    }

    #[test]
    fn test_mask_card_number() {
        assert_eq!(mask_card_number("4242424242424242"), "****4242");
        assert_eq!(mask_card_number("42"), "****42");
    }

    #[test]
    fn test_card_debug_hides_pan_and_cvv() {
        let output = format!("{:?}", card("4242424242424242"));
        assert!(!output.contains("4242424242424242"));
        assert!(!output.contains("123"));
        assert!(output.contains("****4242"));
    }

    #[test]
    fn test_card_validation() {
        assert!(card("4242424242424242").validate().is_ok());
        assert!(card("4242abcd").validate().is_err());

        let mut bad_month = card("4242424242424242");
        bad_month.exp_month = 13;
        assert!(bad_month.validate().is_err());
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("usd").unwrap().as_str(), "USD");
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("U1D").is_err());
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            TransactionStatus::RequiresAction,
            TransactionStatus::PartiallyRefunded,
            TransactionStatus::Captured,
        ] {
            assert_eq!(status.to_string().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<TransactionStatus>().is_err());
    }
}
