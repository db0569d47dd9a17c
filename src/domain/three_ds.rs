use crate::domain::errors::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 3DS挑战状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreeDSStatus {
    Required,
    Authenticated,
    Failed,
    Expired,
}

impl ThreeDSStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ThreeDSStatus::Required)
    }
}

impl fmt::Display for ThreeDSStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreeDSStatus::Required => write!(f, "REQUIRED"),
            ThreeDSStatus::Authenticated => write!(f, "AUTHENTICATED"),
            ThreeDSStatus::Failed => write!(f, "FAILED"),
            ThreeDSStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

impl FromStr for ThreeDSStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUIRED" => Ok(ThreeDSStatus::Required),
            "AUTHENTICATED" => Ok(ThreeDSStatus::Authenticated),
            "FAILED" => Ok(ThreeDSStatus::Failed),
            "EXPIRED" => Ok(ThreeDSStatus::Expired),
            other => Err(DomainError::InternalError(format!(
                "Invalid 3DS status: {}",
                other
            ))),
        }
    }
}

/// 认证结果值（ECI / CAVV / XID）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationValues {
    pub eci: Option<String>,
    pub cavv: Option<String>,
    pub xid: Option<String>,
}

/// 3DS挑战记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeDSChallenge {
    pub id: String,
    pub transaction_id: String,
    pub status: ThreeDSStatus,
    /// 认证服务器（ACS）地址
    pub acs_url: String,
    /// 编码后的认证请求（PaReq）
    pub pa_req: String,
    pub card_last4: String,
    pub amount: i64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
    pub authentication: AuthenticationValues,
    pub authenticated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ThreeDSChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// REQUIRED 且已过期时转为 EXPIRED，返回是否发生转换
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == ThreeDSStatus::Required && self.is_expired(now) {
            self.status = ThreeDSStatus::Expired;
            return true;
        }
        false
    }

    /// 记录认证结果，只允许从 REQUIRED 转换一次
    pub fn resolve(
        &mut self,
        authenticated: bool,
        values: AuthenticationValues,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::ThreeDSAlreadyProcessed(self.id.clone()));
        }

        if authenticated {
            self.status = ThreeDSStatus::Authenticated;
            self.authenticated_at = Some(now);
        } else {
            self.status = ThreeDSStatus::Failed;
        }
        self.authentication = values;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn challenge(expires_in: Duration) -> ThreeDSChallenge {
        let now = Utc::now();
        ThreeDSChallenge {
            id: "3ds_test".to_string(),
            transaction_id: "tx".to_string(),
            status: ThreeDSStatus::Required,
            acs_url: "https://acs.visa.com/authenticate".to_string(),
            pa_req: "e30=".to_string(),
            card_last4: "3155".to_string(),
            amount: 1000,
            currency: "USD".to_string(),
            expires_at: now + expires_in,
            authentication: AuthenticationValues::default(),
            authenticated_at: None,
            created_at: now,
        }
    }

    #[test]
    fn test_expire_if_due() {
        let mut c = challenge(Duration::minutes(-1));
        assert!(c.expire_if_due(Utc::now()));
        assert_eq!(c.status, ThreeDSStatus::Expired);
        assert!(!c.expire_if_due(Utc::now()));

        let mut fresh = challenge(Duration::minutes(15));
        assert!(!fresh.expire_if_due(Utc::now()));
        assert_eq!(fresh.status, ThreeDSStatus::Required);
    }

    #[test]
    fn test_resolve_only_once() {
        let mut c = challenge(Duration::minutes(15));
        c.resolve(true, AuthenticationValues::default(), Utc::now())
            .unwrap();
        assert_eq!(c.status, ThreeDSStatus::Authenticated);
        assert!(c.authenticated_at.is_some());

        let err = c
            .resolve(false, AuthenticationValues::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::ThreeDSAlreadyProcessed(_)));
    }
}
