use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::last4;
use crate::domain::{AuthenticationValues, ThreeDSChallenge, ThreeDSStatus};
use crate::ports::ThreeDSecureRepositoryPort;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const CAVV_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// 3DS模拟策略
#[derive(Debug, Clone, PartialEq)]
pub struct ThreeDSecureConfig {
    /// 必须认证的完整卡号
    pub enrolled_cards: Vec<String>,
    /// 需要认证的卡号前缀
    pub enrolled_bins: Vec<String>,
    /// 格式正确的认证响应通过的概率
    pub acceptance_rate: f64,
    /// 挑战有效期
    pub challenge_ttl: Duration,
}

impl Default for ThreeDSecureConfig {
    fn default() -> Self {
        Self {
            enrolled_cards: vec!["4000002500003155".to_string()],
            enrolled_bins: vec!["400000".to_string()],
            acceptance_rate: 0.8,
            challenge_ttl: Duration::from_secs(15 * 60),
        }
    }
}

/// 发起认证的结果
#[derive(Debug, Clone, Serialize)]
pub struct ThreeDSecureInitiation {
    pub id: String,
    pub transaction_id: String,
    pub challenge_url: String,
    pub acs_url: String,
    pub pa_req: String,
    pub expires_at: DateTime<Utc>,
}

/// 认证校验结果
#[derive(Debug, Clone, Serialize)]
pub struct ThreeDSecureVerification {
    pub success: bool,
    pub authenticated: bool,
    pub transaction_id: String,
    pub eci: Option<String>,
    pub cavv: Option<String>,
    pub xid: Option<String>,
}

/// 挑战状态查询结果
#[derive(Debug, Clone, Serialize)]
pub struct ThreeDSecureStatusView {
    pub id: String,
    pub transaction_id: String,
    pub status: ThreeDSStatus,
    pub authenticated: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct PaReqPayload<'a> {
    transaction_id: &'a str,
    amount: i64,
    currency: &'a str,
    timestamp: i64,
}

/// 3-D Secure 挑战服务
pub struct ThreeDSecureService {
    repository: Arc<dyn ThreeDSecureRepositoryPort>,
    config: ThreeDSecureConfig,
}

impl ThreeDSecureService {
    pub fn new(repository: Arc<dyn ThreeDSecureRepositoryPort>, config: ThreeDSecureConfig) -> Self {
        Self { repository, config }
    }

    /// 卡片是否需要强认证
    pub fn requires_3d_secure(&self, card_number: &str) -> bool {
        self.config.enrolled_cards.iter().any(|c| c == card_number)
            || self
                .config
                .enrolled_bins
                .iter()
                .any(|bin| !bin.is_empty() && card_number.starts_with(bin.as_str()))
    }

    /// 发起认证：生成挑战并以 REQUIRED 状态持久化
    pub async fn initiate_authentication(
        &self,
        transaction_id: &str,
        card_number: &str,
        amount: i64,
        currency: &str,
    ) -> DomainResult<ThreeDSecureInitiation> {
        info!("Initiating 3DS authentication for transaction: {}", transaction_id);

        if !self.requires_3d_secure(card_number) {
            return Err(DomainError::ThreeDSNotRequired);
        }

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.config.challenge_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));

        let challenge = ThreeDSChallenge {
            id: generate_challenge_id(),
            transaction_id: transaction_id.to_string(),
            status: ThreeDSStatus::Required,
            acs_url: acs_url(card_number).to_string(),
            pa_req: generate_pa_req(transaction_id, amount, currency)?,
            card_last4: last4(card_number).to_string(),
            amount,
            currency: currency.to_string(),
            expires_at: now + ttl,
            authentication: AuthenticationValues::default(),
            authenticated_at: None,
            created_at: now,
        };

        self.repository.create(&challenge).await?;
        info!("3DS challenge created: {}", challenge.id);

        Ok(ThreeDSecureInitiation {
            challenge_url: format!("/3ds/challenge/{}", challenge.id),
            id: challenge.id,
            transaction_id: challenge.transaction_id,
            acs_url: challenge.acs_url,
            pa_req: challenge.pa_req,
            expires_at: challenge.expires_at,
        })
    }

    /// 校验认证响应（PaRes）
    pub async fn verify_authentication(
        &self,
        challenge_id: &str,
        pa_res: &str,
    ) -> DomainResult<ThreeDSecureVerification> {
        info!("Verifying 3DS authentication: {}", challenge_id);

        let mut challenge = self
            .repository
            .find_by_id(challenge_id)
            .await?
            .ok_or_else(|| DomainError::ThreeDSChallengeNotFound(challenge_id.to_string()))?;

        if challenge.status.is_terminal() {
            return Err(DomainError::ThreeDSAlreadyProcessed(challenge_id.to_string()));
        }

        let now = Utc::now();
        if challenge.expire_if_due(now) {
            self.repository.update(&challenge).await?;
            warn!("3DS challenge expired: {}", challenge_id);
            return Err(DomainError::ThreeDSExpired(challenge_id.to_string()));
        }

        let (authenticated, values) = self.evaluate_pa_res(pa_res);
        challenge.resolve(authenticated, values.clone(), now)?;
        self.repository.update(&challenge).await?;

        info!(
            "3DS verification complete: {} - {}",
            challenge_id, challenge.status
        );

        Ok(ThreeDSecureVerification {
            success: true,
            authenticated,
            transaction_id: challenge.transaction_id,
            eci: values.eci,
            cavv: values.cavv,
            xid: values.xid,
        })
    }

    /// 查询挑战状态，过期的挑战在此处转为 EXPIRED
    pub async fn get_authentication_status(
        &self,
        challenge_id: &str,
    ) -> DomainResult<ThreeDSecureStatusView> {
        let mut challenge = self
            .repository
            .find_by_id(challenge_id)
            .await?
            .ok_or_else(|| DomainError::ThreeDSChallengeNotFound(challenge_id.to_string()))?;

        if challenge.expire_if_due(Utc::now()) {
            self.repository.update(&challenge).await?;
        }

        Ok(ThreeDSecureStatusView {
            authenticated: challenge.status == ThreeDSStatus::Authenticated,
            id: challenge.id,
            transaction_id: challenge.transaction_id,
            status: challenge.status,
            expires_at: challenge.expires_at,
        })
    }

    /// 批量过期，失败时记录日志并返回 0
    pub async fn cleanup_expired_challenges(&self) -> u64 {
        match self.repository.expire_overdue(Utc::now()).await {
            Ok(count) => {
                info!("Cleaned up {} expired 3DS challenges", count);
                count
            }
            Err(e) => {
                error!("Failed to cleanup expired 3DS challenges: {}", e);
                0
            }
        }
    }

    /// 格式错误的响应视为认证失败而非错误
    fn evaluate_pa_res(&self, pa_res: &str) -> (bool, AuthenticationValues) {
        let well_formed = base64::engine::general_purpose::STANDARD
            .decode(pa_res.trim())
            .ok()
            .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
            .is_some();

        if !well_formed {
            warn!("Invalid PaRes format");
            return (false, AuthenticationValues::default());
        }

        let authenticated = rand::thread_rng().gen_bool(self.config.acceptance_rate.clamp(0.0, 1.0));
        if authenticated {
            (
                true,
                AuthenticationValues {
                    eci: Some("05".to_string()),
                    cavv: Some(generate_cavv()),
                    xid: Some(generate_xid()),
                },
            )
        } else {
            (
                false,
                AuthenticationValues {
                    eci: Some("07".to_string()),
                    cavv: None,
                    xid: None,
                },
            )
        }
    }
}

/// 按卡组织选择认证服务器
fn acs_url(card_number: &str) -> &'static str {
    match card_number.chars().next() {
        Some('4') => "https://acs.visa.com/authenticate",
        Some('5') => "https://acs.mastercard.com/authenticate",
        Some('3') => "https://acs.americanexpress.com/authenticate",
        _ => "https://acs.simulator.com/authenticate",
    }
}

fn generate_pa_req(transaction_id: &str, amount: i64, currency: &str) -> DomainResult<String> {
    let payload = PaReqPayload {
        transaction_id,
        amount,
        currency,
        timestamp: Utc::now().timestamp_millis(),
    };
    let json = serde_json::to_vec(&payload)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

fn generate_challenge_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("3ds_{}_{}", Utc::now().timestamp_millis(), suffix)
}

fn generate_cavv() -> String {
    let mut rng = rand::thread_rng();
    (0..28)
        .map(|_| CAVV_ALPHABET[rng.gen_range(0..CAVV_ALPHABET.len())] as char)
        .collect()
}

fn generate_xid() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::InMemoryThreeDSRepository;

    fn service(acceptance_rate: f64) -> (ThreeDSecureService, Arc<InMemoryThreeDSRepository>) {
        let repository = Arc::new(InMemoryThreeDSRepository::new());
        let config = ThreeDSecureConfig {
            acceptance_rate,
            ..Default::default()
        };
        (ThreeDSecureService::new(repository.clone(), config), repository)
    }

    fn valid_pa_res() -> String {
        base64::engine::general_purpose::STANDARD.encode(br#"{"status":"Y"}"#)
    }

    #[tokio::test]
    async fn test_not_enrolled_card() {
        let (service, _) = service(1.0);
        let result = service
            .initiate_authentication("tx_1", "4242424242424242", 1000, "USD")
            .await;
        assert!(matches!(result, Err(DomainError::ThreeDSNotRequired)));
    }

    #[tokio::test]
    async fn test_initiate_builds_challenge() {
        let (service, repository) = service(1.0);
        let initiation = service
            .initiate_authentication("tx_1", "4000002500003155", 1000, "USD")
            .await
            .unwrap();

        assert!(initiation.id.starts_with("3ds_"));
        assert_eq!(initiation.challenge_url, format!("/3ds/challenge/{}", initiation.id));
        assert_eq!(initiation.acs_url, "https://acs.visa.com/authenticate");

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&initiation.pa_req)
            .unwrap();
        let pa_req: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(pa_req["transaction_id"], "tx_1");
        assert_eq!(pa_req["amount"], 1000);

        let stored = repository.find_by_id(&initiation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ThreeDSStatus::Required);
        assert_eq!(stored.card_last4, "3155");
    }

    #[tokio::test]
    async fn test_bin_prefix_enrollment() {
        let (service, _) = service(1.0);
        assert!(service.requires_3d_secure("4000001234567899"));
        assert!(!service.requires_3d_secure("5555555555554444"));
    }

    #[tokio::test]
    async fn test_verify_success_then_reverify_fails() {
        let (service, _) = service(1.0);
        let initiation = service
            .initiate_authentication("tx_1", "4000002500003155", 1000, "USD")
            .await
            .unwrap();

        let verification = service
            .verify_authentication(&initiation.id, &valid_pa_res())
            .await
            .unwrap();
        assert!(verification.authenticated);
        assert_eq!(verification.eci.as_deref(), Some("05"));
        assert_eq!(verification.cavv.unwrap().len(), 28);
        assert_eq!(verification.xid.unwrap().len(), 20);

        let again = service.verify_authentication(&initiation.id, &valid_pa_res()).await;
        assert!(matches!(again, Err(DomainError::ThreeDSAlreadyProcessed(_))));
    }

    #[tokio::test]
    async fn test_malformed_pa_res_is_failed_authentication() {
        let (service, repository) = service(1.0);
        let initiation = service
            .initiate_authentication("tx_1", "4000002500003155", 1000, "USD")
            .await
            .unwrap();

        let verification = service
            .verify_authentication(&initiation.id, "%%%not-base64%%%")
            .await
            .unwrap();
        assert!(!verification.authenticated);

        let stored = repository.find_by_id(&initiation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ThreeDSStatus::Failed);
    }

    #[tokio::test]
    async fn test_refused_authentication() {
        let (service, _) = service(0.0);
        let initiation = service
            .initiate_authentication("tx_1", "4000002500003155", 1000, "USD")
            .await
            .unwrap();

        let verification = service
            .verify_authentication(&initiation.id, &valid_pa_res())
            .await
            .unwrap();
        assert!(!verification.authenticated);
        assert_eq!(verification.eci.as_deref(), Some("07"));
    }

    #[tokio::test]
    async fn test_expired_challenge() {
        let repository = Arc::new(InMemoryThreeDSRepository::new());
        let service = ThreeDSecureService::new(
            repository.clone(),
            ThreeDSecureConfig {
                challenge_ttl: Duration::from_millis(10),
                acceptance_rate: 1.0,
                ..Default::default()
            },
        );

        let initiation = service
            .initiate_authentication("tx_1", "4000002500003155", 1000, "USD")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = service.verify_authentication(&initiation.id, &valid_pa_res()).await;
        assert!(matches!(result, Err(DomainError::ThreeDSExpired(_))));

        let status = service.get_authentication_status(&initiation.id).await.unwrap();
        assert_eq!(status.status, ThreeDSStatus::Expired);

        let again = service.verify_authentication(&initiation.id, &valid_pa_res()).await;
        assert!(matches!(again, Err(DomainError::ThreeDSAlreadyProcessed(_))));
    }

    #[tokio::test]
    async fn test_cleanup_expired_challenges() {
        let repository = Arc::new(InMemoryThreeDSRepository::new());
        let service = ThreeDSecureService::new(
            repository.clone(),
            ThreeDSecureConfig {
                challenge_ttl: Duration::from_millis(10),
                ..Default::default()
            },
        );

        for tx in ["tx_1", "tx_2"] {
            service
                .initiate_authentication(tx, "4000002500003155", 1000, "USD")
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(service.cleanup_expired_challenges().await, 2);
        assert_eq!(service.cleanup_expired_challenges().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_challenge() {
        let (service, _) = service(1.0);
        assert!(matches!(
            service.verify_authentication("3ds_missing", "e30=").await,
            Err(DomainError::ThreeDSChallengeNotFound(_))
        ));
    }
}
