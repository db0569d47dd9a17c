use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::{AuthenticationValues, ThreeDSChallenge, ThreeDSStatus};
use crate::ports::ThreeDSecureRepositoryPort;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};
use std::sync::Arc;
use tracing::debug;

/// MySQL 3DS挑战仓储
#[derive(Clone)]
pub struct MySqlThreeDSecureRepository {
    pool: Arc<Pool<MySql>>,
}

impl MySqlThreeDSecureRepository {
    pub fn new(pool: Arc<Pool<MySql>>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThreeDSecureRepositoryPort for MySqlThreeDSecureRepository {
    async fn create(&self, challenge: &ThreeDSChallenge) -> DomainResult<()> {
        let query = r#"
            INSERT INTO three_ds_challenges (
                id, transaction_id, status, acs_url, pa_req, card_last4,
                amount, currency, expires_at, eci, cavv, xid,
                authenticated_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        sqlx::query(query)
            .bind(&challenge.id)
            .bind(&challenge.transaction_id)
            .bind(challenge.status.to_string())
            .bind(&challenge.acs_url)
            .bind(&challenge.pa_req)
            .bind(&challenge.card_last4)
            .bind(challenge.amount)
            .bind(&challenge.currency)
            .bind(challenge.expires_at)
            .bind(&challenge.authentication.eci)
            .bind(&challenge.authentication.cavv)
            .bind(&challenge.authentication.xid)
            .bind(challenge.authenticated_at)
            .bind(challenge.created_at)
            .execute(self.pool.as_ref())
            .await?;

        debug!("3DS challenge created: {}", challenge.id);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ThreeDSChallenge>> {
        let query = r#"
            SELECT id, transaction_id, status, acs_url, pa_req, card_last4,
                   amount, currency, expires_at, eci, cavv, xid,
                   authenticated_at, created_at
            FROM three_ds_challenges
            WHERE id = ?
        "#;

        let row = sqlx::query_as::<_, ChallengeRow>(query)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.map(ChallengeRow::into_challenge).transpose()
    }

    async fn update(&self, challenge: &ThreeDSChallenge) -> DomainResult<()> {
        let query = r#"
            UPDATE three_ds_challenges
            SET status = ?, eci = ?, cavv = ?, xid = ?, authenticated_at = ?
            WHERE id = ?
        "#;

        let rows_affected = sqlx::query(query)
            .bind(challenge.status.to_string())
            .bind(&challenge.authentication.eci)
            .bind(&challenge.authentication.cavv)
            .bind(&challenge.authentication.xid)
            .bind(challenge.authenticated_at)
            .bind(&challenge.id)
            .execute(self.pool.as_ref())
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(DomainError::ThreeDSChallengeNotFound(challenge.id.clone()));
        }

        Ok(())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let rows_affected = sqlx::query(
            "UPDATE three_ds_challenges SET status = ? WHERE status = ? AND expires_at < ?",
        )
        .bind(ThreeDSStatus::Expired.to_string())
        .bind(ThreeDSStatus::Required.to_string())
        .bind(now)
        .execute(self.pool.as_ref())
        .await?
        .rows_affected();

        Ok(rows_affected)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChallengeRow {
    id: String,
    transaction_id: String,
    status: String,
    acs_url: String,
    pa_req: String,
    card_last4: String,
    amount: i64,
    currency: String,
    expires_at: DateTime<Utc>,
    eci: Option<String>,
    cavv: Option<String>,
    xid: Option<String>,
    authenticated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ChallengeRow {
    fn into_challenge(self) -> DomainResult<ThreeDSChallenge> {
        Ok(ThreeDSChallenge {
            id: self.id,
            transaction_id: self.transaction_id,
            status: self.status.parse()?,
            acs_url: self.acs_url,
            pa_req: self.pa_req,
            card_last4: self.card_last4,
            amount: self.amount,
            currency: self.currency,
            expires_at: self.expires_at,
            authentication: AuthenticationValues {
                eci: self.eci,
                cavv: self.cavv,
                xid: self.xid,
            },
            authenticated_at: self.authenticated_at,
            created_at: self.created_at,
        })
    }
}
