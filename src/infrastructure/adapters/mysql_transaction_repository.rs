use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::Currency;
use crate::domain::Transaction;
use crate::ports::TransactionRepositoryPort;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT id, merchant_id, customer_id, parent_id, amount, currency,
           status, transaction_type, description, gateway, gateway_transaction_id,
           authorization_code, error_code, error_message, captured_amount,
           refunded_amount, card_last4, card_network, three_ds_challenge_id,
           idempotency_key, metadata, created_at, updated_at
    FROM transactions
"#;

/// MySQL交易仓储实现
#[derive(Clone)]
pub struct MySqlTransactionRepository {
    pool: Arc<Pool<MySql>>,
}

impl MySqlTransactionRepository {
    pub fn new(pool: Arc<Pool<MySql>>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepositoryPort for MySqlTransactionRepository {
    /// 保存交易
    async fn save(&self, transaction: &Transaction) -> DomainResult<()> {
        let query = r#"
            INSERT INTO transactions (
                id, merchant_id, customer_id, parent_id, amount, currency,
                status, transaction_type, description, gateway, gateway_transaction_id,
                authorization_code, error_code, error_message, captured_amount,
                refunded_amount, card_last4, card_network, three_ds_challenge_id,
                idempotency_key, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        sqlx::query(query)
            .bind(transaction.id)
            .bind(&transaction.merchant_id)
            .bind(&transaction.customer_id)
            .bind(transaction.parent_id)
            .bind(transaction.amount)
            .bind(transaction.currency.as_str())
            .bind(transaction.status.as_str())
            .bind(transaction.transaction_type.to_string())
            .bind(&transaction.description)
            .bind(&transaction.gateway)
            .bind(&transaction.gateway_transaction_id)
            .bind(&transaction.authorization_code)
            .bind(&transaction.error_code)
            .bind(&transaction.error_message)
            .bind(transaction.captured_amount)
            .bind(transaction.refunded_amount)
            .bind(&transaction.card_last4)
            .bind(&transaction.card_network)
            .bind(&transaction.three_ds_challenge_id)
            .bind(&transaction.idempotency_key)
            .bind(transaction.metadata.to_string())
            .bind(transaction.created_at)
            .bind(transaction.updated_at)
            .execute(self.pool.as_ref())
            .await?;

        debug!("Transaction saved: {}", transaction.id);
        Ok(())
    }

    /// 根据ID和商户查找交易
    async fn find_by_id(&self, id: Uuid, merchant_id: &str) -> DomainResult<Option<Transaction>> {
        let query = format!("{} WHERE id = ? AND merchant_id = ?", SELECT_COLUMNS);

        let row = sqlx::query_as::<_, TransactionRow>(&query)
            .bind(id)
            .bind(merchant_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.map(TransactionRow::into_transaction).transpose()
    }

    /// 更新交易的可变字段
    async fn update(&self, transaction: &Transaction) -> DomainResult<()> {
        let query = r#"
            UPDATE transactions
            SET status = ?, gateway_transaction_id = ?, authorization_code = ?,
                error_code = ?, error_message = ?, captured_amount = ?,
                refunded_amount = ?, three_ds_challenge_id = ?, metadata = ?,
                updated_at = ?
            WHERE id = ?
        "#;

        let rows_affected = sqlx::query(query)
            .bind(transaction.status.as_str())
            .bind(&transaction.gateway_transaction_id)
            .bind(&transaction.authorization_code)
            .bind(&transaction.error_code)
            .bind(&transaction.error_message)
            .bind(transaction.captured_amount)
            .bind(transaction.refunded_amount)
            .bind(&transaction.three_ds_challenge_id)
            .bind(transaction.metadata.to_string())
            .bind(transaction.updated_at)
            .bind(transaction.id)
            .execute(self.pool.as_ref())
            .await?
            .rows_affected();

        if rows_affected == 0 {
            error!("No transaction found to update: {}", transaction.id);
            return Err(DomainError::PaymentNotFound(transaction.id.to_string()));
        }

        debug!("Transaction updated: {}", transaction.id);
        Ok(())
    }
}

/// 数据库行结构体
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    merchant_id: String,
    customer_id: Option<String>,
    parent_id: Option<Uuid>,
    amount: i64,
    currency: String,
    status: String,
    transaction_type: String,
    description: Option<String>,
    gateway: String,
    gateway_transaction_id: Option<String>,
    authorization_code: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    captured_amount: Option<i64>,
    refunded_amount: i64,
    card_last4: Option<String>,
    card_network: Option<String>,
    three_ds_challenge_id: Option<String>,
    idempotency_key: Option<String>,
    metadata: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> DomainResult<Transaction> {
        let metadata = match self.metadata.as_deref() {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => serde_json::Value::Object(Default::default()),
        };

        Ok(Transaction {
            id: self.id,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            parent_id: self.parent_id,
            amount: self.amount,
            currency: Currency::parse(&self.currency)?,
            status: self.status.parse()?,
            transaction_type: self.transaction_type.parse()?,
            description: self.description,
            gateway: self.gateway,
            gateway_transaction_id: self.gateway_transaction_id,
            authorization_code: self.authorization_code,
            error_code: self.error_code,
            error_message: self.error_message,
            captured_amount: self.captured_amount,
            refunded_amount: self.refunded_amount,
            card_last4: self.card_last4,
            card_network: self.card_network,
            three_ds_challenge_id: self.three_ds_challenge_id,
            idempotency_key: self.idempotency_key,
            metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
