// PostgreSQL交易存储
// 状态更新在数据库事务中以 SELECT ... FOR UPDATE 锁定交易行后完成

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::error::{PaymentError, PaymentResult};
use crate::models::{
    NormalizedStatus, Provider, ProviderEvent, ProviderLog, RequestStatus, Transaction,
    TransactionStatus,
};
use crate::services::transaction_store::{ensure_positive_amount, StatusUpdate, TransactionStore};

const TRANSACTION_COLUMNS: &str = "id, reference, external_id, request_id, amount, provider, \
     status, raw_provider_data, created_at, last_updated_at, validated_at";

/// PostgreSQL唯一约束冲突错误码
const UNIQUE_VIOLATION: &str = "23505";

/// 每个申请至多一笔未失败交易的部分唯一索引
const ACTIVE_REQUEST_INDEX: &str = "payment_transactions_active_request";

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    reference: String,
    external_id: Option<String>,
    request_id: i64,
    amount: Decimal,
    provider: String,
    status: String,
    raw_provider_data: Value,
    created_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
    validated_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = PaymentError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            reference: row.reference,
            external_id: row.external_id,
            request_id: row.request_id,
            amount: row.amount,
            provider: row.provider.parse::<Provider>().map_err(PaymentError::Internal)?,
            status: row
                .status
                .parse::<TransactionStatus>()
                .map_err(PaymentError::Internal)?,
            raw_provider_data: ProviderLog::from(row.raw_provider_data),
            created_at: row.created_at,
            last_updated_at: row.last_updated_at,
            validated_at: row.validated_at,
        })
    }
}

/// PostgreSQL交易存储
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_by_reference(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        reference: &str,
    ) -> PaymentResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE reference = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("transaction {}", reference)))?;

        Transaction::try_from(row)
    }

    async fn save(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        transaction: &Transaction,
    ) -> PaymentResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_transactions
            SET external_id = $2,
                status = $3,
                raw_provider_data = $4::json,
                last_updated_at = $5,
                validated_at = COALESCE(validated_at, $6)
            WHERE id = $1
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.external_id)
        .bind(transaction.status.as_str())
        .bind(transaction.raw_provider_data.as_value().to_string())
        .bind(transaction.last_updated_at)
        .bind(transaction.validated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

/// 插入失败的错误转换，仅活跃交易索引冲突视为重复交易
fn insert_error(err: sqlx::Error, request_id: i64) -> PaymentError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION)
            && db.constraint() == Some(ACTIVE_REQUEST_INDEX)
        {
            return PaymentError::DuplicateTransaction(request_id);
        }
    }
    PaymentError::Database(err)
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn create(
        &self,
        request_id: i64,
        amount: Decimal,
        provider: Provider,
    ) -> PaymentResult<Transaction> {
        ensure_positive_amount(&amount)?;

        let mut tx = self.pool.begin().await?;

        // 锁定申请行，串行化同一申请的并发创建
        let status: Option<String> = sqlx::query_scalar(
            "SELECT statut FROM demandes_demande WHERE id = $1 FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?;

        let status = status.ok_or_else(|| PaymentError::NotFound(format!("request {}", request_id)))?;
        if status != RequestStatus::AWAITING_PAYMENT {
            return Err(PaymentError::InvalidRequestState { request_id, status });
        }

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payment_transactions WHERE request_id = $1 AND status <> 'failed'",
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(PaymentError::DuplicateTransaction(request_id));
        }

        let transaction = Transaction::new(request_id, amount, provider);
        sqlx::query(
            r#"
            INSERT INTO payment_transactions
                (id, reference, external_id, request_id, amount, provider, status,
                 raw_provider_data, created_at, last_updated_at, validated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::json, $9, $10, $11)
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.reference)
        .bind(&transaction.external_id)
        .bind(transaction.request_id)
        .bind(transaction.amount)
        .bind(transaction.provider.as_str())
        .bind(transaction.status.as_str())
        .bind(transaction.raw_provider_data.as_value().to_string())
        .bind(transaction.created_at)
        .bind(transaction.last_updated_at)
        .bind(transaction.validated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| insert_error(e, request_id))?;

        tx.commit().await?;

        log::info!(
            "Created transaction {} for request {} ({} FCFA)",
            transaction.reference,
            request_id,
            amount
        );
        Ok(transaction)
    }

    async fn find_by_reference(&self, reference: &str) -> PaymentResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE reference = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("transaction {}", reference)))?;

        Transaction::try_from(row)
    }

    async fn find_active_for_request(&self, request_id: i64) -> PaymentResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions \
             WHERE request_id = $1 AND status <> 'failed' \
             ORDER BY created_at DESC LIMIT 1",
            TRANSACTION_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    async fn attach_intent(
        &self,
        reference: &str,
        external_id: Option<&str>,
        event: ProviderEvent,
    ) -> PaymentResult<Transaction> {
        let mut tx = self.pool.begin().await?;
        let mut transaction = Self::lock_by_reference(&mut tx, reference).await?;

        transaction.attach_intent(external_id, &event, Utc::now());
        Self::save(&mut tx, &transaction).await?;
        tx.commit().await?;

        Ok(transaction)
    }

    async fn apply_status(
        &self,
        reference: &str,
        status: NormalizedStatus,
        event: ProviderEvent,
    ) -> PaymentResult<StatusUpdate> {
        let mut tx = self.pool.begin().await?;
        let mut transaction = Self::lock_by_reference(&mut tx, reference).await?;

        let transitioned = transaction.apply_status(status, &event, Utc::now());
        Self::save(&mut tx, &transaction).await?;
        tx.commit().await?;

        if transitioned {
            log::info!("Transaction {} moved to {}", reference, transaction.status);
        }

        Ok(StatusUpdate {
            transaction,
            transitioned,
        })
    }
}
