//! Postgres implementation of the ledger port.
//!
//! The claim and the wallet credit are both single conditional statements:
//! Postgres row locking makes each `UPDATE ... RETURNING` atomic, which is
//! what gives the orchestrator its at-most-once crediting guarantee.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::transaction::{STATUS_COMPLETED, STATUS_FAILED, STATUS_PENDING, TYPE_DEPOSIT};
use crate::domain::{Transaction, User};
use crate::ports::{LedgerResult, LedgerStore, TransactionFilter, VelocityCounts};

#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn get_user(&self, id: Uuid) -> LedgerResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_transaction(&self, tx: &Transaction) -> LedgerResult<Transaction> {
        let inserted = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                id, user_id, tx_type, amount, balance_before, balance_after,
                status, reference, gateway, description, processing, metadata,
                created_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(tx.user_id)
        .bind(&tx.tx_type)
        .bind(&tx.amount)
        .bind(&tx.balance_before)
        .bind(&tx.balance_after)
        .bind(&tx.status)
        .bind(&tx.reference)
        .bind(&tx.gateway)
        .bind(&tx.description)
        .bind(tx.processing)
        .bind(&tx.metadata)
        .bind(tx.created_at)
        .bind(tx.completed_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn get_transaction(&self, id: Uuid) -> LedgerResult<Option<Transaction>> {
        let tx = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tx)
    }

    async fn get_by_reference(&self, reference: &str) -> LedgerResult<Option<Transaction>> {
        let tx = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tx)
    }

    async fn claim_pending(&self, reference: &str) -> LedgerResult<Option<Transaction>> {
        let claimed = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET processing = TRUE
            WHERE reference = $1 AND status = $2 AND processing = FALSE
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(STATUS_PENDING)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed)
    }

    async fn release_claim(&self, id: Uuid) -> LedgerResult<()> {
        sqlx::query("UPDATE transactions SET processing = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn credit_wallet(&self, user_id: Uuid, amount: &BigDecimal) -> LedgerResult<BigDecimal> {
        let new_balance = sqlx::query_scalar::<_, BigDecimal>(
            "UPDATE users SET wallet_balance = wallet_balance + $1 WHERE id = $2 RETURNING wallet_balance",
        )
        .bind(amount)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(new_balance)
    }

    async fn complete_transaction(
        &self,
        id: Uuid,
        balance_before: &BigDecimal,
        balance_after: &BigDecimal,
        metadata: &serde_json::Value,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2,
                balance_before = $3,
                balance_after = $4,
                processing = FALSE,
                completed_at = NOW(),
                metadata = COALESCE(metadata, '{}'::jsonb) || $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(STATUS_COMPLETED)
        .bind(balance_before)
        .bind(balance_after)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_transaction(&self, id: Uuid, metadata: &serde_json::Value) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2,
                processing = FALSE,
                metadata = COALESCE(metadata, '{}'::jsonb) || $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(STATUS_FAILED)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn velocity_counts(
        &self,
        user_id: Uuid,
        ip: &str,
        window_start: DateTime<Utc>,
        large_amount: &BigDecimal,
    ) -> LedgerResult<VelocityCounts> {
        let deposits_by_ip = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE tx_type = $1 AND created_at >= $2 AND metadata->>'ip' = $3
            "#,
        )
        .bind(TYPE_DEPOSIT)
        .bind(window_start)
        .bind(ip)
        .fetch_one(&self.pool)
        .await?;

        let deposits_by_user = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM transactions WHERE tx_type = $1 AND created_at >= $2 AND user_id = $3",
        )
        .bind(TYPE_DEPOSIT)
        .bind(window_start)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let large_deposits_by_user = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE tx_type = $1 AND created_at >= $2 AND user_id = $3 AND amount >= $4
            "#,
        )
        .bind(TYPE_DEPOSIT)
        .bind(window_start)
        .bind(user_id)
        .bind(large_amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(VelocityCounts {
            deposits_by_ip,
            deposits_by_user,
            large_deposits_by_user,
        })
    }

    async fn list_user_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<(Vec<Transaction>, i64)> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR tx_type = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(&filter.status)
        .bind(&filter.tx_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR tx_type = $3)
            "#,
        )
        .bind(user_id)
        .bind(&filter.status)
        .bind(&filter.tx_type)
        .fetch_one(&self.pool)
        .await?;

        Ok((transactions, total))
    }

    async fn list_fraud_alerts(&self, limit: i64) -> LedgerResult<Vec<Transaction>> {
        let alerts = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE metadata @> '{"fraud_detected": true}'::jsonb
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(alerts)
    }

    async fn ping(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
