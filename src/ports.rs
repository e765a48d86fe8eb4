//! Ports the deposit orchestrator is wired against.
//!
//! Keeping the ledger, payment gateway and notification sink behind traits
//! lets any persistence layer participate, as long as it can provide the one
//! primitive the design depends on: an atomic compare-and-swap claim on the
//! `status` + `processing` fields of a transaction.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Transaction, User};

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => LedgerError::NotFound(err.to_string()),
            other => LedgerError::Database(other.to_string()),
        }
    }
}

/// Counts used by the deposit velocity heuristic, all over a trailing window.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct VelocityCounts {
    pub deposits_by_ip: i64,
    pub deposits_by_user: i64,
    pub large_deposits_by_user: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub status: Option<String>,
    pub tx_type: Option<String>,
}

/// Persistent wallet + transaction store.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> LedgerResult<Option<User>>;

    async fn insert_transaction(&self, tx: &Transaction) -> LedgerResult<Transaction>;

    async fn get_transaction(&self, id: Uuid) -> LedgerResult<Option<Transaction>>;

    async fn get_by_reference(&self, reference: &str) -> LedgerResult<Option<Transaction>>;

    /// Atomically claims a pending transaction for processing: matches
    /// `{reference, status = pending, processing = false}` and flips
    /// `processing` to true in a single conditional update. Returns `None`
    /// when the transaction is absent, finished, or already claimed by a
    /// concurrent caller. This is the only mutual-exclusion primitive in the
    /// system; it must not be implemented as a read-then-write pair.
    async fn claim_pending(&self, reference: &str) -> LedgerResult<Option<Transaction>>;

    /// Releases the processing lock without finalizing the status.
    async fn release_claim(&self, id: Uuid) -> LedgerResult<()>;

    /// Atomically increments the wallet and returns the new balance.
    async fn credit_wallet(&self, user_id: Uuid, amount: &BigDecimal) -> LedgerResult<BigDecimal>;

    /// Finalizes a claimed transaction as completed and drops the lock.
    async fn complete_transaction(
        &self,
        id: Uuid,
        balance_before: &BigDecimal,
        balance_after: &BigDecimal,
        metadata: &serde_json::Value,
    ) -> LedgerResult<()>;

    /// Finalizes a transaction as failed, merges `metadata` into the stored
    /// blob, and drops the lock.
    async fn fail_transaction(&self, id: Uuid, metadata: &serde_json::Value) -> LedgerResult<()>;

    async fn velocity_counts(
        &self,
        user_id: Uuid,
        ip: &str,
        window_start: DateTime<Utc>,
        large_amount: &BigDecimal,
    ) -> LedgerResult<VelocityCounts>;

    async fn list_user_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<(Vec<Transaction>, i64)>;

    async fn list_fraud_alerts(&self, limit: i64) -> LedgerResult<Vec<Transaction>>;

    async fn ping(&self) -> LedgerResult<()>;
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(String),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Request(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct InitializeRequest {
    pub email: String,
    /// Fee-inclusive total in the gateway's minor unit (pesewas).
    pub amount_minor: i64,
    pub reference: String,
    pub callback_url: String,
    pub user_id: Uuid,
    pub user_name: String,
    /// Base amount, carried as display metadata for the gateway dashboard.
    pub base_amount: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct InitializedPayment {
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    /// Gateway-side status; `success` is the settlement sentinel.
    pub status: String,
    /// Amount actually paid, in the gateway's minor unit.
    pub amount_minor: i64,
    pub reference: String,
    /// Raw gateway payload, persisted for audit.
    pub raw: serde_json::Value,
}

/// Third-party payment gateway (Paystack in production).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, req: &InitializeRequest) -> Result<InitializedPayment, GatewayError>;

    /// Verifies a transaction by reference; the authoritative source of
    /// truth for the amount actually paid.
    async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct NotifyOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl NotifyOutcome {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

/// Outbound notification sink. Fire-and-forget: implementations never
/// propagate failures to the financial flow, they only report them back for
/// logging.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deposit_success(
        &self,
        user: &User,
        amount: &BigDecimal,
        new_balance: &BigDecimal,
    ) -> NotifyOutcome;

    async fn fraud_alert(
        &self,
        user: &User,
        reference: &str,
        expected: &BigDecimal,
        actual: &BigDecimal,
    ) -> NotifyOutcome;
}
