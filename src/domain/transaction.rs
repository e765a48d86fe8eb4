//! Transaction domain entity.
//!
//! A deposit starts out `pending`, is claimed exactly once by flipping the
//! `processing` flag, and ends up either `completed` (wallet credited) or
//! `failed`. The `reference` is unique and immutable; it is the handle every
//! reconciliation path (webhook, callback, polling) converges on.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

pub const TYPE_DEPOSIT: &str = "deposit";
pub const GATEWAY_PAYSTACK: &str = "paystack";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tx_type: String,
    /// Base amount credited to the wallet, pre-fee.
    pub amount: BigDecimal,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub status: String,
    pub reference: String,
    pub gateway: String,
    pub description: Option<String>,
    /// Mutual-exclusion lock; only the claim holder may finalize the status.
    pub processing: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new_deposit(
        user_id: Uuid,
        amount: BigDecimal,
        balance_before: BigDecimal,
        reference: String,
        metadata: serde_json::Value,
    ) -> Self {
        let balance_after = balance_before.clone() + amount.clone();
        Self {
            id: Uuid::new_v4(),
            user_id,
            tx_type: TYPE_DEPOSIT.to_string(),
            amount,
            balance_before,
            balance_after,
            status: STATUS_PENDING.to_string(),
            reference,
            gateway: GATEWAY_PAYSTACK.to_string(),
            description: Some("Wallet deposit via Paystack".to_string()),
            processing: false,
            metadata: Some(metadata),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == STATUS_PENDING
    }

    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }

    /// Reads a decimal stored as a string inside the metadata blob. Amounts
    /// are serialized as strings to keep jsonb free of float noise.
    pub fn metadata_decimal(&self, key: &str) -> Option<BigDecimal> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<BigDecimal>().ok())
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
    }

    pub fn fraud_detected(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("fraud_detected"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_deposit_starts_pending_and_unlocked() {
        let tx = Transaction::new_deposit(
            Uuid::new_v4(),
            "20.00".parse().unwrap(),
            "50.00".parse().unwrap(),
            "DEP-test-1".to_string(),
            serde_json::json!({}),
        );
        assert_eq!(tx.status, STATUS_PENDING);
        assert!(!tx.processing);
        assert_eq!(tx.balance_after, "70.00".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn metadata_decimal_round_trips_string_amounts() {
        let tx = Transaction::new_deposit(
            Uuid::new_v4(),
            "20.00".parse().unwrap(),
            "0".parse().unwrap(),
            "DEP-test-2".to_string(),
            serde_json::json!({ "expected_gateway_amount": "20.60" }),
        );
        assert_eq!(
            tx.metadata_decimal("expected_gateway_amount"),
            Some("20.60".parse().unwrap())
        );
        assert_eq!(tx.metadata_decimal("missing"), None);
    }

    #[test]
    fn fraud_flag_defaults_to_false() {
        let tx = Transaction::new_deposit(
            Uuid::new_v4(),
            "10".parse().unwrap(),
            "0".parse().unwrap(),
            "DEP-test-3".to_string(),
            serde_json::json!({}),
        );
        assert!(!tx.fraud_detected());
    }
}
