use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const APPROVAL_APPROVED: &str = "approved";
pub const APPROVAL_PENDING: &str = "pending";
pub const APPROVAL_REJECTED: &str = "rejected";

/// Platform account holding the wallet balance. The balance is only ever
/// mutated through the ledger's atomic credit tied to a completed deposit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub wallet_balance: BigDecimal,
    pub is_disabled: bool,
    pub disable_reason: Option<String>,
    pub approval_status: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}
