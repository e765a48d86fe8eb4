use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::AppState;
use crate::domain::Transaction;
use crate::domain::transaction::STATUS_COMPLETED;
use crate::error::AppError;
use crate::ports::TransactionFilter;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: BigDecimal,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub balance_change: BigDecimal,
    pub is_credit: bool,
    pub status: String,
    pub reference: String,
    pub gateway: String,
    pub description: Option<String>,
    pub fraud_detected: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionView {
    fn from(tx: Transaction) -> Self {
        // Pending and failed deposits never moved the balance.
        let balance_change = if tx.status == STATUS_COMPLETED {
            tx.balance_after.clone() - tx.balance_before.clone()
        } else {
            BigDecimal::from(0)
        };
        let is_credit = balance_change > BigDecimal::from(0);
        Self {
            id: tx.id,
            tx_type: tx.tx_type,
            amount: tx.amount,
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            balance_change,
            is_credit,
            status: tx.status,
            reference: tx.reference,
            gateway: tx.gateway,
            description: tx.description,
            fraud_detected: tx
                .metadata
                .as_ref()
                .and_then(|m| m.get("fraud_detected"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            created_at: tx.created_at,
            completed_at: tx.completed_at,
        }
    }
}

pub async fn user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = Uuid::parse_str(&user_id).map_err(|_| AppError::InvalidUserIdFormat)?;

    state
        .ledger
        .get_user(user_id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    // "all" is the caller's explicit no-filter sentinel.
    let filter = TransactionFilter {
        status: params.status.filter(|s| s != "all"),
        tx_type: params.tx_type.filter(|t| t != "all"),
    };

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = (page - 1) * limit;

    let (transactions, total) = state
        .ledger
        .list_user_transactions(user_id, &filter, limit, offset)
        .await?;
    let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };

    let views: Vec<TransactionView> = transactions.into_iter().map(Into::into).collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "transactions": views,
            "pagination": {
                "page": page,
                "limit": limit,
                "total": total,
                "pages": pages,
            },
        },
    })))
}
