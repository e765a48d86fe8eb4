use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::AppState;
use crate::error::AppError;

const FRAUD_ALERT_LIMIT: i64 = 50;

pub async fn fraud_alerts(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let alerts = state.deposits.fraud_alerts(FRAUD_ALERT_LIMIT).await?;
    let total = alerts.len();
    Ok(Json(json!({
        "success": true,
        "data": {
            "fraudAlerts": alerts,
            "total": total,
        },
    })))
}
