pub mod admin;
pub mod deposit;
pub mod payment;
pub mod transactions;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub ledger: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let ledger = match state.ledger.ping().await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    let status_code = if ledger == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthStatus {
            status: if ledger == "connected" {
                "healthy".to_string()
            } else {
                "unhealthy".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            ledger: ledger.to_string(),
        }),
    )
}
