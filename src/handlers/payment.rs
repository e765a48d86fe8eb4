//! Gateway-facing entry points: redirect callback, signed webhook, and the
//! polling verify endpoints. All of them funnel into the orchestrator's
//! idempotent reconcile.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse},
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha512;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub reference: Option<String>,
}

/// Browser redirect target. Responds immediately with a transitional page
/// and reconciles in the background; the user's redirect never waits on the
/// gateway.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    let frontend = state.config.frontend_url.clone();

    let Some(reference) = params.reference.filter(|r| !r.is_empty()) else {
        return Html(transition_page(
            &format!("{frontend}/payment/callback?error=no_reference"),
            "Redirecting...",
        ));
    };

    tracing::info!(%reference, "callback received");
    let deposits = state.deposits.clone();
    let background_ref = reference.clone();
    tokio::spawn(async move {
        let outcome = deposits.reconcile(&background_ref).await;
        tracing::info!(
            reference = %background_ref,
            success = outcome.success,
            message = %outcome.message,
            "callback reconciliation finished"
        );
    });

    Html(transition_page(
        &format!("{frontend}/payment/callback?reference={reference}"),
        "Verifying and crediting your account...",
    ))
}

fn transition_page(target: &str, detail: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta http-equiv="refresh" content="2;url={target}" />
    <title>Processing Payment...</title>
  </head>
  <body>
    <h2>Processing Payment...</h2>
    <p>{detail}</p>
    <p>You will be redirected shortly.</p>
  </body>
</html>"#
    )
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    reference: Option<String>,
}

/// Server-to-server push from the gateway. The HMAC-SHA512 signature over
/// the raw body must match before the payload is trusted.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;
    verify_signature(state.config.paystack_secret_key.as_bytes(), &body, signature)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("undecodable webhook payload: {e}")))?;

    if event.event == "charge.success" {
        let reference = event
            .data
            .and_then(|d| d.reference)
            .ok_or_else(|| AppError::BadRequest("webhook event missing reference".to_string()))?;
        tracing::info!(%reference, "processing webhook payment");
        let outcome = state.deposits.reconcile(&reference).await;
        Ok(Json(json!({ "message": outcome.message })))
    } else {
        Ok(Json(json!({ "message": "Event received" })))
    }
}

fn verify_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> Result<(), AppError> {
    let provided = hex::decode(signature_hex).map_err(|_| AppError::InvalidSignature)?;
    let mut mac =
        HmacSha512::new_from_slice(secret).map_err(|_| AppError::InvalidSignature)?;
    mac.update(body);
    // verify_slice is constant-time
    mac.verify_slice(&provided)
        .map_err(|_| AppError::InvalidSignature)
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub reference: Option<String>,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<impl IntoResponse, AppError> {
    let reference = params
        .reference
        .filter(|r| !r.is_empty())
        .ok_or(AppError::MissingReference)?;
    let verification = state.deposits.verify_payment(&reference).await?;
    Ok(Json(verification))
}

pub async fn verify_pending(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = Uuid::parse_str(&transaction_id).map_err(|_| AppError::TransactionNotFound)?;
    let verification = state.deposits.verify_pending_by_id(id).await?;
    Ok(Json(verification))
}
