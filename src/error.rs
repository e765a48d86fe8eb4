use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bigdecimal::BigDecimal;
use serde_json::json;
use thiserror::Error;

use crate::ports::LedgerError;

/// Request-level errors with a machine-readable code. Server-side detail is
/// logged, never sent to the client.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("User ID is required")]
    MissingUserId,

    #[error("Valid amount is required (must be greater than 0)")]
    InvalidAmount,

    #[error("Valid email address is required")]
    InvalidEmail,

    #[error("Invalid user ID format")]
    InvalidUserIdFormat,

    #[error("User account not found")]
    UserNotFound,

    #[error("Your account has been disabled")]
    AccountDisabled(String),

    #[error("Your account is pending approval. Please contact support.")]
    AccountPending,

    #[error("Your account has not been approved. Please contact support.")]
    AccountRejected,

    #[error("Minimum deposit is GHS {0}")]
    AmountTooLow(BigDecimal),

    #[error("Maximum deposit is GHS {0}")]
    AmountTooHigh(BigDecimal),

    #[error("Payment reference is required")]
    MissingReference,

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Payment gateway initialization failed")]
    PaystackInitFailed,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingUserId
            | AppError::InvalidAmount
            | AppError::InvalidEmail
            | AppError::InvalidUserIdFormat
            | AppError::AmountTooLow(_)
            | AppError::AmountTooHigh(_)
            | AppError::MissingReference
            | AppError::InvalidSignature
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AccountDisabled(_) | AppError::AccountPending | AppError::AccountRejected => {
                StatusCode::FORBIDDEN
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::UserNotFound | AppError::TransactionNotFound => StatusCode::NOT_FOUND,
            AppError::PaystackInitFailed | AppError::Ledger(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingUserId => "MISSING_USER_ID",
            AppError::InvalidAmount => "INVALID_AMOUNT",
            AppError::InvalidEmail => "INVALID_EMAIL",
            AppError::InvalidUserIdFormat => "INVALID_USER_ID_FORMAT",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::AccountDisabled(_) => "ACCOUNT_DISABLED",
            AppError::AccountPending => "ACCOUNT_PENDING",
            AppError::AccountRejected => "ACCOUNT_REJECTED",
            AppError::AmountTooLow(_) => "AMOUNT_TOO_LOW",
            AppError::AmountTooHigh(_) => "AMOUNT_TOO_HIGH",
            AppError::MissingReference => "MISSING_REFERENCE",
            AppError::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            AppError::PaystackInitFailed => "PAYSTACK_INIT_FAILED",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Ledger(_) | AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal detail stays in the logs; the client gets a generic line.
        let message = if status.is_server_error() && !matches!(self, AppError::PaystackInitFailed) {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "success": false,
            "error": message,
            "code": self.code(),
        });

        if let AppError::AccountDisabled(reason) = &self {
            body["disableReason"] = json!(reason);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        assert_eq!(AppError::MissingUserId.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidAmount.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidEmail.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::AmountTooLow("10".parse().unwrap()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn account_state_errors_are_forbidden() {
        assert_eq!(
            AppError::AccountDisabled("fraud".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::AccountPending.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::AccountRejected.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn lookup_failures_are_not_found() {
        assert_eq!(AppError::UserNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::TransactionNotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn codes_match_the_public_contract() {
        assert_eq!(AppError::MissingUserId.code(), "MISSING_USER_ID");
        assert_eq!(AppError::PaystackInitFailed.code(), "PAYSTACK_INIT_FAILED");
        assert_eq!(
            AppError::Ledger(LedgerError::Database("boom".into())).code(),
            "INTERNAL_SERVER_ERROR"
        );
    }

    #[tokio::test]
    async fn disabled_account_response_carries_the_reason() {
        let response = AppError::AccountDisabled("chargeback abuse".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let response = AppError::Internal("connection pool exhausted".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
