//! Deposit orchestrator.
//!
//! Coordinates the ledger, the payment gateway and the notification sink to
//! (a) initiate a deposit and hand back a checkout URL, and (b) reconcile
//! gateway webhooks/callbacks/polling into at-most-one wallet credit per
//! reference. The idempotent claim in [`reconcile`] is the crux: whichever
//! trigger wins the claim finalizes the transaction, everyone else observes
//! "already processed".

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::domain::transaction::{STATUS_COMPLETED, STATUS_PENDING};
use crate::domain::user::{APPROVAL_PENDING, APPROVAL_REJECTED};
use crate::domain::{Transaction, User};
use crate::error::AppError;
use crate::paystack::client::GATEWAY_SUCCESS_STATUS;
use crate::ports::{
    GatewayError, InitializeRequest, LedgerError, LedgerStore, Notifier, PaymentGateway,
};
use crate::services::fraud;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub user_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositInfo {
    pub base_amount: BigDecimal,
    pub fee: BigDecimal,
    pub total_amount: BigDecimal,
    pub paystack_amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub success: bool,
    pub message: String,
    pub paystack_url: String,
    pub reference: String,
    pub deposit_info: DepositInfo,
}

/// Result of one reconciliation attempt. Not an error type: a reference that
/// was already settled by a concurrent caller is a normal outcome.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub success: bool,
    pub message: String,
    pub new_balance: Option<BigDecimal>,
}

impl ReconcileOutcome {
    fn succeeded(message: impl Into<String>, new_balance: BigDecimal) -> Self {
        Self {
            success: true,
            message: message.into(),
            new_balance: Some(new_balance),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            new_balance: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    pub reference: String,
    pub amount: BigDecimal,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_before: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_change: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<BigDecimal>,
}

#[derive(Debug, Serialize)]
pub struct PaymentVerification {
    pub success: bool,
    pub message: String,
    pub data: VerificationData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudAlert {
    pub reference: String,
    pub user: Option<FraudAlertUser>,
    pub amount: BigDecimal,
    pub expected_amount: Option<String>,
    pub actual_amount_paid: Option<String>,
    pub fraud_reason: Option<String>,
    pub detected_at: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub ip: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudAlertUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: String,
}

/// Everything that can abort a claimed settlement. The caller maps any of
/// these to a failed transaction with the lock released.
#[derive(Error, Debug)]
enum SettleError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub struct DepositService {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
}

impl DepositService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            ledger,
            gateway,
            notifier,
            config,
        }
    }

    /// Validates the request, records a pending transaction and initializes
    /// the gateway checkout. No wallet mutation happens here.
    pub async fn initiate_deposit(
        &self,
        request: DepositRequest,
        client_ip: &str,
        user_agent: Option<&str>,
    ) -> Result<DepositReceipt, AppError> {
        let user_id_raw = request
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AppError::MissingUserId)?;

        let amount = request
            .amount
            .clone()
            .filter(|a| *a > BigDecimal::from(0))
            .ok_or(AppError::InvalidAmount)?;

        let email = request
            .email
            .as_deref()
            .filter(|e| e.contains('@'))
            .ok_or(AppError::InvalidEmail)?
            .to_string();

        let user_id =
            Uuid::parse_str(user_id_raw).map_err(|_| AppError::InvalidUserIdFormat)?;

        let user = self
            .ledger
            .get_user(user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        if user.is_disabled {
            let reason = user
                .disable_reason
                .clone()
                .unwrap_or_else(|| "No reason provided".to_string());
            return Err(AppError::AccountDisabled(reason));
        }
        match user.approval_status.as_str() {
            APPROVAL_PENDING => return Err(AppError::AccountPending),
            APPROVAL_REJECTED => return Err(AppError::AccountRejected),
            _ => {}
        }

        if amount < self.config.min_deposit {
            return Err(AppError::AmountTooLow(self.config.min_deposit.clone()));
        }
        if amount > self.config.max_deposit {
            return Err(AppError::AmountTooHigh(self.config.max_deposit.clone()));
        }

        let fee = amount.clone() * self.config.fee_rate.clone();
        let total = amount.clone() + fee.clone();
        let paystack_amount = (total.clone() * BigDecimal::from(100))
            .with_scale(0)
            .to_i64()
            .ok_or_else(|| AppError::Internal("deposit total out of range".to_string()))?;

        // Annotates metadata only; a hot IP never blocks the deposit.
        let report =
            fraud::check_suspicious(self.ledger.as_ref(), &self.config.fraud, user_id, client_ip)
                .await;

        let reference = format!(
            "DEP-{}-{}",
            Uuid::new_v4().simple(),
            Utc::now().timestamp_millis()
        );

        let metadata = json!({
            "expected_gateway_amount": total.to_string(),
            "fee": fee.to_string(),
            // The fee rate is versioned per transaction so pending deposits
            // are reconciled against the rate they were created under.
            "fee_rate": self.config.fee_rate.to_string(),
            "base_amount": amount.to_string(),
            "ip": client_ip,
            "user_agent": user_agent,
            "suspicious": report.is_suspicious,
            "suspicious_metrics": report.metrics,
            "initiated_at": Utc::now(),
        });

        let tx = Transaction::new_deposit(
            user_id,
            amount.clone(),
            user.wallet_balance.clone(),
            reference.clone(),
            metadata,
        );
        let tx = self.ledger.insert_transaction(&tx).await?;
        tracing::info!(%reference, %user_id, %amount, "deposit transaction recorded");

        let init = InitializeRequest {
            email,
            amount_minor: paystack_amount,
            reference: reference.clone(),
            callback_url: format!("{}/callback?reference={}", self.config.base_url, reference),
            user_id,
            user_name: user.name.clone(),
            base_amount: amount.clone(),
        };

        match self.gateway.initialize(&init).await {
            Ok(payment) => Ok(DepositReceipt {
                success: true,
                message: "Deposit initiated successfully".to_string(),
                paystack_url: payment.authorization_url,
                reference,
                deposit_info: DepositInfo {
                    base_amount: amount,
                    fee,
                    total_amount: total,
                    paystack_amount,
                },
            }),
            Err(err) => {
                tracing::error!(%reference, error = %err, "gateway initialization failed");
                let meta = json!({
                    "gateway_error": err.to_string(),
                    "failed_at": Utc::now(),
                });
                if let Err(db_err) = self.ledger.fail_transaction(tx.id, &meta).await {
                    tracing::error!(%reference, error = %db_err, "failed to mark transaction failed");
                }
                Err(AppError::PaystackInitFailed)
            }
        }
    }

    /// Settles a reference: claim, verify with the gateway, fraud-check the
    /// paid amount, credit the wallet, notify. Safe to call any number of
    /// times from any number of concurrent triggers.
    pub async fn reconcile(&self, reference: &str) -> ReconcileOutcome {
        let claimed = match self.ledger.claim_pending(reference).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                tracing::debug!(reference, "not found or already processed");
                return ReconcileOutcome::failed("Transaction not found or already processed");
            }
            Err(err) => {
                tracing::error!(reference, error = %err, "claim failed");
                return ReconcileOutcome::failed("Payment processing error");
            }
        };

        match self.settle_claimed(&claimed).await {
            Ok(outcome) => outcome,
            Err(err) => {
                // Guaranteed cleanup: any error after the claim marks the
                // transaction failed and releases the lock, otherwise the
                // reference would be stuck in processing forever.
                tracing::error!(reference, error = %err, "payment processing error");
                let meta = json!({
                    "error": err.to_string(),
                    "failed_at": Utc::now(),
                });
                if let Err(db_err) = self.ledger.fail_transaction(claimed.id, &meta).await {
                    tracing::error!(reference, error = %db_err, "failed to release claim");
                }
                ReconcileOutcome::failed("Payment processing error")
            }
        }
    }

    async fn settle_claimed(&self, tx: &Transaction) -> Result<ReconcileOutcome, SettleError> {
        let verified = self.gateway.verify(&tx.reference).await?;
        let actual_paid = BigDecimal::from(verified.amount_minor) / BigDecimal::from(100);
        let expected = self.expected_gateway_amount(tx);

        tracing::info!(
            reference = %tx.reference,
            %expected,
            %actual_paid,
            gateway_status = %verified.status,
            "payment verification"
        );

        if !fraud::amount_within_tolerance(&expected, &actual_paid) {
            tracing::error!(
                reference = %tx.reference,
                %expected,
                %actual_paid,
                user_id = %tx.user_id,
                "fraud detected: gateway amount mismatch"
            );
            let meta = json!({
                "fraud_detected": true,
                "fraud_reason": "Amount mismatch between expected and gateway-confirmed totals",
                "expected_amount": expected.to_string(),
                "actual_amount_paid": actual_paid.to_string(),
                "fraud_detected_at": Utc::now(),
                "gateway_payload": verified.raw,
            });
            self.ledger.fail_transaction(tx.id, &meta).await?;

            if let Ok(Some(user)) = self.ledger.get_user(tx.user_id).await {
                let alert = self
                    .notifier
                    .fraud_alert(&user, &tx.reference, &expected, &actual_paid)
                    .await;
                if !alert.success {
                    tracing::warn!(reference = %tx.reference, "fraud alert sms failed");
                }
            }
            return Ok(ReconcileOutcome::failed("Payment verification failed"));
        }

        if verified.status != GATEWAY_SUCCESS_STATUS {
            tracing::warn!(
                reference = %tx.reference,
                gateway_status = %verified.status,
                "payment not successful"
            );
            let meta = json!({
                "gateway_status": verified.status,
                "gateway_payload": verified.raw,
                "failed_at": Utc::now(),
            });
            self.ledger.fail_transaction(tx.id, &meta).await?;
            return Ok(ReconcileOutcome::failed(format!(
                "Payment not successful: {}",
                verified.status
            )));
        }

        let user = match self.ledger.get_user(tx.user_id).await? {
            Some(user) => user,
            None => {
                tracing::error!(reference = %tx.reference, "user missing for claimed transaction");
                self.ledger.release_claim(tx.id).await?;
                return Ok(ReconcileOutcome::failed("User not found"));
            }
        };

        // Atomic increment returning the live balance: balance_before is
        // derived from it rather than the snapshot taken at initiation, so
        // external balance drift cannot corrupt the arithmetic.
        let new_balance = self.ledger.credit_wallet(tx.user_id, &tx.amount).await?;
        let balance_before = new_balance.clone() - tx.amount.clone();

        let meta = json!({
            "gateway_payload": verified.raw,
            "verified_at": Utc::now(),
        });
        self.ledger
            .complete_transaction(tx.id, &balance_before, &new_balance, &meta)
            .await?;

        tracing::info!(
            reference = %tx.reference,
            %balance_before,
            %new_balance,
            "transaction completed"
        );

        let notify = self
            .notifier
            .deposit_success(&user, &tx.amount, &new_balance)
            .await;
        if !notify.success {
            tracing::warn!(
                reference = %tx.reference,
                error = ?notify.error,
                "deposit sms failed"
            );
        }

        Ok(ReconcileOutcome::succeeded("Deposit successful", new_balance))
    }

    /// Expected fee-inclusive gateway charge. Stored at initiation; for
    /// legacy rows missing it, recomputed from the fee rate the transaction
    /// was created under, falling back to the configured rate only when that
    /// is missing too.
    fn expected_gateway_amount(&self, tx: &Transaction) -> BigDecimal {
        if let Some(expected) = tx.metadata_decimal("expected_gateway_amount") {
            return expected;
        }
        let rate = tx
            .metadata_decimal("fee_rate")
            .unwrap_or_else(|| self.config.fee_rate.clone());
        tracing::warn!(
            reference = %tx.reference,
            "transaction missing expected amount, recomputing from fee rate {rate}"
        );
        tx.amount.clone() + tx.amount.clone() * rate
    }

    /// Poll-style verification: completed references are answered from the
    /// ledger without touching the gateway again.
    pub async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification, AppError> {
        let tx = self
            .ledger
            .get_by_reference(reference)
            .await?
            .ok_or(AppError::TransactionNotFound)?;

        if tx.is_completed() {
            return Ok(PaymentVerification {
                success: true,
                message: "Payment verified".to_string(),
                data: Self::settled_data(&tx, None),
            });
        }

        if tx.is_pending() {
            let outcome = self.reconcile(reference).await;
            if outcome.success {
                let updated = self
                    .ledger
                    .get_by_reference(reference)
                    .await?
                    .ok_or(AppError::TransactionNotFound)?;
                return Ok(PaymentVerification {
                    success: true,
                    message: "Payment verified successfully".to_string(),
                    data: Self::settled_data(&updated, outcome.new_balance),
                });
            }
            // Re-read so the caller sees the post-reconcile status.
            let current = self.ledger.get_by_reference(reference).await?.unwrap_or(tx);
            return Ok(PaymentVerification {
                success: false,
                message: outcome.message,
                data: Self::bare_data(&current),
            });
        }

        Ok(PaymentVerification {
            success: false,
            message: format!("Payment status: {}", tx.status),
            data: Self::bare_data(&tx),
        })
    }

    /// Manual trigger by transaction id; same reconcile underneath.
    pub async fn verify_pending_by_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<PaymentVerification, AppError> {
        let tx = self
            .ledger
            .get_transaction(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound)?;

        if tx.status != STATUS_PENDING {
            return Ok(PaymentVerification {
                success: false,
                message: format!("Transaction is already {}", tx.status),
                data: Self::bare_data(&tx),
            });
        }

        let outcome = self.reconcile(&tx.reference).await;
        if outcome.success {
            let updated = self
                .ledger
                .get_transaction(transaction_id)
                .await?
                .ok_or(AppError::TransactionNotFound)?;
            Ok(PaymentVerification {
                success: true,
                message: "Transaction verified successfully".to_string(),
                data: Self::settled_data(&updated, outcome.new_balance),
            })
        } else {
            let current = self
                .ledger
                .get_transaction(transaction_id)
                .await?
                .unwrap_or(tx);
            Ok(PaymentVerification {
                success: false,
                message: outcome.message,
                data: Self::bare_data(&current),
            })
        }
    }

    pub async fn fraud_alerts(&self, limit: i64) -> Result<Vec<FraudAlert>, AppError> {
        let transactions = self.ledger.list_fraud_alerts(limit).await?;

        let mut alerts = Vec::with_capacity(transactions.len());
        for tx in &transactions {
            let user = self.ledger.get_user(tx.user_id).await?.map(|u| FraudAlertUser {
                id: u.id,
                name: u.name,
                email: u.email,
                phone_number: u.phone_number,
            });
            alerts.push(FraudAlert {
                reference: tx.reference.clone(),
                user,
                amount: tx.amount.clone(),
                expected_amount: tx.metadata_str("expected_amount").map(str::to_string),
                actual_amount_paid: tx.metadata_str("actual_amount_paid").map(str::to_string),
                fraud_reason: tx.metadata_str("fraud_reason").map(str::to_string),
                detected_at: tx.metadata_str("fraud_detected_at").map(str::to_string),
                created_at: tx.created_at,
                ip: tx.metadata_str("ip").map(str::to_string),
            });
        }
        Ok(alerts)
    }

    fn settled_data(tx: &Transaction, new_balance: Option<BigDecimal>) -> VerificationData {
        VerificationData {
            transaction_id: Some(tx.id),
            reference: tx.reference.clone(),
            amount: tx.amount.clone(),
            status: STATUS_COMPLETED.to_string(),
            balance_before: Some(tx.balance_before.clone()),
            balance_after: Some(tx.balance_after.clone()),
            balance_change: Some(tx.balance_after.clone() - tx.balance_before.clone()),
            new_balance,
        }
    }

    fn bare_data(tx: &Transaction) -> VerificationData {
        VerificationData {
            transaction_id: Some(tx.id),
            reference: tx.reference.clone(),
            amount: tx.amount.clone(),
            status: tx.status.clone(),
            balance_before: None,
            balance_after: None,
            balance_change: None,
            new_balance: None,
        }
    }
}
