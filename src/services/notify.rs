//! SMS notification sink (mNotify).
//!
//! Strictly fire-and-forget: a failed SMS must never roll back a completed
//! financial transaction, so every failure is logged and swallowed here.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use std::sync::Arc;

use crate::config::Config;
use crate::domain::User;
use crate::ports::{Notifier, NotifyOutcome};

/// Gateway response code, normalized from the three shapes mNotify actually
/// returns: a bare number, a digit-bearing string, or `{"code": ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsResponse {
    Sent,
    Scheduled,
    Error(u64),
    Unknown,
}

pub fn parse_response_code(body: &str) -> SmsResponse {
    let code = match serde_json::from_str::<serde_json::Value>(body.trim()) {
        Ok(serde_json::Value::Number(n)) => n.as_u64(),
        Ok(serde_json::Value::Object(map)) => map.get("code").and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => first_digit_run(s),
            _ => None,
        }),
        Ok(serde_json::Value::String(s)) => first_digit_run(&s),
        _ => first_digit_run(body),
    };

    match code {
        Some(1000) => SmsResponse::Sent,
        Some(1007) => SmsResponse::Scheduled,
        Some(other) => SmsResponse::Error(other),
        None => SmsResponse::Unknown,
    }
}

fn first_digit_run(s: &str) -> Option<u64> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Normalizes a Ghanaian phone number to international format (233...).
/// Returns `None` when the result is too short to be routable.
pub fn normalize_ghana_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let normalized = if let Some(rest) = digits.strip_prefix('0') {
        format!("233{rest}")
    } else if digits.starts_with("233") {
        digits
    } else {
        format!("233{digits}")
    };

    if normalized.len() < 12 {
        return None;
    }
    Some(normalized)
}

#[derive(Clone)]
pub struct SmsNotifier {
    client: Client,
    config: Arc<Config>,
}

impl SmsNotifier {
    pub fn new(config: Arc<Config>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn send(&self, to: &str, message: &str) -> NotifyOutcome {
        let Some(phone) = normalize_ghana_phone(to) else {
            tracing::warn!(to, "sms skipped: unroutable phone number");
            return NotifyOutcome::failed("invalid phone number format");
        };

        let request = self.client.get(&self.config.sms_base_url).query(&[
            ("key", self.config.sms_api_key.as_str()),
            ("to", phone.as_str()),
            ("msg", message),
            ("sender_id", self.config.sms_sender_id.as_str()),
        ]);

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::error!(error = %err, "sms request failed");
                return NotifyOutcome::failed(err.to_string());
            }
        };

        let http_status = response.status();
        let body = response.text().await.unwrap_or_default();

        match parse_response_code(&body) {
            SmsResponse::Sent | SmsResponse::Scheduled => NotifyOutcome::ok(),
            SmsResponse::Error(code) => {
                tracing::error!(code, "sms gateway returned an error code");
                NotifyOutcome::failed(format!("sms gateway error code {code}"))
            }
            SmsResponse::Unknown if http_status.is_success() => NotifyOutcome::ok(),
            SmsResponse::Unknown => {
                tracing::error!(%http_status, body, "unrecognized sms gateway response");
                NotifyOutcome::failed("unrecognized sms gateway response")
            }
        }
    }
}

#[async_trait]
impl Notifier for SmsNotifier {
    async fn deposit_success(
        &self,
        user: &User,
        amount: &BigDecimal,
        new_balance: &BigDecimal,
    ) -> NotifyOutcome {
        let message = format!(
            "Hello {}! Your account has been credited with GHS {}. New balance: GHS {}. Thank you!",
            user.name,
            amount.with_scale(2),
            new_balance.with_scale(2),
        );
        let outcome = self.send(&user.phone_number, &message).await;
        if outcome.success {
            tracing::info!(phone = %user.phone_number, "deposit sms sent");
        }
        outcome
    }

    async fn fraud_alert(
        &self,
        user: &User,
        reference: &str,
        expected: &BigDecimal,
        actual: &BigDecimal,
    ) -> NotifyOutcome {
        let message = format!(
            "FRAUD ALERT. User: {} ({}). Ref: {}. Expected: GHS {}, Paid: GHS {}",
            user.name,
            user.phone_number,
            reference,
            expected.with_scale(2),
            actual.with_scale(2),
        );
        self.send(&self.config.admin_phone, &message).await
    }
}
