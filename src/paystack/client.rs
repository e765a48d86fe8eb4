//! HTTP client for the Paystack transaction API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::ports::{
    GatewayError, InitializeRequest, InitializedPayment, PaymentGateway, VerifiedPayment,
};

pub const GATEWAY_SUCCESS_STATUS: &str = "success";

/// Envelope every Paystack response arrives in.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    status: bool,
    message: Option<String>,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
    reference: String,
}

#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackClient {
    pub fn new(base_url: String, secret_key: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url,
            secret_key,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn unwrap_envelope(
        &self,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, GatewayError> {
        let status = response.status();
        let envelope = response.json::<ApiEnvelope>().await.map_err(|e| {
            GatewayError::InvalidResponse(format!("undecodable response body: {e}"))
        })?;

        if !status.is_success() || !envelope.status {
            let message = envelope
                .message
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(GatewayError::Rejected(message));
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing data field".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, req: &InitializeRequest) -> Result<InitializedPayment, GatewayError> {
        let body = json!({
            "email": req.email,
            "amount": req.amount_minor,
            "currency": "GHS",
            "reference": req.reference,
            "callback_url": req.callback_url,
            "channels": ["card", "bank", "ussd", "qr", "mobile_money"],
            "metadata": {
                "custom_fields": [
                    { "display_name": "User ID", "variable_name": "user_id", "value": req.user_id.to_string() },
                    { "display_name": "Base Amount", "variable_name": "base_amount", "value": req.base_amount.to_string() },
                    { "display_name": "User Name", "variable_name": "user_name", "value": req.user_name },
                ]
            }
        });

        let response = self
            .client
            .post(self.endpoint("/transaction/initialize"))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;

        let data = self.unwrap_envelope(response).await?;
        let init: InitializeData = serde_json::from_value(data)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(InitializedPayment {
            authorization_url: init.authorization_url,
            access_code: init.access_code,
            reference: init.reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/transaction/verify/{reference}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let raw = self.unwrap_envelope(response).await?;
        let verify: VerifyData = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(VerifiedPayment {
            status: verify.status,
            amount_minor: verify.amount,
            reference: verify.reference,
            raw,
        })
    }
}
