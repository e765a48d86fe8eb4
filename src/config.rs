use anyhow::Context;
use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use std::env;

use crate::services::fraud::VelocityThresholds;

/// Runtime configuration, loaded once at startup and injected everywhere.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,

    pub paystack_secret_key: String,
    pub paystack_base_url: String,

    /// Service fee applied on top of the base deposit amount (0.03 = 3%).
    pub fee_rate: BigDecimal,
    pub min_deposit: BigDecimal,
    pub max_deposit: BigDecimal,

    pub sms_api_key: String,
    pub sms_sender_id: String,
    pub sms_base_url: String,
    pub admin_phone: String,

    pub admin_api_key: String,

    /// Public base URL of this service, used for gateway callback URLs.
    pub base_url: String,
    /// Frontend origin the callback page redirects back to.
    pub frontend_url: String,

    pub fraud: VelocityThresholds,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "5002".to_string())
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            paystack_secret_key: env::var("PAYSTACK_SECRET_KEY")
                .context("PAYSTACK_SECRET_KEY is required")?,
            paystack_base_url: env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            fee_rate: parse_decimal_env("FEE_RATE", "0.03")?,
            min_deposit: parse_decimal_env("MIN_DEPOSIT", "10")?,
            max_deposit: parse_decimal_env("MAX_DEPOSIT", "50000")?,
            sms_api_key: env::var("MNOTIFY_API_KEY").unwrap_or_default(),
            sms_sender_id: env::var("SMS_SENDER_ID").unwrap_or_else(|_| "DataHustle".to_string()),
            sms_base_url: env::var("SMS_BASE_URL")
                .unwrap_or_else(|_| "https://apps.mnotify.net/smsapi".to_string()),
            admin_phone: env::var("ADMIN_PHONE").unwrap_or_default(),
            admin_api_key: env::var("ADMIN_API_KEY").context("ADMIN_API_KEY is required")?,
            base_url: env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:5002".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            fraud: VelocityThresholds {
                max_deposits_by_ip: parse_i64_env("FRAUD_MAX_DEPOSITS_BY_IP", 10)?,
                max_deposits_by_user: parse_i64_env("FRAUD_MAX_DEPOSITS_BY_USER", 5)?,
                max_large_deposits_by_user: parse_i64_env("FRAUD_MAX_LARGE_DEPOSITS", 2)?,
                large_amount: parse_decimal_env("FRAUD_LARGE_AMOUNT", "5000")?,
                window_hours: parse_i64_env("FRAUD_WINDOW_HOURS", 1)?,
            },
        })
    }
}

fn parse_decimal_env(key: &str, default: &str) -> anyhow::Result<BigDecimal> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<BigDecimal>()
        .with_context(|| format!("{key} must be a decimal number"))
}

fn parse_i64_env(key: &str, default: i64) -> anyhow::Result<i64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("{key} must be an integer")),
        Err(_) => Ok(default),
    }
}
