use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_gateway::adapters::{self, PostgresLedger};
use wallet_gateway::config::Config;
use wallet_gateway::paystack::PaystackClient;
use wallet_gateway::ports::{LedgerStore, Notifier, PaymentGateway};
use wallet_gateway::services::{DepositService, SmsNotifier};
use wallet_gateway::{AppState, create_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = adapters::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("database migrations completed");

    let ledger: Arc<dyn LedgerStore> = Arc::new(PostgresLedger::new(pool));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackClient::new(
        config.paystack_base_url.clone(),
        config.paystack_secret_key.clone(),
    ));
    let notifier: Arc<dyn Notifier> = Arc::new(SmsNotifier::new(config.clone()));
    let deposits = Arc::new(DepositService::new(
        ledger.clone(),
        gateway,
        notifier,
        config.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        ledger,
        deposits,
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
