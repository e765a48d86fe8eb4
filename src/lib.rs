pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod paystack;
pub mod ports;
pub mod services;

#[cfg(test)]
pub mod testing;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Config>,
    pub ledger: Arc<dyn ports::LedgerStore>,
    pub deposits: Arc<services::DepositService>,
}

pub fn create_app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/fraud-alerts", get(handlers::admin::fraud_alerts))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/deposit", post(handlers::deposit::initiate_deposit))
        .route("/callback", get(handlers::payment::callback))
        .route("/paystack/webhook", post(handlers::payment::webhook))
        .route("/verify-payment", get(handlers::payment::verify_payment))
        .route(
            "/verify-pending-transaction/:transaction_id",
            post(handlers::payment::verify_pending),
        )
        .route(
            "/user-transactions/:user_id",
            get(handlers::transactions::user_transactions),
        )
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
