use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::AppError;

/// Guards admin routes with the shared API key. Accepts the key raw or with
/// a `Bearer ` prefix.
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
        .ok_or(AppError::Unauthorized)?;

    if state.config.admin_api_key.is_empty() || provided != state.config.admin_api_key {
        tracing::warn!("rejected admin request with bad api key");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
