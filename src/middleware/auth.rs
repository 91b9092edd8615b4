use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{AppState, error::AppError, utils::claims_from_headers};

/// Rejects requests without a valid bearer token; otherwise makes the
/// token's `Claims` available to handlers as an extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims =
        claims_from_headers(req.headers(), &state.config).ok_or(AppError::Unauthorized)?;
    tracing::debug!("{} {} as {}", req.method(), req.uri().path(), claims.sub);

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
