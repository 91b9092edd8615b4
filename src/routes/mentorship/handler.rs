use axum::{
    Extension,
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    utils::{Claims, success_to_api_response},
};

use super::model::{IncomingRequest, RespondRequest, SendRequest};

#[axum::debug_handler]
pub async fn incoming(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let rows = state.mentorship().incoming(&claims.sub).await?;
    let requests: Vec<IncomingRequest> = rows.iter().map(IncomingRequest::from).collect();
    Ok(success_to_api_response(requests))
}

#[axum::debug_handler]
pub async fn sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let requests = state.mentorship().sent(&claims.sub).await?;
    Ok(success_to_api_response(requests))
}

#[axum::debug_handler]
pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = state
        .mentorship()
        .send_request(&claims.sub, &req.mentor_id, &req.message)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(request)))
}

#[axum::debug_handler]
pub async fn respond(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .mentorship()
        .respond(&request_id, &claims.sub, req.decision)
        .await?;
    Ok(success_to_api_response(outcome))
}
