use axum::{
    Extension,
    body::Bytes,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    utils::{Claims, success_to_api_response},
};

use super::model::{AttachmentQuery, MarkReadResponse, OpenChatRequest, SendMessageRequest};

#[axum::debug_handler]
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let chats = state.messenger().chat_list(&claims.sub).await?;
    Ok(success_to_api_response(chats))
}

#[axum::debug_handler]
pub async fn open_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let chat = state
        .messenger()
        .open_chat(&claims.sub, &req.other_user_id)
        .await?;
    Ok(success_to_api_response(chat))
}

#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let messages = state.messenger().messages(&chat_id, &claims.sub).await?;
    Ok(success_to_api_response(messages))
}

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = state
        .messenger()
        .send_text(&chat_id, &claims.sub, &req.text)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(message)))
}

#[axum::debug_handler]
pub async fn send_attachment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Query(query): Query<AttachmentQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    if body.is_empty() {
        return Err(AppError::Validation("attachment is empty".into()));
    }
    let message = state
        .messenger()
        .send_attachment(&chat_id, &claims.sub, &query.file_name, body.to_vec(), query.kind)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(message)))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let changed = state.messenger().mark_read(&chat_id, &claims.sub).await?;
    Ok(success_to_api_response(MarkReadResponse { changed }))
}
