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
    verification::{Review, Submission, Upload},
};

use super::model::SubmitQuery;

#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SubmitQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    if body.is_empty() {
        return Err(AppError::Validation("document is empty".into()));
    }
    let submission = Submission {
        enrollment_number: query.enrollment_number,
        course: query.course,
        batch: query.batch,
        documents: vec![Upload {
            file_name: query.file_name,
            bytes: body.to_vec(),
        }],
    };
    let request = state.verification().submit(&claims.sub, submission).await?;
    Ok((StatusCode::CREATED, success_to_api_response(request)))
}

#[axum::debug_handler]
pub async fn pending(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let requests = state.verification().pending(&claims.sub).await?;
    Ok(success_to_api_response(requests))
}

#[axum::debug_handler]
pub async fn review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
    Json(review): Json<Review>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .verification()
        .review(&claims.sub, &user_id, review)
        .await?;
    Ok(success_to_api_response(outcome))
}
