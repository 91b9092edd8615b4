use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    forum::NewThread,
    listing::presets,
    utils::{Claims, success_to_api_response},
};

use super::model::{ContentRequest, ThreadListQuery};

#[axum::debug_handler]
pub async fn list_threads(
    State(state): State<AppState>,
    Query(query): Query<ThreadListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut listing = presets::forum_threads(state.config.page_size);
    listing.set_filter("category", query.category.as_deref().unwrap_or_default());
    listing.set_filter("tags", query.tag.as_deref().unwrap_or_default());
    if let Some(search) = &query.search {
        listing.set_search(search);
    }
    if let Some(sort) = query.sort {
        listing.set_sort(sort.sort_spec());
    }
    if let Some(page) = query.page {
        listing.set_page(page);
    }

    let page = state.forum().list_threads(&listing).await?;
    Ok(success_to_api_response(page))
}

#[axum::debug_handler]
pub async fn create_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NewThread>,
) -> Result<impl IntoResponse, AppError> {
    let thread = state.forum().create_thread(&claims.sub, req).await?;
    Ok((StatusCode::CREATED, success_to_api_response(thread)))
}

#[axum::debug_handler]
pub async fn view_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.forum().view_thread(&thread_id).await?;
    Ok(success_to_api_response(view))
}

#[axum::debug_handler]
pub async fn like_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .forum()
        .toggle_thread_like(&thread_id, &claims.sub)
        .await?;
    Ok(success_to_api_response(outcome))
}

#[axum::debug_handler]
pub async fn reply(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let post = state
        .forum()
        .reply(&thread_id, &claims.sub, &req.content)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(post)))
}

#[axum::debug_handler]
pub async fn like_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.forum().toggle_post_like(&post_id, &claims.sub).await?;
    Ok(success_to_api_response(outcome))
}

#[axum::debug_handler]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let comments = state.forum().comments(&post_id).await?;
    Ok(success_to_api_response(comments))
}

#[axum::debug_handler]
pub async fn comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let comment = state
        .forum()
        .comment(&post_id, &claims.sub, &req.content)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(comment)))
}
