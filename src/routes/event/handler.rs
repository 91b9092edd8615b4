use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    events::NewEvent,
    listing::presets,
    routes::ListingParams,
    utils::{Claims, success_to_api_response},
};

use super::model::{EventFilters, RsvpResponse};

#[axum::debug_handler]
pub async fn list_events(
    State(state): State<AppState>,
    Query(filters): Query<EventFilters>,
    Query(params): Query<ListingParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut listing = presets::events(state.config.page_size);
    listing.set_filter("category", filters.category.as_deref().unwrap_or_default());
    params.apply_to(&mut listing);

    let page = state.events().list(&listing, filters.upcoming).await?;
    Ok(success_to_api_response(page))
}

#[axum::debug_handler]
pub async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NewEvent>,
) -> Result<impl IntoResponse, AppError> {
    let event = state.events().create(&claims.sub, req).await?;
    Ok((StatusCode::CREATED, success_to_api_response(event)))
}

#[axum::debug_handler]
pub async fn rsvp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let changed = state.events().rsvp(&event_id, &claims.sub).await?;
    Ok(success_to_api_response(RsvpResponse { changed }))
}

#[axum::debug_handler]
pub async fn cancel_rsvp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let changed = state.events().cancel_rsvp(&event_id, &claims.sub).await?;
    Ok(success_to_api_response(RsvpResponse { changed }))
}
