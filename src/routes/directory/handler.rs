use axum::{
    extract::{Query, State},
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    listing::{browse_mentors, browse_students, presets},
    routes::ListingParams,
    utils::success_to_api_response,
};

use super::model::DirectoryFilters;

/// Alumni open to mentoring.
#[axum::debug_handler]
pub async fn mentors(
    State(state): State<AppState>,
    Query(filters): Query<DirectoryFilters>,
    Query(params): Query<ListingParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut listing = presets::mentors(state.config.page_size);
    filters.apply_to(&mut listing);
    params.apply_to(&mut listing);
    let page = browse_mentors(state.backend.as_ref(), &listing).await?;
    Ok(success_to_api_response(page))
}

#[axum::debug_handler]
pub async fn students(
    State(state): State<AppState>,
    Query(filters): Query<DirectoryFilters>,
    Query(params): Query<ListingParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut listing = presets::student_profiles(state.config.page_size);
    filters.apply_to(&mut listing);
    params.apply_to(&mut listing);
    let page = browse_students(state.backend.as_ref(), &listing).await?;
    Ok(success_to_api_response(page))
}
