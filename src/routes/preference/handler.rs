use axum::{
    Extension,
    extract::{Json, State},
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    preferences::NotificationPreferences,
    utils::{Claims, success_to_api_response},
};

#[axum::debug_handler]
pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let preferences = state.preferences.load(&claims.sub).await?;
    Ok(success_to_api_response(preferences))
}

/// Merges the submitted switches into the stored ones; unmentioned
/// switches keep their value.
#[axum::debug_handler]
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(changes): Json<NotificationPreferences>,
) -> Result<impl IntoResponse, AppError> {
    let mut preferences = state.preferences.load(&claims.sub).await?;
    preferences.merge(&changes);
    state.preferences.save(&claims.sub, &preferences).await?;
    tracing::debug!("Preferences of {} updated", claims.sub);
    Ok(success_to_api_response(preferences))
}
