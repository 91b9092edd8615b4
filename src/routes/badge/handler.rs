use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Extension,
    extract::State,
    http::HeaderMap,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::stream::{self, Stream};

use crate::{
    AppState,
    badge::{UnreadBadge, current_badge},
    error::AppError,
    session::Session,
    utils::{Claims, claims_from_headers, success_to_api_response},
};

use super::model::BadgeResponse;

/// Anonymous callers get 0 rather than an error.
#[axum::debug_handler]
pub async fn current(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let count = match claims_from_headers(&headers, &state.config) {
        Some(claims) => {
            current_badge(state.backend.as_ref(), state.preferences.as_ref(), &claims.sub).await?
        }
        None => 0,
    };
    Ok(success_to_api_response(BadgeResponse { count }))
}

/// Server-sent events carrying the badge count each time it changes.
#[axum::debug_handler]
pub async fn stream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = Session::new();
    let badge = UnreadBadge::spawn(
        state.backend.clone(),
        state.preferences.clone(),
        session.subscribe(),
    );
    session.sign_in(claims.sub);
    let counts = badge.subscribe();

    // The session and badge live as long as the client stays connected.
    let events = stream::unfold(
        (session, badge, counts, true),
        |(session, badge, mut counts, first)| async move {
            if !first && counts.changed().await.is_err() {
                return None;
            }
            let count = *counts.borrow_and_update();
            let event = Event::default().event("badge").data(count.to_string());
            Some((Ok(event), (session, badge, counts, false)))
        },
    );

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
