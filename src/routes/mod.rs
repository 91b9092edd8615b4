use axum::{
    Router,
    routing::{get, post},
};
use serde::Deserialize;

use crate::{
    AppState,
    listing::{ListingState, SortSpec},
    middleware::{auth_middleware, log_errors},
};

pub mod badge;
pub mod chat;
pub mod directory;
pub mod event;
pub mod forum;
pub mod mentorship;
pub mod preference;
pub mod verification;

/// Query parameters shared by every browsing surface. Filters not listed
/// here are handled by the surface's own parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListingParams {
    pub page: Option<usize>,
    pub search: Option<String>,
    /// Field name, prefixed with `-` for descending.
    pub sort: Option<String>,
}

impl ListingParams {
    pub fn apply_to(&self, listing: &mut ListingState) {
        if let Some(search) = &self.search {
            listing.set_search(search);
        }
        if let Some(sort) = self.sort.as_deref().filter(|s| !s.is_empty()) {
            listing.set_sort(match sort.strip_prefix('-') {
                Some(field) => SortSpec::desc(field),
                None => SortSpec::asc(sort),
            });
        }
        // Paging last: any filter, search or sort change resets to page 1.
        if let Some(page) = self.page {
            listing.set_page(page);
        }
    }
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/badge", get(badge::current));

    let protected_routes = Router::new()
        .route("/badge/stream", get(badge::stream))
        // Messaging
        .route("/chats", get(chat::list_chats).post(chat::open_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route("/chats/{chat_id}/attachments", post(chat::send_attachment))
        .route("/chats/{chat_id}/read", post(chat::mark_read))
        // Forum
        .route(
            "/forum/threads",
            get(forum::list_threads).post(forum::create_thread),
        )
        .route("/forum/threads/{thread_id}", get(forum::view_thread))
        .route("/forum/threads/{thread_id}/like", post(forum::like_thread))
        .route("/forum/threads/{thread_id}/posts", post(forum::reply))
        .route("/forum/posts/{post_id}/like", post(forum::like_post))
        .route(
            "/forum/posts/{post_id}/comments",
            get(forum::list_comments).post(forum::comment),
        )
        // Directories
        .route("/mentors", get(directory::mentors))
        .route("/students", get(directory::students))
        // Events
        .route("/events", get(event::list_events).post(event::create_event))
        .route(
            "/events/{event_id}/rsvp",
            post(event::rsvp).delete(event::cancel_rsvp),
        )
        // Mentorship
        .route("/mentorship/incoming", get(mentorship::incoming))
        .route("/mentorship/sent", get(mentorship::sent))
        .route("/mentorship/requests", post(mentorship::send_request))
        .route(
            "/mentorship/requests/{request_id}/respond",
            post(mentorship::respond),
        )
        // Preferences
        .route(
            "/preferences",
            get(preference::get_preferences).put(preference::update_preferences),
        )
        // Verification
        .route("/verification", post(verification::submit))
        .route("/admin/verification", get(verification::pending))
        .route("/admin/verification/{user_id}", post(verification::review))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new().merge(public_routes).merge(protected_routes);
    let base_uri = state.config.api_base_uri.trim_end_matches('/').to_string();
    let router = if base_uri.is_empty() {
        api
    } else {
        Router::new().nest(&base_uri, api)
    };

    router
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{
        backend::MemoryBackend, config::Config, listing::presets,
        preferences::MemoryPreferenceStore, reporting::TracingReporter,
    };

    fn state(api_base_uri: &str) -> AppState {
        AppState {
            config: Config {
                redis_url: "redis://127.0.0.1/".into(),
                jwt_secret: "router-test-secret".into(),
                server_host: "127.0.0.1".into(),
                server_port: 0,
                api_base_uri: api_base_uri.into(),
                page_size: 9,
                side_effect_attempts: 1,
                side_effect_backoff_ms: 0,
                seed_file: None,
            },
            backend: Arc::new(MemoryBackend::new()),
            preferences: Arc::new(MemoryPreferenceStore::new()),
            reporter: Arc::new(TracingReporter::new()),
        }
    }

    #[tokio::test]
    async fn test_root_base_uri_mounts_at_root() {
        for base in ["/", ""] {
            let response = router(state(base))
                .oneshot(Request::get("/badge").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router(state("/api/"))
            .oneshot(Request::get("/api/badge").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_listing_params() {
        let params = ListingParams {
            page: Some(2),
            search: Some("rust".into()),
            sort: Some("-likes".into()),
        };
        let mut listing = presets::forum_threads(9);
        params.apply_to(&mut listing);

        assert_eq!(listing.page(), 2);
        assert_eq!(listing.sort(), Some(&SortSpec::desc("likes")));
    }
}
