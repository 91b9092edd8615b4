use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::backend::{Backend, Direction, Query, encode};
use crate::error::AppError;
use crate::listing::{ListingState, Page};
use crate::models::{Event, Role, User, collections};

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    pub date: DateTime<Utc>,
}

pub struct EventService {
    backend: Arc<dyn Backend>,
}

impl EventService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Events are organized by alumni and admins.
    pub async fn create(&self, organizer_id: &str, new: NewEvent) -> Result<Event, AppError> {
        let organizer = self
            .backend
            .get_as::<User>(collections::USERS, organizer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {organizer_id}")))?;
        if organizer.role == Role::Student {
            return Err(AppError::PermissionDenied(
                "students cannot organize events".into(),
            ));
        }
        let title = new.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("event title is required".into()));
        }

        let mut event = Event {
            title: title.to_string(),
            description: new.description.trim().to_string(),
            category: new.category.trim().to_string(),
            location: new.location.trim().to_string(),
            date: new.date,
            organizer_id: organizer_id.to_string(),
            attendees: Vec::new(),
            created_at: Utc::now(),
            ..Default::default()
        };
        event.id = self
            .backend
            .create(collections::EVENTS, None, encode(&event)?)
            .await?;
        tracing::info!("Event {} scheduled for {}", event.id, event.date);
        Ok(event)
    }

    /// Registers attendance. Returns whether the user was newly added.
    pub async fn rsvp(&self, event_id: &str, user_id: &str) -> Result<bool, AppError> {
        Ok(self
            .backend
            .array_union(collections::EVENTS, event_id, "attendees", Value::from(user_id))
            .await?)
    }

    pub async fn cancel_rsvp(&self, event_id: &str, user_id: &str) -> Result<bool, AppError> {
        Ok(self
            .backend
            .array_remove(collections::EVENTS, event_id, "attendees", Value::from(user_id))
            .await?)
    }

    pub async fn list(
        &self,
        listing: &ListingState,
        upcoming_only: bool,
    ) -> Result<Page<Event>, AppError> {
        let mut query = Query::collection(collections::EVENTS).order_by("date", Direction::Asc);
        if upcoming_only {
            query = query.where_gte("date", Utc::now().to_rfc3339());
        }
        let events = self.backend.query_as::<Event>(&query).await?;
        Ok(listing.apply(&events))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::listing::presets;

    async fn setup() -> (Arc<MemoryBackend>, EventService) {
        let backend = Arc::new(MemoryBackend::with_strict_indexes());
        backend
            .seed(collections::USERS, "alum", json!({"firstName": "Al", "role": "alumni"}))
            .await;
        backend
            .seed(collections::USERS, "stu", json!({"firstName": "St", "role": "student"}))
            .await;
        (backend.clone(), EventService::new(backend))
    }

    fn new_event(title: &str, days_from_now: i64) -> NewEvent {
        NewEvent {
            title: title.into(),
            description: String::new(),
            category: "networking".into(),
            location: "Hall A".into(),
            date: Utc::now() + Duration::days(days_from_now),
        }
    }

    #[tokio::test]
    async fn test_rsvp_is_idempotent() {
        let (backend, service) = setup().await;
        let event = service.create("alum", new_event("Meetup", 3)).await.unwrap();

        assert!(service.rsvp(&event.id, "stu").await.unwrap());
        assert!(!service.rsvp(&event.id, "stu").await.unwrap());

        let stored: Event = backend
            .get(collections::EVENTS, &event.id)
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(stored.attendees, vec!["stu"]);

        assert!(service.cancel_rsvp(&event.id, "stu").await.unwrap());
        assert!(!service.cancel_rsvp(&event.id, "stu").await.unwrap());
    }

    #[tokio::test]
    async fn test_students_cannot_organize() {
        let (_, service) = setup().await;
        assert!(matches!(
            service.create("stu", new_event("Party", 1)).await,
            Err(AppError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_upcoming_listing_in_date_order() {
        let (_, service) = setup().await;
        service.create("alum", new_event("Later", 10)).await.unwrap();
        service.create("alum", new_event("Past", -2)).await.unwrap();
        service.create("alum", new_event("Soon", 1)).await.unwrap();

        let page = service.list(&presets::events(9), true).await.unwrap();
        let titles: Vec<_> = page.items.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Soon", "Later"]);

        let all = service.list(&presets::events(9), false).await.unwrap();
        assert_eq!(all.total_items, 3);
    }
}
