use std::cmp::Ordering;

use serde::de::DeserializeOwned;

use super::{ListingState, Page};
use crate::backend::{Backend, BackendError, Direction, Query};
use crate::models::{Role, User, collections};

/// Runs an ordered query; if the backend lacks the index for it, runs it
/// unordered and applies `order` locally, which must agree with the
/// backend's ordering of the indexed query.
pub async fn query_with_fallback<T: DeserializeOwned>(
    backend: &dyn Backend,
    query: &Query,
    order: impl Fn(&T, &T) -> Ordering,
) -> Result<Vec<T>, BackendError> {
    match backend.query_as::<T>(query).await {
        Err(BackendError::MissingIndex(index)) => {
            tracing::warn!("Missing index {}, sorting {} client-side", index, query.collection);
            let mut items = backend.query_as::<T>(&query.unordered()).await?;
            items.sort_by(order);
            Ok(items)
        }
        result => result,
    }
}

fn by_first_name(a: &User, b: &User) -> Ordering {
    a.first_name.cmp(&b.first_name)
}

/// Alumni open to mentoring, by first name.
pub async fn fetch_mentors(backend: &dyn Backend) -> Result<Vec<User>, BackendError> {
    let query = Query::collection(collections::USERS)
        .where_eq("role", Role::Alumni.as_str())
        .where_eq("willingToMentor", true)
        .order_by("firstName", Direction::Asc);
    query_with_fallback(backend, &query, by_first_name).await
}

pub async fn fetch_students(backend: &dyn Backend) -> Result<Vec<User>, BackendError> {
    let query = Query::collection(collections::USERS)
        .where_eq("role", Role::Student.as_str())
        .order_by("firstName", Direction::Asc);
    query_with_fallback(backend, &query, by_first_name).await
}

pub async fn browse_mentors(
    backend: &dyn Backend,
    listing: &ListingState,
) -> Result<Page<User>, BackendError> {
    Ok(listing.apply(&fetch_mentors(backend).await?))
}

pub async fn browse_students(
    backend: &dyn Backend,
    listing: &ListingState,
) -> Result<Page<User>, BackendError> {
    Ok(listing.apply(&fetch_students(backend).await?))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::listing::presets;

    async fn seed(backend: &MemoryBackend) {
        let people = [
            ("u1", "Zoe", "alumni", true, "CS"),
            ("u2", "Adam", "alumni", true, "Math"),
            ("u3", "Mia", "alumni", false, "CS"),
            ("u4", "Ben", "student", false, "CS"),
            ("u5", "Adam", "alumni", true, "CS"),
            ("u6", "Carl", "alumni", true, "CS"),
        ];
        for (id, first, role, mentor, course) in people {
            backend
                .seed(
                    collections::USERS,
                    id,
                    json!({
                        "firstName": first,
                        "lastName": "X",
                        "role": role,
                        "willingToMentor": mentor,
                        "course": course,
                    }),
                )
                .await;
        }
    }

    fn ids(users: &[User]) -> Vec<&str> {
        users.iter().map(|u| u.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_fallback_matches_indexed_ordering() {
        let indexed = MemoryBackend::with_strict_indexes();
        seed(&indexed).await;
        let query = Query::collection(collections::USERS)
            .where_eq("role", "alumni")
            .where_eq("willingToMentor", true)
            .order_by("firstName", Direction::Asc);
        indexed.register_index(&query).await;

        let unindexed = MemoryBackend::with_strict_indexes();
        seed(&unindexed).await;

        let via_index = fetch_mentors(&indexed).await.unwrap();
        let via_fallback = fetch_mentors(&unindexed).await.unwrap();

        assert_eq!(ids(&via_index), vec!["u2", "u5", "u6", "u1"]);
        assert_eq!(via_index, via_fallback);
    }

    #[tokio::test]
    async fn test_browse_mentors_filters_after_fallback() {
        let backend = MemoryBackend::with_strict_indexes();
        seed(&backend).await;

        let mut listing = presets::mentors(10);
        listing.set_filter("course", "CS");
        let page = browse_mentors(&backend, &listing).await.unwrap();

        assert_eq!(ids(&page.items), vec!["u5", "u6", "u1"]);
    }

    #[tokio::test]
    async fn test_students_directory() {
        let backend = MemoryBackend::new();
        seed(&backend).await;

        let page = browse_students(&backend, &presets::student_profiles(10))
            .await
            .unwrap();
        assert_eq!(ids(&page.items), vec!["u4"]);
    }
}
