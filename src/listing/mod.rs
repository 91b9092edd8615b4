//! Client-side filtering, search, sorting and paging over a fully fetched
//! collection.
//!
//! Filters are AND-combined equality checks where an empty value matches
//! everything. Search is a case-insensitive substring test over a fixed set
//! of fields. Sorting is stable, so ties keep collection order. Any change to
//! filters, search or sort goes back to page 1.

mod directory;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::Direction;
use crate::models::{Event, ForumThread, User};

pub use directory::{browse_mentors, browse_students, fetch_mentors, fetch_students, query_with_fallback};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(Cow<'a, str>),
    List(&'a [String]),
    Number(i64),
    Flag(bool),
    Time(DateTime<Utc>),
    Missing,
}

impl<'a> FieldValue<'a> {
    fn text(value: &'a str) -> Self {
        FieldValue::Text(Cow::Borrowed(value))
    }

    fn optional(value: Option<&'a String>) -> Self {
        value.map_or(FieldValue::Missing, |v| FieldValue::text(v))
    }

    fn equals(&self, expected: &str) -> bool {
        match self {
            FieldValue::Text(text) => text.as_ref() == expected,
            FieldValue::List(items) => items.iter().any(|item| item == expected),
            FieldValue::Number(n) => n.to_string() == expected,
            FieldValue::Flag(flag) => flag.to_string() == expected,
            FieldValue::Time(_) | FieldValue::Missing => false,
        }
    }

    fn contains(&self, needle: &str) -> bool {
        match self {
            FieldValue::Text(text) => text.to_lowercase().contains(needle),
            FieldValue::List(items) => items.iter().any(|item| item.to_lowercase().contains(needle)),
            _ => false,
        }
    }

    fn compare(&self, other: &FieldValue<'_>) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (FieldValue::Number(a), FieldValue::Number(b)) => a.cmp(b),
            (FieldValue::Flag(a), FieldValue::Flag(b)) => a.cmp(b),
            (FieldValue::Time(a), FieldValue::Time(b)) => a.cmp(b),
            (FieldValue::List(a), FieldValue::List(b)) => a.len().cmp(&b.len()),
            _ => Ordering::Equal,
        }
    }
}

/// Named field access for listing.
pub trait Listable {
    fn field(&self, name: &str) -> FieldValue<'_>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: Direction,
}

impl SortSpec {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone)]
pub struct ListingState {
    search_fields: Vec<&'static str>,
    filters: BTreeMap<String, String>,
    search: String,
    sort: Option<SortSpec>,
    page: usize,
    page_size: usize,
}

impl ListingState {
    pub fn new(search_fields: &[&'static str], sort: Option<SortSpec>, page_size: usize) -> Self {
        Self {
            search_fields: search_fields.to_vec(),
            filters: BTreeMap::new(),
            search: String::new(),
            sort,
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn set_filter(&mut self, field: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.filters.remove(field);
        } else {
            self.filters.insert(field.to_string(), value.to_string());
        }
        self.page = 1;
    }

    pub fn set_search(&mut self, search: &str) {
        self.search = search.trim().to_lowercase();
        self.page = 1;
    }

    pub fn set_sort(&mut self, sort: SortSpec) {
        self.sort = Some(sort);
        self.page = 1;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn matches<T: Listable>(&self, item: &T) -> bool {
        let filters_pass = self
            .filters
            .iter()
            .all(|(field, value)| item.field(field).equals(value));
        if !filters_pass {
            return false;
        }

        self.search.is_empty()
            || self
                .search_fields
                .iter()
                .any(|field| item.field(field).contains(&self.search))
    }

    /// Filtered and sorted items, before paging.
    pub fn select<T: Listable + Clone>(&self, items: &[T]) -> Vec<T> {
        let mut selected: Vec<T> = items.iter().filter(|item| self.matches(*item)).cloned().collect();

        if let Some(sort) = &self.sort {
            selected.sort_by(|a, b| {
                let (a, b) = (a.field(&sort.field), b.field(&sort.field));
                match (&a, &b) {
                    (FieldValue::Missing, FieldValue::Missing) => Ordering::Equal,
                    (FieldValue::Missing, _) => Ordering::Greater,
                    (_, FieldValue::Missing) => Ordering::Less,
                    _ => match sort.direction {
                        Direction::Asc => a.compare(&b),
                        Direction::Desc => b.compare(&a),
                    },
                }
            });
        }

        selected
    }

    pub fn apply<T: Listable + Clone>(&self, items: &[T]) -> Page<T> {
        let selected = self.select(items);
        let total_items = selected.len();
        let total_pages = total_items.div_ceil(self.page_size).max(1);
        let page = self.page.min(total_pages);

        let items = selected
            .into_iter()
            .skip((page - 1) * self.page_size)
            .take(self.page_size)
            .collect();

        Page {
            items,
            page,
            page_size: self.page_size,
            total_items,
            total_pages,
        }
    }
}

/// Listing setups for each browsing surface.
pub mod presets {
    use super::{ListingState, SortSpec};

    pub fn forum_threads(page_size: usize) -> ListingState {
        ListingState::new(
            &["title", "content", "authorName", "tags"],
            Some(SortSpec::desc("createdAt")),
            page_size,
        )
    }

    pub fn mentors(page_size: usize) -> ListingState {
        ListingState::new(
            &["name", "course", "skills", "company", "jobTitle"],
            Some(SortSpec::asc("firstName")),
            page_size,
        )
    }

    pub fn student_profiles(page_size: usize) -> ListingState {
        ListingState::new(
            &["name", "course", "batch", "skills"],
            Some(SortSpec::asc("firstName")),
            page_size,
        )
    }

    pub fn events(page_size: usize) -> ListingState {
        ListingState::new(
            &["title", "description", "location"],
            Some(SortSpec::asc("date")),
            page_size,
        )
    }
}

impl Listable for User {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "firstName" => FieldValue::text(&self.first_name),
            "lastName" => FieldValue::text(&self.last_name),
            "name" => FieldValue::Text(Cow::Owned(self.display_name())),
            "email" => FieldValue::text(&self.email),
            "role" => FieldValue::text(self.role.as_str()),
            "course" => FieldValue::optional(self.course.as_ref()),
            "batch" => FieldValue::optional(self.batch.as_ref()),
            "skills" => FieldValue::List(&self.skills),
            "company" => FieldValue::optional(self.company.as_ref()),
            "jobTitle" => FieldValue::optional(self.job_title.as_ref()),
            "willingToMentor" => FieldValue::Flag(self.willing_to_mentor),
            "verificationStatus" => FieldValue::text(self.verification_status.as_str()),
            _ => FieldValue::Missing,
        }
    }
}

impl Listable for ForumThread {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "title" => FieldValue::text(&self.title),
            "content" => FieldValue::text(&self.content),
            "category" => FieldValue::text(&self.category),
            "tags" => FieldValue::List(&self.tags),
            "authorId" => FieldValue::text(&self.author_id),
            "authorName" => FieldValue::text(&self.author_name),
            "likes" => FieldValue::Number(self.likes),
            "replyCount" => FieldValue::Number(self.reply_count),
            "views" => FieldValue::Number(self.views),
            "createdAt" => FieldValue::Time(self.created_at),
            _ => FieldValue::Missing,
        }
    }
}

impl Listable for Event {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "title" => FieldValue::text(&self.title),
            "description" => FieldValue::text(&self.description),
            "category" => FieldValue::text(&self.category),
            "location" => FieldValue::text(&self.location),
            "date" => FieldValue::Time(self.date),
            "organizerId" => FieldValue::text(&self.organizer_id),
            "attendeeCount" => FieldValue::Number(self.attendees.len() as i64),
            _ => FieldValue::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(first: &str, course: Option<&str>, skills: &[&str]) -> User {
        User {
            id: first.to_lowercase(),
            role: Role::Alumni,
            first_name: first.into(),
            last_name: "Doe".into(),
            course: course.map(str::to_string),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            willing_to_mentor: true,
            ..Default::default()
        }
    }

    fn people() -> Vec<User> {
        vec![
            user("Carol", Some("CS"), &["Rust", "Go"]),
            user("alice", Some("Math"), &["Statistics"]),
            user("Bob", None, &["rust"]),
            user("Dan", Some("CS"), &[]),
        ]
    }

    fn names(users: &[User]) -> Vec<&str> {
        users.iter().map(|u| u.first_name.as_str()).collect()
    }

    #[test]
    fn test_empty_listing_returns_everything_in_default_order() {
        let listing = presets::mentors(10);
        let page = listing.apply(&people());
        assert_eq!(names(&page.items), vec!["alice", "Bob", "Carol", "Dan"]);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_filters_and_search_combine() {
        let mut listing = presets::mentors(10);
        listing.set_filter("course", "CS");
        listing.set_search("RUST");

        assert_eq!(names(&listing.select(&people())), vec!["Carol"]);

        listing.set_filter("course", "  ");
        assert_eq!(names(&listing.select(&people())), vec!["Bob", "Carol"]);
    }

    #[test]
    fn test_missing_fields_do_not_match_search() {
        let mut listing = ListingState::new(&["course"], None, 10);
        listing.set_search("c");
        assert_eq!(names(&listing.select(&people())), vec!["Carol", "Dan"]);
    }

    #[test]
    fn test_full_name_search() {
        let mut listing = presets::mentors(10);
        listing.set_search("bob doe");
        assert_eq!(names(&listing.select(&people())), vec!["Bob"]);
    }

    #[test]
    fn test_stable_sort_and_determinism() {
        let mut listing = ListingState::new(&[], None, 10);
        listing.set_sort(SortSpec::asc("course"));

        let first = listing.select(&people());
        let second = listing.select(&people());
        assert_eq!(first, second);
        // Equal courses keep collection order, missing sorts last.
        assert_eq!(names(&first), vec!["Carol", "Dan", "alice", "Bob"]);
    }

    #[test]
    fn test_paging_and_reset() {
        let mut listing = presets::mentors(3);
        listing.set_page(2);
        let page = listing.apply(&people());
        assert_eq!(names(&page.items), vec!["Dan"]);
        assert_eq!(page.total_pages, 2);

        listing.set_page(9);
        assert_eq!(listing.apply(&people()).page, 2);

        listing.set_search("a");
        assert_eq!(listing.page(), 1);
        assert_eq!(listing.apply(&people()).total_items, 3);
    }

    #[test]
    fn test_forum_threads_by_popularity() {
        let thread = |title: &str, likes: i64, category: &str| ForumThread {
            title: title.into(),
            likes,
            category: category.into(),
            ..Default::default()
        };
        let threads = vec![
            thread("a", 1, "career"),
            thread("b", 5, "career"),
            thread("c", 5, "tech"),
            thread("d", 3, "career"),
        ];

        let mut listing = presets::forum_threads(10);
        listing.set_sort(SortSpec::desc("likes"));
        let titles: Vec<String> = listing.select(&threads).into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["b", "c", "d", "a"]);

        listing.set_filter("category", "career");
        let titles: Vec<String> = listing.select(&threads).into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["b", "d", "a"]);
    }
}
