//! Boundary to the managed document backend.
//!
//! Everything the application persists goes through [`Backend`]: point reads,
//! filtered and ordered collection queries, live query subscriptions, merge
//! writes and blob storage. No call ever spans more than one document.

mod memory;

use std::cmp::Ordering;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryBackend;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("query requires an index: {0}")]
    MissingIndex(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("malformed document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A raw document as delivered by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Decodes the document, exposing its id as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BackendError> {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.insert("id".into(), Value::String(self.id.clone()));
        }
        Ok(serde_json::from_value(data)?)
    }
}

/// Serializes a model for writing; the `id` lives in the document path, not its body.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, BackendError> {
    let mut data = serde_json::to_value(value)?;
    if let Value::Object(map) = &mut data {
        map.remove("id");
    }
    Ok(data)
}

pub fn decode_all<T: DeserializeOwned>(collection: &str, documents: &[Document]) -> Vec<T> {
    documents
        .iter()
        .filter_map(|doc| match doc.decode() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Skipping malformed document {}/{}: {}", collection, doc.id, e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    ArrayContains(String, Value),
    Gte(String, Value),
    Lte(String, Value),
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(field, _)
            | Filter::ArrayContains(field, _)
            | Filter::Gte(field, _)
            | Filter::Lte(field, _) => field,
        }
    }

    fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq(field, expected) => field_value(data, field) == Some(expected),
            Filter::ArrayContains(field, expected) => match field_value(data, field) {
                Some(Value::Array(items)) => items.contains(expected),
                _ => false,
            },
            Filter::Gte(field, bound) => field_value(data, field).is_some_and(|v| {
                compare_values(Some(v), Some(bound)) != Ordering::Less
            }),
            Filter::Lte(field, bound) => field_value(data, field).is_some_and(|v| {
                compare_values(Some(v), Some(bound)) != Ordering::Greater
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.to_string(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(field.to_string(), value.into()));
        self
    }

    pub fn where_lte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The same query with ordering stripped, for the client-side sort fallback.
    pub fn unordered(&self) -> Self {
        Self {
            order_by: None,
            ..self.clone()
        }
    }

    /// An ordered query filtering on any other field needs a composite index.
    pub fn needs_composite_index(&self) -> bool {
        match &self.order_by {
            Some((order_field, _)) => self.filters.iter().any(|f| f.field() != order_field),
            None => false,
        }
    }

    pub fn index_key(&self) -> String {
        let mut fields: Vec<&str> = self.filters.iter().map(Filter::field).collect();
        fields.sort_unstable();
        fields.dedup();
        let order = self
            .order_by
            .as_ref()
            .map(|(field, _)| field.as_str())
            .unwrap_or_default();
        format!("{}:{}:{}", self.collection, fields.join(","), order)
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }
}

/// Looks up a possibly dotted field path.
pub fn field_value<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |value, key| value.get(key))
}

/// Total order over document values: missing and null first, then booleans,
/// numbers, strings (RFC 3339 timestamps compare chronologically), arrays, objects.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                chrono::DateTime::parse_from_rfc3339(x),
                chrono::DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// A single path segment usable as a blob file name.
pub fn is_safe_blob_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// A live query. Snapshots arrive in emission order, the first one
/// immediately; dropping the subscription unsubscribes.
pub struct Subscription {
    query: Query,
    receiver: mpsc::UnboundedReceiver<Vec<Document>>,
}

impl Subscription {
    pub fn new(query: Query, receiver: mpsc::UnboundedReceiver<Vec<Document>>) -> Self {
        Self { query, receiver }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub async fn next(&mut self) -> Option<Vec<Document>> {
        self.receiver.recv().await
    }

    pub fn typed<T: DeserializeOwned>(self) -> TypedSubscription<T> {
        TypedSubscription {
            inner: self,
            _marker: PhantomData,
        }
    }
}

pub struct TypedSubscription<T> {
    inner: Subscription,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSubscription<T> {
    pub async fn next(&mut self) -> Option<Vec<T>> {
        let documents = self.inner.next().await?;
        Some(decode_all(&self.inner.query.collection, &documents))
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, BackendError>;

    async fn subscribe(&self, query: Query) -> Result<Subscription, BackendError>;

    /// Creates a document. With an explicit id the write fails with
    /// `AlreadyExists` instead of overwriting.
    async fn create(
        &self,
        collection: &str,
        id: Option<&str>,
        data: Value,
    ) -> Result<String, BackendError>;

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError>;

    /// Merges top-level fields into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Value)
    -> Result<(), BackendError>;

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), BackendError>;

    /// Adds `value` to an array field unless present. Returns whether it was added.
    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, BackendError>;

    /// Removes `value` from an array field. Returns whether it was present.
    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, BackendError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), BackendError>;

    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), BackendError>;

    async fn download_url(&self, path: &str) -> Result<String, BackendError>;
}

impl<'a> dyn Backend + 'a {
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, BackendError> {
        match self.get(collection, id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    pub async fn require<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<T, BackendError> {
        self.get_as(collection, id)
            .await?
            .ok_or_else(|| BackendError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    pub async fn query_as<T: DeserializeOwned>(
        &self,
        query: &Query,
    ) -> Result<Vec<T>, BackendError> {
        let documents = self.query(query).await?;
        Ok(decode_all(&query.collection, &documents))
    }

    pub async fn subscribe_as<T: DeserializeOwned>(
        &self,
        query: Query,
    ) -> Result<TypedSubscription<T>, BackendError> {
        Ok(self.subscribe(query).await?.typed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_matching() {
        let query = Query::collection("users")
            .where_eq("role", "alumni")
            .array_contains("skills", "rust");

        assert!(query.matches(&json!({"role": "alumni", "skills": ["go", "rust"]})));
        assert!(!query.matches(&json!({"role": "student", "skills": ["rust"]})));
        assert!(!query.matches(&json!({"role": "alumni"})));
    }

    #[test]
    fn test_range_filters() {
        let query = Query::collection("events")
            .where_gte("date", "2024-05-01T00:00:00Z")
            .where_lte("date", "2024-05-31T23:59:59Z");

        assert!(query.matches(&json!({"date": "2024-05-01T00:00:00Z"})));
        assert!(query.matches(&json!({"date": "2024-05-15T18:00:00Z"})));
        assert!(!query.matches(&json!({"date": "2024-06-01T09:00:00Z"})));
        assert!(!query.matches(&json!({})));
    }

    #[test]
    fn test_composite_index_detection() {
        let ordered_only = Query::collection("users").order_by("firstName", Direction::Asc);
        assert!(!ordered_only.needs_composite_index());

        let filtered = Query::collection("users")
            .where_eq("role", "alumni")
            .order_by("firstName", Direction::Asc);
        assert!(filtered.needs_composite_index());
        assert!(!filtered.unordered().needs_composite_index());
    }

    #[test]
    fn test_timestamps_compare_chronologically() {
        let earlier = json!("2024-03-01T10:00:00Z");
        let later = json!("2024-03-01T10:00:00.500Z");
        assert_eq!(
            compare_values(Some(&earlier), Some(&later)),
            Ordering::Less
        );
        assert_eq!(compare_values(None, Some(&earlier)), Ordering::Less);
    }

    #[test]
    fn test_blob_names() {
        assert!(is_safe_blob_name("cv.pdf"));
        assert!(!is_safe_blob_name("../cv.pdf"));
        assert!(!is_safe_blob_name(".."));
        assert!(!is_safe_blob_name(""));
    }

    #[test]
    fn test_decode_injects_id() {
        #[derive(serde::Deserialize)]
        struct Named {
            id: String,
            name: String,
        }

        let doc = Document {
            id: "d1".into(),
            data: json!({"name": "x"}),
        };
        let named: Named = doc.decode().unwrap();
        assert_eq!(named.id, "d1");
        assert_eq!(named.name, "x");
    }
}
