use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use super::{Backend, BackendError, Direction, Document, Query, Subscription, compare_values, field_value};

const BLOB_URL_PREFIX: &str = "memory://blobs/";

struct Subscriber {
    query: Query,
    sender: mpsc::UnboundedSender<Vec<Document>>,
    last: Vec<Document>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Value>>,
    subscribers: Vec<Subscriber>,
    indexes: HashSet<String>,
    write_failures: HashMap<String, usize>,
    blobs: HashMap<String, Vec<u8>>,
}

impl Inner {
    fn run_query(&self, query: &Query) -> Vec<Document> {
        let Some(collection) = self.collections.get(&query.collection) else {
            return Vec::new();
        };

        let mut documents: Vec<Document> = collection
            .iter()
            .filter(|(_, data)| query.matches(data))
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some((field, direction)) = &query.order_by {
            documents.sort_by(|a, b| {
                let ordering =
                    compare_values(field_value(&a.data, field), field_value(&b.data, field));
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            documents.truncate(limit);
        }

        documents
    }

    fn take_write_failure(&mut self, collection: &str) -> Result<(), BackendError> {
        match self.write_failures.get_mut(collection) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(BackendError::Unavailable(format!(
                    "injected write failure on {collection}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn document_mut(&mut self, collection: &str, id: &str) -> Result<&mut Value, BackendError> {
        self.collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| BackendError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    fn object_mut<'a>(
        doc: &'a mut Value,
        collection: &str,
        id: &str,
    ) -> Result<&'a mut serde_json::Map<String, Value>, BackendError> {
        doc.as_object_mut().ok_or_else(|| {
            BackendError::Unavailable(format!("document {collection}/{id} is not an object"))
        })
    }

    /// Pushes a fresh snapshot to every live subscriber of `collection` whose
    /// result changed, pruning subscribers that have gone away.
    fn notify(&mut self, collection: &str) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        subscribers.retain_mut(|subscriber| {
            if subscriber.query.collection != collection {
                return !subscriber.sender.is_closed();
            }
            let snapshot = self.run_query(&subscriber.query);
            if snapshot == subscriber.last {
                return !subscriber.sender.is_closed();
            }
            subscriber.last = snapshot.clone();
            subscriber.sender.send(snapshot).is_ok()
        });
        self.subscribers = subscribers;
    }

    fn check_index(&self, strict: bool, query: &Query) -> Result<(), BackendError> {
        if strict && query.needs_composite_index() && !self.indexes.contains(&query.index_key()) {
            return Err(BackendError::MissingIndex(query.index_key()));
        }
        Ok(())
    }
}

/// In-process backend with live queries. Collections keep documents ordered by id.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    strict_indexes: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects ordered queries that filter on other fields unless an index
    /// was registered for them.
    pub fn with_strict_indexes() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            strict_indexes: true,
        }
    }

    pub async fn register_index(&self, query: &Query) {
        self.inner.lock().await.indexes.insert(query.index_key());
    }

    /// Makes the next `count` writes to `collection` fail as unavailable.
    pub async fn fail_next_writes(&self, collection: &str, count: usize) {
        self.inner
            .lock()
            .await
            .write_failures
            .insert(collection.to_string(), count);
    }

    pub async fn seed(&self, collection: &str, id: &str, data: Value) {
        let mut inner = self.inner.lock().await;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        inner.notify(collection);
    }

    /// Loads `{ "<collection>": { "<id>": { ...fields } } }`.
    pub async fn seed_from_file(&self, path: impl AsRef<Path>) -> Result<usize, BackendError> {
        let raw = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| BackendError::Unavailable(format!("cannot read seed file: {e}")))?;
        let fixture: BTreeMap<String, BTreeMap<String, Value>> = serde_json::from_str(&raw)?;

        let mut count = 0;
        for (collection, documents) in fixture {
            for (id, data) in documents {
                self.seed(&collection, &id, data).await;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, BackendError> {
        let inner = self.inner.lock().await;
        inner.check_index(self.strict_indexes, query)?;
        Ok(inner.run_query(query))
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, BackendError> {
        let mut inner = self.inner.lock().await;
        inner.check_index(self.strict_indexes, &query)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let snapshot = inner.run_query(&query);
        // The receiver is alive, the initial send cannot fail.
        let _ = sender.send(snapshot.clone());
        tracing::debug!("Live query opened on {}", query.collection);
        inner.subscribers.push(Subscriber {
            query: query.clone(),
            sender,
            last: snapshot,
        });

        Ok(Subscription::new(query, receiver))
    }

    async fn create(
        &self,
        collection: &str,
        id: Option<&str>,
        data: Value,
    ) -> Result<String, BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_write_failure(collection)?;

        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let documents = inner.collections.entry(collection.to_string()).or_default();
        if documents.contains_key(&id) {
            return Err(BackendError::AlreadyExists {
                collection: collection.to_string(),
                id,
            });
        }
        documents.insert(id.clone(), data);
        inner.notify(collection);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_write_failure(collection)?;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        inner.notify(collection);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_write_failure(collection)?;

        let Value::Object(fields) = fields else {
            return Err(BackendError::Unavailable(
                "update payload must be an object".into(),
            ));
        };
        let doc = inner.document_mut(collection, id)?;
        let object = Inner::object_mut(doc, collection, id)?;
        for (key, value) in fields {
            object.insert(key, value);
        }
        inner.notify(collection);
        Ok(())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_write_failure(collection)?;

        let doc = inner.document_mut(collection, id)?;
        let object = Inner::object_mut(doc, collection, id)?;
        let current = object.get(field).and_then(Value::as_i64).unwrap_or(0);
        object.insert(field.to_string(), Value::from(current + delta));
        inner.notify(collection);
        Ok(())
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_write_failure(collection)?;

        let doc = inner.document_mut(collection, id)?;
        let object = Inner::object_mut(doc, collection, id)?;
        let items = object
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let added = match items {
            Value::Array(items) if !items.contains(&value) => {
                items.push(value);
                true
            }
            Value::Array(_) => false,
            other => {
                *other = Value::Array(vec![value]);
                true
            }
        };
        if added {
            inner.notify(collection);
        }
        Ok(added)
    }

    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_write_failure(collection)?;

        let doc = inner.document_mut(collection, id)?;
        let object = Inner::object_mut(doc, collection, id)?;
        let removed = match object.get_mut(field) {
            Some(Value::Array(items)) => {
                let before = items.len();
                items.retain(|item| item != &value);
                items.len() != before
            }
            _ => false,
        };
        if removed {
            inner.notify(collection);
        }
        Ok(removed)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        inner.take_write_failure(collection)?;
        if let Some(documents) = inner.collections.get_mut(collection) {
            documents.remove(id);
        }
        inner.notify(collection);
        Ok(())
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        inner.blobs.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, BackendError> {
        let inner = self.inner.lock().await;
        if inner.blobs.contains_key(path) {
            Ok(format!("{BLOB_URL_PREFIX}{path}"))
        } else {
            Err(BackendError::NotFound {
                collection: "blobs".into(),
                id: path.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscription_receives_initial_and_changed_snapshots() {
        let backend = MemoryBackend::new();
        backend.seed("chats", "a", json!({"participants": ["u1", "u2"]})).await;

        let mut sub = backend
            .subscribe(Query::collection("chats").array_contains("participants", "u1"))
            .await
            .unwrap();

        let initial = sub.next().await.unwrap();
        assert_eq!(initial.len(), 1);

        backend
            .create("chats", Some("b"), json!({"participants": ["u1", "u3"]}))
            .await
            .unwrap();
        let next = sub.next().await.unwrap();
        assert_eq!(next.len(), 2);

        // Unrelated writes do not produce a snapshot.
        backend
            .create("chats", Some("c"), json!({"participants": ["u4", "u5"]}))
            .await
            .unwrap();
        backend
            .update("chats", "a", json!({"lastMessage": "hi"}))
            .await
            .unwrap();
        let next = sub.next().await.unwrap();
        assert_eq!(next[0].data["lastMessage"], "hi");
    }

    #[tokio::test]
    async fn test_create_with_existing_id_fails() {
        let backend = MemoryBackend::new();
        backend.create("chats", Some("x"), json!({})).await.unwrap();
        let err = backend.create("chats", Some("x"), json!({})).await.unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_strict_indexes() {
        let backend = MemoryBackend::with_strict_indexes();
        let query = Query::collection("users")
            .where_eq("role", "alumni")
            .order_by("firstName", Direction::Asc);

        let err = backend.query(&query).await.unwrap_err();
        assert!(matches!(err, BackendError::MissingIndex(_)));

        backend.register_index(&query).await;
        assert!(backend.query(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_write_failures() {
        let backend = MemoryBackend::new();
        backend.fail_next_writes("notifications", 1).await;

        assert!(backend.create("notifications", None, json!({})).await.is_err());
        assert!(backend.create("notifications", None, json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_array_union_and_increment() {
        let backend = MemoryBackend::new();
        backend.seed("forumThreads", "t", json!({"likes": 0})).await;

        assert!(backend.array_union("forumThreads", "t", "likedBy", json!("u1")).await.unwrap());
        assert!(!backend.array_union("forumThreads", "t", "likedBy", json!("u1")).await.unwrap());
        backend.increment("forumThreads", "t", "likes", 1).await.unwrap();

        let doc = backend.get("forumThreads", "t").await.unwrap().unwrap();
        assert_eq!(doc.data["likes"], 1);
        assert_eq!(doc.data["likedBy"], json!(["u1"]));
    }
}
