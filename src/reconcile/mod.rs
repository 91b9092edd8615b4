//! Joined lists: one primary collection, one counterpart lookup per row.
//!
//! Rows are keyed by counterpart, not by primary document, so two primary
//! documents pointing at the same counterpart (a duplicate chat, a repeated
//! request) collapse to the most recently updated one. A failed lookup
//! leaves the row in place with a placeholder counterpart.

mod live;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;

use crate::backend::BackendError;

pub use live::LiveJoinedList;

pub const UNKNOWN_USER: &str = "Unknown User";

#[async_trait]
pub trait JoinSource: Send + Sync + 'static {
    type Primary: Clone + Send + Sync + 'static;
    type Secondary: Clone + Send + Sync + 'static;

    fn primary_id(&self, primary: &Self::Primary) -> String;

    /// Identity of the other party; also the key of the secondary lookup.
    fn counterpart_key(&self, primary: &Self::Primary) -> Option<String>;

    fn updated_at(&self, primary: &Self::Primary) -> DateTime<Utc>;

    async fn lookup(&self, key: &str) -> Result<Option<Self::Secondary>, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "profile", rename_all = "lowercase")]
pub enum Counterpart<S> {
    Resolved(S),
    Unknown,
}

impl<S> Counterpart<S> {
    pub fn resolved(&self) -> Option<&S> {
        match self {
            Counterpart::Resolved(secondary) => Some(secondary),
            Counterpart::Unknown => None,
        }
    }

    /// `label` of the resolved counterpart, or the placeholder.
    pub fn label(&self, label: impl FnOnce(&S) -> String) -> String {
        match self {
            Counterpart::Resolved(secondary) => label(secondary),
            Counterpart::Unknown => UNKNOWN_USER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRow<P, S> {
    pub key: String,
    pub primary: P,
    pub counterpart: Counterpart<S>,
}

pub type RowOrder<P, S> = Arc<dyn Fn(&JoinedRow<P, S>, &JoinedRow<P, S>) -> Ordering + Send + Sync>;

/// Keeps one primary document per counterpart, the most recently updated
/// (earliest in input order on ties). Survivors keep their input order.
/// Documents without a counterpart are keyed by their own id.
pub fn dedup_by_counterpart<J: JoinSource>(
    source: &J,
    primaries: Vec<J::Primary>,
) -> Vec<(String, J::Primary)> {
    let keyed: Vec<(String, J::Primary)> = primaries
        .into_iter()
        .map(|primary| {
            let key = source
                .counterpart_key(&primary)
                .unwrap_or_else(|| format!("doc:{}", source.primary_id(&primary)));
            (key, primary)
        })
        .collect();

    let mut winners: HashMap<&str, usize> = HashMap::new();
    for (index, (key, primary)) in keyed.iter().enumerate() {
        match winners.get(key.as_str()) {
            Some(&best) if source.updated_at(&keyed[best].1) >= source.updated_at(primary) => {}
            _ => {
                winners.insert(key.as_str(), index);
            }
        }
    }

    let mut keep = vec![false; keyed.len()];
    for index in winners.into_values() {
        keep[index] = true;
    }

    keyed
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect()
}

/// Dedups, joins every surviving row concurrently and applies `order`.
/// Returns only once every lookup has finished or failed.
pub async fn resolve<J: JoinSource>(
    source: Arc<J>,
    primaries: Vec<J::Primary>,
    order: Option<RowOrder<J::Primary, J::Secondary>>,
) -> Vec<JoinedRow<J::Primary, J::Secondary>> {
    let rows = dedup_by_counterpart(source.as_ref(), primaries);

    let lookups = rows.iter().map(|(key, primary)| {
        let source = source.clone();
        let has_counterpart = source.counterpart_key(primary).is_some();
        let key = key.clone();
        async move {
            if !has_counterpart {
                return Counterpart::Unknown;
            }
            match source.lookup(&key).await {
                Ok(Some(secondary)) => Counterpart::Resolved(secondary),
                Ok(None) => {
                    tracing::warn!("Counterpart {} not found, showing placeholder", key);
                    Counterpart::Unknown
                }
                Err(e) => {
                    tracing::warn!("Counterpart {} lookup failed: {}", key, e);
                    Counterpart::Unknown
                }
            }
        }
    });
    let counterparts = join_all(lookups).await;

    let mut joined: Vec<JoinedRow<J::Primary, J::Secondary>> = rows
        .into_iter()
        .zip(counterparts)
        .map(|((key, primary), counterpart)| JoinedRow {
            key,
            primary,
            counterpart,
        })
        .collect();

    if let Some(order) = order {
        joined.sort_by(|a, b| order(a, b));
    }

    joined
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::{Mutex, oneshot};

    use super::JoinSource;
    use crate::backend::BackendError;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Doc {
        pub id: &'static str,
        pub other: Option<&'static str>,
        pub at: i64,
    }

    pub fn doc(id: &'static str, other: &'static str, at: i64) -> Doc {
        Doc {
            id,
            other: Some(other),
            at,
        }
    }

    pub fn ts(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    /// Profiles by key; keys listed in `gates` block until released.
    #[derive(Default)]
    pub struct Profiles {
        pub names: HashMap<&'static str, &'static str>,
        pub failing: Vec<&'static str>,
        pub gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    }

    impl Profiles {
        pub fn with(names: &[(&'static str, &'static str)]) -> Self {
            Self {
                names: names.iter().copied().collect(),
                ..Default::default()
            }
        }

        pub async fn gate(&self, key: &str) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().await.insert(key.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl JoinSource for Profiles {
        type Primary = Doc;
        type Secondary = String;

        fn primary_id(&self, primary: &Doc) -> String {
            primary.id.to_string()
        }

        fn counterpart_key(&self, primary: &Doc) -> Option<String> {
            primary.other.map(str::to_string)
        }

        fn updated_at(&self, primary: &Doc) -> DateTime<Utc> {
            ts(primary.at)
        }

        async fn lookup(&self, key: &str) -> Result<Option<String>, BackendError> {
            let gate = self.gates.lock().await.remove(key);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.failing.contains(&key) {
                return Err(BackendError::Unavailable("lookup failed".into()));
            }
            Ok(self.names.get(key).map(|name| name.to_string()))
        }
    }

    pub fn profiles(names: &[(&'static str, &'static str)]) -> Arc<Profiles> {
        Arc::new(Profiles::with(names))
    }
}
