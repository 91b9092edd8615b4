use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{JoinSource, JoinedRow, RowOrder, resolve};
use crate::backend::{Backend, BackendError, Query, TypedSubscription};

type Rows<J> = Vec<JoinedRow<<J as JoinSource>::Primary, <J as JoinSource>::Secondary>>;
type PendingJoin<J> = Pin<Box<dyn Future<Output = Rows<J>> + Send>>;

/// Anything that yields successive primary snapshots.
#[async_trait]
pub trait Snapshots<T>: Send + 'static {
    async fn next_snapshot(&mut self) -> Option<Vec<T>>;
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> Snapshots<T> for TypedSubscription<T> {
    async fn next_snapshot(&mut self) -> Option<Vec<T>> {
        self.next().await
    }
}

#[async_trait]
impl<T: Send + 'static> Snapshots<T> for mpsc::UnboundedReceiver<Vec<T>> {
    async fn next_snapshot(&mut self) -> Option<Vec<T>> {
        self.recv().await
    }
}

/// A joined list kept current from a live primary source.
///
/// Each snapshot starts a fresh join batch; a snapshot arriving while a batch
/// is in flight cancels that batch, so only the newest snapshot is ever
/// committed. Rows stay `None` until the first batch completes. When the
/// source ends, the batch in flight is still committed. Dropping the
/// list stops the task and with it the underlying subscription.
pub struct LiveJoinedList<J: JoinSource> {
    rows: watch::Receiver<Option<Rows<J>>>,
    task: JoinHandle<()>,
}

impl<J: JoinSource> LiveJoinedList<J> {
    pub fn spawn<S>(
        source: Arc<J>,
        mut snapshots: S,
        order: Option<RowOrder<J::Primary, J::Secondary>>,
    ) -> Self
    where
        S: Snapshots<J::Primary>,
    {
        let (sender, rows) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut pending: Option<PendingJoin<J>> = None;
            loop {
                tokio::select! {
                    biased;
                    snapshot = snapshots.next_snapshot() => match snapshot {
                        Some(primaries) => {
                            if pending.is_some() {
                                tracing::debug!("Discarding superseded join batch");
                            }
                            pending = Some(Box::pin(resolve(source.clone(), primaries, order.clone())));
                        }
                        None => {
                            // Source finished; a one-shot fetch still commits its batch.
                            if let Some(join) = pending.take() {
                                let _ = sender.send(Some(join.await));
                            }
                            break;
                        }
                    },
                    joined = async {
                        match pending.as_mut() {
                            Some(join) => join.await,
                            None => std::future::pending().await,
                        }
                    } => {
                        pending = None;
                        if sender.send(Some(joined)).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Joined list stopped");
        });

        Self { rows, task }
    }

    pub async fn from_query(
        backend: &dyn Backend,
        query: Query,
        source: Arc<J>,
        order: Option<RowOrder<J::Primary, J::Secondary>>,
    ) -> Result<Self, BackendError>
    where
        J::Primary: DeserializeOwned,
    {
        let snapshots = backend.subscribe_as::<J::Primary>(query).await?;
        Ok(Self::spawn(source, snapshots, order))
    }

    /// The last committed rows, `None` while the first batch is loading.
    pub fn current(&self) -> Option<Rows<J>> {
        self.rows.borrow().clone()
    }

    /// Waits for the next committed batch. `None` once the list has stopped.
    pub async fn next_rows(&mut self) -> Option<Rows<J>> {
        loop {
            self.rows.changed().await.ok()?;
            if let Some(rows) = self.rows.borrow_and_update().clone() {
                return Some(rows);
            }
        }
    }
}

impl<J: JoinSource> Drop for LiveJoinedList<J> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
