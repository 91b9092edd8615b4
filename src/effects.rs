//! Follow-up writes of multi-document operations.
//!
//! The backend has no transactions, so an operation such as "accept request,
//! then notify the student" is a primary write followed by side-effect writes.
//! Side effects are made idempotent (deterministic ids or plain field sets)
//! and retried a bounded number of times; a final failure is reported rather
//! than rolled back.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::backend::{Backend, BackendError, encode};
use crate::models::{Notification, collections};
use crate::reporting::{ErrorContext, ErrorKind, ErrorReporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

pub async fn retry_idempotent<F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut write: F,
) -> Result<(), BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), BackendError>>,
{
    let mut attempt = 1;
    loop {
        match write().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < policy.attempts && ErrorKind::from(&e).retryable() => {
                tracing::warn!("{} attempt {} failed: {}, retrying", operation, attempt, e);
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Stable key for a logical write, derived from the values identifying it.
pub fn idempotency_key(parts: &[&str]) -> String {
    let digest = Sha256::digest(parts.join(":").as_bytes());
    format!("{:x}", digest)[..32].to_string()
}

/// Creates a document under `id`; finding it already there means an earlier
/// attempt landed.
pub async fn create_once(
    backend: &dyn Backend,
    collection: &str,
    id: &str,
    data: Value,
) -> Result<(), BackendError> {
    match backend.create(collection, Some(id), data).await {
        Ok(_) | Err(BackendError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Writes `notification` at most once per `key`, retrying transient failures.
/// Returns whether it was delivered; failures are reported, never raised.
pub async fn deliver_notification(
    backend: &dyn Backend,
    reporter: &dyn ErrorReporter,
    policy: RetryPolicy,
    operation: &'static str,
    key: &str,
    notification: &Notification,
) -> bool {
    let data = match encode(notification) {
        Ok(data) => data,
        Err(e) => {
            reporter.report(ErrorKind::Validation, ErrorContext::new(operation, e.to_string()));
            return false;
        }
    };

    let result = retry_idempotent(policy, operation, || {
        create_once(backend, collections::NOTIFICATIONS, key, data.clone())
    })
    .await;

    match result {
        Ok(()) => true,
        Err(e) => {
            reporter.report(
                ErrorKind::PartialWrite,
                ErrorContext::new(
                    operation,
                    format!(
                        "notification for {} was not delivered: {}",
                        notification.recipient_id, e
                    ),
                ),
            );
            false
        }
    }
}
