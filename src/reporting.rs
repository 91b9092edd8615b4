//! One reporting path for every failed write or read: developers get a log
//! line, users get a notice only for the kinds that warrant one.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::backend::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    PermissionDenied,
    MissingIndex,
    /// The first write of a multi-document operation landed, a later one did not.
    PartialWrite,
    Validation,
    Unavailable,
}

impl ErrorKind {
    pub fn retryable(self) -> bool {
        matches!(self, ErrorKind::PartialWrite | ErrorKind::Unavailable)
    }

    pub fn notifies_user(self) -> bool {
        matches!(
            self,
            ErrorKind::PermissionDenied
                | ErrorKind::PartialWrite
                | ErrorKind::Validation
                | ErrorKind::Unavailable
        )
    }
}

impl From<&BackendError> for ErrorKind {
    fn from(error: &BackendError) -> Self {
        match error {
            BackendError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            BackendError::MissingIndex(_) => ErrorKind::MissingIndex,
            BackendError::NotFound { .. }
            | BackendError::AlreadyExists { .. }
            | BackendError::Decode(_) => ErrorKind::Validation,
            BackendError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub operation: &'static str,
    pub detail: String,
}

impl ErrorContext {
    pub fn new(operation: &'static str, detail: impl Into<String>) -> Self {
        Self {
            operation,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserNotice {
    pub kind: ErrorKind,
    pub operation: &'static str,
    pub message: String,
    pub retryable: bool,
}

pub trait ErrorReporter: Send + Sync {
    fn report(&self, kind: ErrorKind, context: ErrorContext);
}

/// Logs through `tracing` and fans user-facing notices out to subscribers.
pub struct TracingReporter {
    notices: broadcast::Sender<UserNotice>,
}

impl TracingReporter {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(64);
        Self { notices }
    }

    pub fn notices(&self) -> broadcast::Receiver<UserNotice> {
        self.notices.subscribe()
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter for TracingReporter {
    fn report(&self, kind: ErrorKind, context: ErrorContext) {
        match kind {
            ErrorKind::PartialWrite | ErrorKind::Unavailable | ErrorKind::PermissionDenied => {
                tracing::error!(
                    "{} failed ({:?}): {}",
                    context.operation,
                    kind,
                    context.detail
                );
            }
            _ => {
                tracing::warn!(
                    "{} degraded ({:?}): {}",
                    context.operation,
                    kind,
                    context.detail
                );
            }
        }

        if kind.notifies_user() {
            // No subscribers just means nobody is watching right now.
            let _ = self.notices.send(UserNotice {
                kind,
                operation: context.operation,
                message: context.detail,
                retryable: kind.retryable(),
            });
        }
    }
}
