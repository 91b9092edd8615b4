//! Mentorship requests from students to alumni.
//!
//! A request starts `pending` and is decided once, by its mentor, into
//! `accepted` or `declined`. Re-applying the decision already taken is a
//! no-op; the opposite decision is rejected. Each decision notifies the
//! student. The notification id is derived from the request and the decision,
//! so responding again after a failed delivery retries it without duplicating.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::{Backend, BackendError, Query, encode};
use crate::effects::{RetryPolicy, deliver_notification, idempotency_key};
use crate::error::AppError;
use crate::models::{
    MentorshipRequest, MentorshipStatus, Notification, NotificationKind, User, collections,
};
use crate::reconcile::{JoinSource, JoinedRow, RowOrder, resolve};
use crate::reporting::ErrorReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Decline,
}

impl Decision {
    pub fn status(self) -> MentorshipStatus {
        match self {
            Decision::Accept => MentorshipStatus::Accepted,
            Decision::Decline => MentorshipStatus::Declined,
        }
    }
}

/// Whether applying `decision` to a request in `current` changes it.
pub fn transition(current: MentorshipStatus, decision: Decision) -> Result<bool, AppError> {
    let target = decision.status();
    match current {
        MentorshipStatus::Pending => Ok(true),
        status if status == target => Ok(false),
        status => Err(AppError::InvalidTransition {
            current: status.as_str().to_string(),
            requested: target.as_str().to_string(),
        }),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondOutcome {
    pub request: MentorshipRequest,
    pub changed: bool,
    pub notification_delivered: bool,
}

/// A mentor's incoming requests joined with the requesting student, one row
/// per student.
pub struct IncomingRequests {
    backend: Arc<dyn Backend>,
    mentor_id: String,
}

impl IncomingRequests {
    pub fn new(backend: Arc<dyn Backend>, mentor_id: &str) -> Self {
        Self {
            backend,
            mentor_id: mentor_id.to_string(),
        }
    }

    pub fn query(&self) -> Query {
        Query::collection(collections::MENTORSHIP_REQUESTS)
            .where_eq("mentorId", self.mentor_id.as_str())
    }

    pub fn newest_first() -> RowOrder<MentorshipRequest, User> {
        Arc::new(|a, b| b.primary.updated_at().cmp(&a.primary.updated_at()))
    }
}

#[async_trait]
impl JoinSource for IncomingRequests {
    type Primary = MentorshipRequest;
    type Secondary = User;

    fn primary_id(&self, request: &MentorshipRequest) -> String {
        request.id.clone()
    }

    fn counterpart_key(&self, request: &MentorshipRequest) -> Option<String> {
        (!request.student_id.is_empty()).then(|| request.student_id.clone())
    }

    fn updated_at(&self, request: &MentorshipRequest) -> DateTime<Utc> {
        request.updated_at()
    }

    async fn lookup(&self, key: &str) -> Result<Option<User>, BackendError> {
        self.backend.get_as::<User>(collections::USERS, key).await
    }
}

pub struct MentorshipService {
    backend: Arc<dyn Backend>,
    reporter: Arc<dyn ErrorReporter>,
    retry: RetryPolicy,
}

impl MentorshipService {
    pub fn new(
        backend: Arc<dyn Backend>,
        reporter: Arc<dyn ErrorReporter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            reporter,
            retry,
        }
    }

    pub async fn send_request(
        &self,
        student_id: &str,
        mentor_id: &str,
        message: &str,
    ) -> Result<MentorshipRequest, AppError> {
        if student_id == mentor_id {
            return Err(AppError::Validation("cannot request yourself as mentor".into()));
        }
        let student = self.user(student_id).await?;
        let mentor = self.user(mentor_id).await?;
        if !mentor.is_mentor() {
            return Err(AppError::Validation(format!(
                "{} is not accepting mentees",
                mentor.display_name()
            )));
        }

        let pending = Query::collection(collections::MENTORSHIP_REQUESTS)
            .where_eq("studentId", student_id)
            .where_eq("mentorId", mentor_id)
            .where_eq("status", MentorshipStatus::Pending.as_str())
            .limit(1);
        if !self.backend.query(&pending).await?.is_empty() {
            return Err(AppError::Validation(
                "a request to this mentor is already pending".into(),
            ));
        }

        let mut request = MentorshipRequest {
            student_id: student_id.to_string(),
            mentor_id: mentor_id.to_string(),
            status: MentorshipStatus::Pending,
            message: message.trim().to_string(),
            created_at: Utc::now(),
            ..Default::default()
        };
        request.id = self
            .backend
            .create(collections::MENTORSHIP_REQUESTS, None, encode(&request)?)
            .await?;
        tracing::info!(
            "Mentorship request {} from {} to {}",
            request.id,
            student_id,
            mentor_id
        );

        let notification = Notification::new(
            mentor_id,
            student_id,
            NotificationKind::MentorshipRequest,
            format!("{} sent you a mentorship request", student.display_name()),
        )
        .with_link("/mentorship");
        deliver_notification(
            self.backend.as_ref(),
            self.reporter.as_ref(),
            self.retry,
            "mentorship-request",
            &idempotency_key(&[&request.id, MentorshipStatus::Pending.as_str()]),
            &notification,
        )
        .await;

        Ok(request)
    }

    pub async fn respond(
        &self,
        request_id: &str,
        mentor_id: &str,
        decision: Decision,
    ) -> Result<RespondOutcome, AppError> {
        let mut request = self
            .backend
            .get_as::<MentorshipRequest>(collections::MENTORSHIP_REQUESTS, request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("mentorship request {request_id}")))?;
        if request.mentor_id != mentor_id {
            return Err(AppError::PermissionDenied(format!(
                "request {request_id} is addressed to another mentor"
            )));
        }

        let changed = transition(request.status, decision)?;
        if changed {
            let responded_at = Utc::now();
            request.status = decision.status();
            request.responded_at = Some(responded_at);
            self.backend
                .update(
                    collections::MENTORSHIP_REQUESTS,
                    request_id,
                    json!({
                        "status": request.status.as_str(),
                        "respondedAt": responded_at,
                    }),
                )
                .await?;
            tracing::info!("Mentorship request {} {}", request_id, request.status.as_str());
        }

        let mentor_name = self
            .backend
            .get_as::<User>(collections::USERS, mentor_id)
            .await?
            .map(|mentor| mentor.display_name())
            .unwrap_or_else(|| "Your mentor".to_string());
        let text = match decision {
            Decision::Accept => format!("{mentor_name} accepted your mentorship request"),
            Decision::Decline => format!("{mentor_name} declined your mentorship request"),
        };
        let notification = Notification::new(
            &request.student_id,
            mentor_id,
            NotificationKind::MentorshipResponse,
            text,
        )
        .with_link("/mentorship");
        let notification_delivered = deliver_notification(
            self.backend.as_ref(),
            self.reporter.as_ref(),
            self.retry,
            "mentorship-response",
            &idempotency_key(&[request_id, request.status.as_str()]),
            &notification,
        )
        .await;

        Ok(RespondOutcome {
            request,
            changed,
            notification_delivered,
        })
    }

    pub async fn incoming(
        &self,
        mentor_id: &str,
    ) -> Result<Vec<JoinedRow<MentorshipRequest, User>>, AppError> {
        let source = Arc::new(IncomingRequests::new(self.backend.clone(), mentor_id));
        let requests = self
            .backend
            .query_as::<MentorshipRequest>(&source.query())
            .await?;
        Ok(resolve(source, requests, Some(IncomingRequests::newest_first())).await)
    }

    pub async fn sent(&self, student_id: &str) -> Result<Vec<MentorshipRequest>, AppError> {
        let query = Query::collection(collections::MENTORSHIP_REQUESTS)
            .where_eq("studentId", student_id);
        let mut requests = self.backend.query_as::<MentorshipRequest>(&query).await?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn user(&self, user_id: &str) -> Result<User, AppError> {
        self.backend
            .get_as::<User>(collections::USERS, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::reporting::TracingReporter;

    async fn setup() -> (Arc<MemoryBackend>, MentorshipService) {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .seed(
                collections::USERS,
                "stu",
                json!({"firstName": "Sam", "lastName": "Lee", "role": "student"}),
            )
            .await;
        backend
            .seed(
                collections::USERS,
                "men",
                json!({"firstName": "Mara", "lastName": "Ode", "role": "alumni", "willingToMentor": true}),
            )
            .await;
        backend
            .seed(
                collections::USERS,
                "busy",
                json!({"firstName": "Bo", "role": "alumni", "willingToMentor": false}),
            )
            .await;
        let service = MentorshipService::new(
            backend.clone(),
            Arc::new(TracingReporter::new()),
            RetryPolicy::immediate(2),
        );
        (backend, service)
    }

    async fn notifications_for(backend: &MemoryBackend, user_id: &str) -> Vec<Notification> {
        let query =
            Query::collection(collections::NOTIFICATIONS).where_eq("recipientId", user_id);
        let backend: &dyn Backend = backend;
        backend.query_as(&query).await.unwrap()
    }

    #[test]
    fn test_transitions() {
        assert!(transition(MentorshipStatus::Pending, Decision::Accept).unwrap());
        assert!(!transition(MentorshipStatus::Accepted, Decision::Accept).unwrap());
        assert!(!transition(MentorshipStatus::Declined, Decision::Decline).unwrap());
        assert!(matches!(
            transition(MentorshipStatus::Accepted, Decision::Decline),
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(matches!(
            transition(MentorshipStatus::Declined, Decision::Accept),
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_request_notifies_mentor_and_blocks_duplicates() {
        let (backend, service) = setup().await;

        service.send_request("stu", "men", "Hi!").await.unwrap();
        let inbox = notifications_for(&backend, "men").await;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::MentorshipRequest);

        assert!(matches!(
            service.send_request("stu", "men", "again").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.send_request("stu", "busy", "hi").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_accept_is_terminal_and_idempotent() {
        let (backend, service) = setup().await;
        let request = service.send_request("stu", "men", "").await.unwrap();

        let first = service.respond(&request.id, "men", Decision::Accept).await.unwrap();
        assert!(first.changed);
        assert!(first.notification_delivered);
        assert_eq!(first.request.status, MentorshipStatus::Accepted);

        let again = service.respond(&request.id, "men", Decision::Accept).await.unwrap();
        assert!(!again.changed);
        assert_eq!(notifications_for(&backend, "stu").await.len(), 1);

        assert!(matches!(
            service.respond(&request.id, "men", Decision::Decline).await,
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_only_the_addressed_mentor_may_respond() {
        let (_, service) = setup().await;
        let request = service.send_request("stu", "men", "").await.unwrap();

        assert!(matches!(
            service.respond(&request.id, "busy", Decision::Accept).await,
            Err(AppError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_notification_is_redelivered_on_retry() {
        let (backend, service) = setup().await;
        let request = service.send_request("stu", "men", "").await.unwrap();

        backend.fail_next_writes(collections::NOTIFICATIONS, 2).await;
        let outcome = service.respond(&request.id, "men", Decision::Decline).await.unwrap();
        assert!(outcome.changed);
        assert!(!outcome.notification_delivered);
        assert!(notifications_for(&backend, "stu").await.is_empty());

        let retried = service.respond(&request.id, "men", Decision::Decline).await.unwrap();
        assert!(!retried.changed);
        assert!(retried.notification_delivered);
        let delivered = notifications_for(&backend, "stu").await;
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].message.contains("declined"));
    }

    #[tokio::test]
    async fn test_incoming_collapses_repeat_requests_per_student() {
        let (backend, service) = setup().await;
        for (id, status, at) in [
            ("r1", "declined", "2024-01-01T00:00:00Z"),
            ("r2", "pending", "2024-02-01T00:00:00Z"),
        ] {
            backend
                .seed(
                    collections::MENTORSHIP_REQUESTS,
                    id,
                    json!({"studentId": "stu", "mentorId": "men", "status": status, "createdAt": at}),
                )
                .await;
        }

        let rows = service.incoming("men").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].primary.id, "r2");
        assert_eq!(rows[0].counterpart.label(User::display_name), "Sam Lee");
    }
}
