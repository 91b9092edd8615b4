//! Account verification: users submit proof documents, admins review them.
//!
//! A review writes the request first, then mirrors the outcome onto the
//! user's `verificationStatus`. The second write is a plain field set, so it
//! is retried; if it still fails the review stands, the failure is reported,
//! and reviewing again with the same outcome repairs the user document.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::{Backend, Direction, Query, encode, is_safe_blob_name};
use crate::effects::{RetryPolicy, retry_idempotent};
use crate::error::AppError;
use crate::listing::query_with_fallback;
use crate::models::{Role, User, VerificationRequest, VerificationStatus, collections};
use crate::reporting::{ErrorContext, ErrorKind, ErrorReporter};

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub enrollment_number: Option<String>,
    pub course: Option<String>,
    pub batch: Option<String>,
    pub documents: Vec<Upload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub request: VerificationRequest,
    pub changed: bool,
    pub user_updated: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub approve: bool,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

pub struct VerificationService {
    backend: Arc<dyn Backend>,
    reporter: Arc<dyn ErrorReporter>,
    retry: RetryPolicy,
}

impl VerificationService {
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

    /// Uploads the documents and files a request keyed by the user id, so a
    /// resubmission after rejection replaces the earlier request.
    pub async fn submit(
        &self,
        user_id: &str,
        submission: Submission,
    ) -> Result<VerificationRequest, AppError> {
        let user = self
            .backend
            .get_as::<User>(collections::USERS, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;
        match user.verification_status {
            VerificationStatus::Verified => {
                return Err(AppError::Validation("account is already verified".into()));
            }
            VerificationStatus::Pending => {
                return Err(AppError::Validation("a verification request is pending".into()));
            }
            VerificationStatus::Unverified | VerificationStatus::Rejected => {}
        }
        if submission.documents.is_empty() {
            return Err(AppError::Validation("at least one document is required".into()));
        }
        if let Some(upload) = submission
            .documents
            .iter()
            .find(|upload| !is_safe_blob_name(&upload.file_name))
        {
            return Err(AppError::Validation(format!(
                "invalid file name {:?}",
                upload.file_name
            )));
        }

        let mut document_urls = Vec::with_capacity(submission.documents.len());
        for upload in submission.documents {
            let path = format!("verification/{}/{}", user_id, upload.file_name);
            self.backend.upload(&path, upload.bytes).await?;
            document_urls.push(self.backend.download_url(&path).await?);
        }

        let request = VerificationRequest {
            id: user_id.to_string(),
            user_id: user_id.to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role,
            course: submission.course.or(user.course),
            batch: submission.batch.or(user.batch),
            enrollment_number: submission.enrollment_number,
            document_urls,
            status: VerificationStatus::Pending,
            submitted_at: Utc::now(),
            ..Default::default()
        };
        self.backend
            .set(collections::VERIFICATION_REQUESTS, user_id, encode(&request)?)
            .await?;
        tracing::info!("Verification request submitted by {}", user_id);

        self.mirror_status(user_id, VerificationStatus::Pending, "verification-submit")
            .await;
        Ok(request)
    }

    pub async fn review(
        &self,
        admin_id: &str,
        user_id: &str,
        review: Review,
    ) -> Result<ReviewOutcome, AppError> {
        self.require_admin(admin_id).await?;

        let mut request = self
            .backend
            .get_as::<VerificationRequest>(collections::VERIFICATION_REQUESTS, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("verification request {user_id}")))?;

        let target = if review.approve {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Rejected
        };
        let changed = match request.status {
            VerificationStatus::Pending => true,
            status if status == target => false,
            status => {
                return Err(AppError::InvalidTransition {
                    current: status.as_str().to_string(),
                    requested: target.as_str().to_string(),
                });
            }
        };

        if changed {
            let reviewed_at = Utc::now();
            let rejection_reason = if review.approve {
                None
            } else {
                review.rejection_reason.filter(|reason| !reason.trim().is_empty())
            };
            self.backend
                .update(
                    collections::VERIFICATION_REQUESTS,
                    user_id,
                    json!({
                        "status": target.as_str(),
                        "reviewedAt": reviewed_at,
                        "reviewedBy": admin_id,
                        "rejectionReason": rejection_reason,
                    }),
                )
                .await?;
            request.status = target;
            request.reviewed_at = Some(reviewed_at);
            request.reviewed_by = Some(admin_id.to_string());
            request.rejection_reason = rejection_reason;
            tracing::info!("Verification of {} {} by {}", user_id, target.as_str(), admin_id);
        }

        let user_updated = self.mirror_status(user_id, target, "verification-review").await;
        Ok(ReviewOutcome {
            request,
            changed,
            user_updated,
        })
    }

    /// Requests awaiting review, oldest first.
    pub async fn pending(&self, admin_id: &str) -> Result<Vec<VerificationRequest>, AppError> {
        self.require_admin(admin_id).await?;
        let query = Query::collection(collections::VERIFICATION_REQUESTS)
            .where_eq("status", VerificationStatus::Pending.as_str())
            .order_by("submittedAt", Direction::Asc);
        Ok(query_with_fallback(
            self.backend.as_ref(),
            &query,
            |a: &VerificationRequest, b: &VerificationRequest| a.submitted_at.cmp(&b.submitted_at),
        )
        .await?)
    }

    async fn require_admin(&self, admin_id: &str) -> Result<(), AppError> {
        let admin = self
            .backend
            .get_as::<User>(collections::USERS, admin_id)
            .await?;
        match admin {
            Some(user) if user.role == Role::Admin => Ok(()),
            _ => Err(AppError::PermissionDenied("admin access required".into())),
        }
    }

    async fn mirror_status(
        &self,
        user_id: &str,
        status: VerificationStatus,
        operation: &'static str,
    ) -> bool {
        let backend = self.backend.as_ref();
        let result = retry_idempotent(self.retry, operation, || {
            backend.update(
                collections::USERS,
                user_id,
                json!({ "verificationStatus": status.as_str() }),
            )
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                self.reporter.report(
                    ErrorKind::PartialWrite,
                    ErrorContext::new(
                        operation,
                        format!(
                            "request for {} is {} but the user was not updated: {}",
                            user_id,
                            status.as_str(),
                            e
                        ),
                    ),
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::reporting::TracingReporter;

    async fn setup() -> (Arc<MemoryBackend>, VerificationService) {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .seed(
                collections::USERS,
                "stu",
                json!({"firstName": "Sam", "role": "student", "course": "CS"}),
            )
            .await;
        backend
            .seed(collections::USERS, "root", json!({"firstName": "Root", "role": "admin"}))
            .await;
        let service = VerificationService::new(
            backend.clone(),
            Arc::new(TracingReporter::new()),
            RetryPolicy::immediate(2),
        );
        (backend, service)
    }

    fn submission() -> Submission {
        Submission {
            enrollment_number: Some("EN-1".into()),
            documents: vec![Upload {
                file_name: "id.png".into(),
                bytes: vec![1, 2, 3],
            }],
            ..Default::default()
        }
    }

    async fn user_status(backend: &MemoryBackend, id: &str) -> VerificationStatus {
        backend
            .get(collections::USERS, id)
            .await
            .unwrap()
            .unwrap()
            .decode::<User>()
            .unwrap()
            .verification_status
    }

    #[tokio::test]
    async fn test_submit_then_approve() {
        let (backend, service) = setup().await;

        let request = service.submit("stu", submission()).await.unwrap();
        assert_eq!(request.course.as_deref(), Some("CS"));
        assert_eq!(request.document_urls.len(), 1);
        assert_eq!(user_status(&backend, "stu").await, VerificationStatus::Pending);

        let pending = service.pending("root").await.unwrap();
        assert_eq!(pending.len(), 1);

        let outcome = service
            .review("root", "stu", Review { approve: true, rejection_reason: None })
            .await
            .unwrap();
        assert!(outcome.changed);
        assert!(outcome.user_updated);
        assert_eq!(user_status(&backend, "stu").await, VerificationStatus::Verified);
        assert!(service.pending("root").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_admins_review() {
        let (_, service) = setup().await;
        service.submit("stu", submission()).await.unwrap();

        assert!(matches!(
            service
                .review("stu", "stu", Review { approve: true, rejection_reason: None })
                .await,
            Err(AppError::PermissionDenied(_))
        ));
        assert!(matches!(service.pending("stu").await, Err(AppError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_failed_user_update_is_repaired_by_second_review() {
        let (backend, service) = setup().await;
        service.submit("stu", submission()).await.unwrap();

        backend.fail_next_writes(collections::USERS, 2).await;
        let rejected = Review {
            approve: false,
            rejection_reason: Some("blurry scan".into()),
        };
        let outcome = service.review("root", "stu", rejected.clone()).await.unwrap();
        assert!(outcome.changed);
        assert!(!outcome.user_updated);
        assert_eq!(outcome.request.rejection_reason.as_deref(), Some("blurry scan"));
        assert_eq!(user_status(&backend, "stu").await, VerificationStatus::Pending);

        let again = service.review("root", "stu", rejected).await.unwrap();
        assert!(!again.changed);
        assert!(again.user_updated);
        assert_eq!(user_status(&backend, "stu").await, VerificationStatus::Rejected);

        assert!(matches!(
            service
                .review("root", "stu", Review { approve: true, rejection_reason: None })
                .await,
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_resubmission_after_rejection() {
        let (_, service) = setup().await;
        service.submit("stu", submission()).await.unwrap();
        assert!(matches!(
            service.submit("stu", submission()).await,
            Err(AppError::Validation(_))
        ));

        service
            .review("root", "stu", Review { approve: false, rejection_reason: None })
            .await
            .unwrap();
        let again = service.submit("stu", submission()).await.unwrap();
        assert_eq!(again.status, VerificationStatus::Pending);
    }
}
