use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mentorship::Decision;
use crate::models::{MentorshipRequest, MentorshipStatus, User};
use crate::reconcile::JoinedRow;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub mentor_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub decision: Decision,
}

/// A row of the mentor's inbox.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRequest {
    pub request_id: String,
    pub student_id: String,
    pub student_name: String,
    pub student_course: Option<String>,
    pub status: MentorshipStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<&JoinedRow<MentorshipRequest, User>> for IncomingRequest {
    fn from(row: &JoinedRow<MentorshipRequest, User>) -> Self {
        Self {
            request_id: row.primary.id.clone(),
            student_id: row.primary.student_id.clone(),
            student_name: row.counterpart.label(User::display_name),
            student_course: row
                .counterpart
                .resolved()
                .and_then(|student| student.course.clone()),
            status: row.primary.status,
            message: row.primary.message.clone(),
            created_at: row.primary.created_at,
        }
    }
}
