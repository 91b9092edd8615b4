use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentorshipStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

impl MentorshipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MentorshipStatus::Pending => "pending",
            MentorshipStatus::Accepted => "accepted",
            MentorshipStatus::Declined => "declined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MentorshipRequest {
    pub id: String,
    pub student_id: String,
    pub mentor_id: String,
    pub status: MentorshipStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl MentorshipRequest {
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.responded_at.unwrap_or(self.created_at)
    }
}
