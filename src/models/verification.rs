use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Role, VerificationStatus};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationRequest {
    pub id: String,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub course: Option<String>,
    pub batch: Option<String>,
    pub enrollment_number: Option<String>,
    pub document_urls: Vec<String>,
    pub status: VerificationStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
}
