use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub organizer_id: String,
    pub attendees: Vec<String>,
    pub created_at: DateTime<Utc>,
}
