use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct EventFilters {
    pub category: Option<String>,
    #[serde(default)]
    pub upcoming: bool,
}

#[derive(Debug, Serialize)]
pub struct RsvpResponse {
    pub changed: bool,
}
