use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BadgeResponse {
    pub count: u32,
}
