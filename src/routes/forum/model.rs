use serde::Deserialize;

use crate::forum::ForumSort;

#[derive(Debug, Default, Deserialize)]
pub struct ThreadListQuery {
    pub page: Option<usize>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub sort: Option<ForumSort>,
}

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    pub content: String,
}
