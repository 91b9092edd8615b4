use serde::Deserialize;

use crate::listing::ListingState;

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryFilters {
    pub course: Option<String>,
    pub batch: Option<String>,
    pub skill: Option<String>,
}

impl DirectoryFilters {
    pub fn apply_to(&self, listing: &mut ListingState) {
        listing.set_filter("course", self.course.as_deref().unwrap_or_default());
        listing.set_filter("batch", self.batch.as_deref().unwrap_or_default());
        listing.set_filter("skills", self.skill.as_deref().unwrap_or_default());
    }
}
