mod handler;

pub use handler::{get_preferences, update_preferences};
