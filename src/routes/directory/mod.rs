mod handler;
mod model;

pub use handler::{mentors, students};
