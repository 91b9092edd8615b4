mod handler;
mod model;

pub use handler::{pending, review, submit};
