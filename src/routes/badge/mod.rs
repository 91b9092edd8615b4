mod handler;
mod model;

pub use handler::{current, stream};
