mod handler;
mod model;

pub use handler::{incoming, respond, send_request, sent};
