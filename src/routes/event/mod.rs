mod handler;
mod model;

pub use handler::{cancel_rsvp, create_event, list_events, rsvp};
