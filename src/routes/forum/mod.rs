mod handler;
mod model;

pub use handler::{
    comment, create_thread, like_post, like_thread, list_comments, list_threads, reply, view_thread,
};
