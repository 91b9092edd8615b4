mod event;
mod forum;
mod mentorship;
mod message;
mod notification;
mod user;
mod verification;

pub use event::Event;
pub use forum::{ForumComment, ForumPost, ForumThread};
pub use mentorship::{MentorshipRequest, MentorshipStatus};
pub use message::{Chat, Message, MessageKind, chat_id_for};
pub use notification::{Notification, NotificationKind};
pub use user::{Role, User, UserSummary, VerificationStatus};
pub use verification::VerificationRequest;

pub mod collections {
    pub const USERS: &str = "users";
    pub const CHATS: &str = "chats";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const MENTORSHIP_REQUESTS: &str = "mentorshipRequests";
    pub const FORUM_THREADS: &str = "forumThreads";
    pub const FORUM_POSTS: &str = "forumPosts";
    pub const FORUM_COMMENTS: &str = "forumComments";
    pub const EVENTS: &str = "events";
    pub const VERIFICATION_REQUESTS: &str = "verificationRequests";

    pub fn messages(chat_id: &str) -> String {
        format!("{CHATS}/{chat_id}/messages")
    }
}
