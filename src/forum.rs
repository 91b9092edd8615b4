//! Discussion forum: threads, replies (posts) and comments on replies.
//!
//! Like, view and reply counters are adjusted with the backend's atomic
//! increment; a like is recorded in `likedBy` first and the counter only
//! moves when that membership actually changed.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{Backend, Direction, Query, encode};
use crate::effects::{RetryPolicy, deliver_notification, idempotency_key};
use crate::error::AppError;
use crate::listing::{ListingState, Page, SortSpec, query_with_fallback};
use crate::models::{
    ForumComment, ForumPost, ForumThread, Notification, NotificationKind, User, collections,
};
use crate::reporting::ErrorReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForumSort {
    #[default]
    Newest,
    Popular,
    MostReplies,
    MostViewed,
}

impl ForumSort {
    pub fn sort_spec(self) -> SortSpec {
        match self {
            ForumSort::Newest => SortSpec::desc("createdAt"),
            ForumSort::Popular => SortSpec::desc("likes"),
            ForumSort::MostReplies => SortSpec::desc("replyCount"),
            ForumSort::MostViewed => SortSpec::desc("views"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewThread {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    pub thread: ForumThread,
    pub posts: Vec<ForumPost>,
}

/// Fields shared by everything that can be liked.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LikeTarget {
    author_id: String,
    liked_by: Vec<String>,
    thread_id: Option<String>,
    title: Option<String>,
}

pub struct ForumService {
    backend: Arc<dyn Backend>,
    reporter: Arc<dyn ErrorReporter>,
    retry: RetryPolicy,
}

impl ForumService {
    pub fn new(
        backend: Arc<dyn Backend>,
        reporter: Arc<dyn ErrorReporter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            reporter,
            retry,
        }
    }

    pub async fn create_thread(
        &self,
        author_id: &str,
        new: NewThread,
    ) -> Result<ForumThread, AppError> {
        let title = new.title.trim();
        let content = new.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(AppError::Validation("title and content are required".into()));
        }
        let author = self.author(author_id).await?;

        let mut thread = ForumThread {
            title: title.to_string(),
            content: content.to_string(),
            category: new.category.trim().to_string(),
            tags: new
                .tags
                .into_iter()
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect(),
            author_id: author_id.to_string(),
            author_name: author.display_name(),
            created_at: Utc::now(),
            ..Default::default()
        };
        thread.id = self
            .backend
            .create(collections::FORUM_THREADS, None, encode(&thread)?)
            .await?;
        tracing::info!("Thread {} created by {}", thread.id, author_id);
        Ok(thread)
    }

    /// The whole collection is fetched and filtered locally.
    pub async fn list_threads(&self, listing: &ListingState) -> Result<Page<ForumThread>, AppError> {
        let query =
            Query::collection(collections::FORUM_THREADS).order_by("createdAt", Direction::Desc);
        let threads = self.backend.query_as::<ForumThread>(&query).await?;
        Ok(listing.apply(&threads))
    }

    /// Opens a thread, counting the view.
    pub async fn view_thread(&self, thread_id: &str) -> Result<ThreadView, AppError> {
        self.backend
            .increment(collections::FORUM_THREADS, thread_id, "views", 1)
            .await?;
        let thread = self
            .backend
            .require::<ForumThread>(collections::FORUM_THREADS, thread_id)
            .await?;
        let posts = self.posts(thread_id).await?;
        Ok(ThreadView { thread, posts })
    }

    pub async fn posts(&self, thread_id: &str) -> Result<Vec<ForumPost>, AppError> {
        let query = Query::collection(collections::FORUM_POSTS)
            .where_eq("threadId", thread_id)
            .order_by("createdAt", Direction::Asc);
        Ok(query_with_fallback(self.backend.as_ref(), &query, |a: &ForumPost, b: &ForumPost| {
            a.created_at.cmp(&b.created_at)
        })
        .await?)
    }

    pub async fn reply(
        &self,
        thread_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<ForumPost, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("reply is empty".into()));
        }
        self.backend
            .require::<ForumThread>(collections::FORUM_THREADS, thread_id)
            .await?;
        let author = self.author(author_id).await?;

        let mut post = ForumPost {
            thread_id: thread_id.to_string(),
            content: content.to_string(),
            author_id: author_id.to_string(),
            author_name: author.display_name(),
            created_at: Utc::now(),
            ..Default::default()
        };
        post.id = self
            .backend
            .create(collections::FORUM_POSTS, None, encode(&post)?)
            .await?;
        self.backend
            .increment(collections::FORUM_THREADS, thread_id, "replyCount", 1)
            .await?;
        Ok(post)
    }

    pub async fn comment(
        &self,
        post_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<ForumComment, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("comment is empty".into()));
        }
        let post = self
            .backend
            .require::<ForumPost>(collections::FORUM_POSTS, post_id)
            .await?;
        let author = self.author(author_id).await?;

        let mut comment = ForumComment {
            post_id: post_id.to_string(),
            content: content.to_string(),
            author_id: author_id.to_string(),
            author_name: author.display_name(),
            created_at: Utc::now(),
            ..Default::default()
        };
        comment.id = self
            .backend
            .create(collections::FORUM_COMMENTS, None, encode(&comment)?)
            .await?;

        if post.author_id != author_id {
            let notification = Notification::new(
                &post.author_id,
                author_id,
                NotificationKind::ForumReaction,
                format!("{} commented on your reply", author.display_name()),
            )
            .with_link(format!("/forum/{}", post.thread_id));
            deliver_notification(
                self.backend.as_ref(),
                self.reporter.as_ref(),
                self.retry,
                "forum-comment",
                &idempotency_key(&[collections::FORUM_COMMENTS, &comment.id]),
                &notification,
            )
            .await;
        }
        Ok(comment)
    }

    pub async fn comments(&self, post_id: &str) -> Result<Vec<ForumComment>, AppError> {
        let query = Query::collection(collections::FORUM_COMMENTS)
            .where_eq("postId", post_id)
            .order_by("createdAt", Direction::Asc);
        Ok(query_with_fallback(
            self.backend.as_ref(),
            &query,
            |a: &ForumComment, b: &ForumComment| a.created_at.cmp(&b.created_at),
        )
        .await?)
    }

    pub async fn toggle_thread_like(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> Result<LikeOutcome, AppError> {
        self.toggle_like(collections::FORUM_THREADS, thread_id, user_id)
            .await
    }

    pub async fn toggle_post_like(
        &self,
        post_id: &str,
        user_id: &str,
    ) -> Result<LikeOutcome, AppError> {
        self.toggle_like(collections::FORUM_POSTS, post_id, user_id)
            .await
    }

    async fn toggle_like(
        &self,
        collection: &'static str,
        id: &str,
        user_id: &str,
    ) -> Result<LikeOutcome, AppError> {
        let target = self.backend.require::<LikeTarget>(collection, id).await?;
        let user = Value::from(user_id);

        if target.liked_by.iter().any(|liker| liker == user_id) {
            let changed = self
                .backend
                .array_remove(collection, id, "likedBy", user)
                .await?;
            if changed {
                self.backend.increment(collection, id, "likes", -1).await?;
            }
            return Ok(LikeOutcome {
                liked: false,
                changed,
            });
        }

        let changed = self
            .backend
            .array_union(collection, id, "likedBy", user)
            .await?;
        if changed {
            self.backend.increment(collection, id, "likes", 1).await?;
            if target.author_id != user_id {
                self.notify_like(collection, id, user_id, &target).await;
            }
        }
        Ok(LikeOutcome {
            liked: true,
            changed,
        })
    }

    /// One notification per liker and target, however often the like is toggled.
    async fn notify_like(&self, collection: &str, id: &str, user_id: &str, target: &LikeTarget) {
        let liker = match self.author(user_id).await {
            Ok(user) => user.display_name(),
            Err(_) => "Someone".to_string(),
        };
        let (text, thread_id) = match &target.title {
            Some(title) => (format!("{liker} liked your thread \"{title}\""), id),
            None => (
                format!("{liker} liked your reply"),
                target.thread_id.as_deref().unwrap_or(id),
            ),
        };
        let notification = Notification::new(
            &target.author_id,
            user_id,
            NotificationKind::ForumReaction,
            text,
        )
        .with_link(format!("/forum/{thread_id}"));

        deliver_notification(
            self.backend.as_ref(),
            self.reporter.as_ref(),
            self.retry,
            "forum-like",
            &idempotency_key(&[collection, id, user_id, "like"]),
            &notification,
        )
        .await;
    }

    async fn author(&self, user_id: &str) -> Result<User, AppError> {
        self.backend
            .get_as::<User>(collections::USERS, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
    }
}
