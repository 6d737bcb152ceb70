use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{CreatePostOutcome, DatabaseError, Feed, NewPost};

/// The slice of the store the polling pipeline depends on.
///
/// The scheduler receives an implementation explicitly (`Arc<dyn FeedStore>`)
/// instead of reaching for a global connection. Every call is atomic from the
/// caller's side.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Feed with the oldest `last_fetched_at`, never-fetched feeds first.
    /// `None` when no feeds exist.
    async fn least_recently_fetched_feed(&self) -> Result<Option<Feed>, DatabaseError>;

    /// Stamp `last_fetched_at = now` ahead of network I/O
    async fn claim_feed(&self, feed_id: i64, now: DateTime<Utc>) -> Result<(), DatabaseError>;

    /// Insert a post; an already-stored URL yields [`CreatePostOutcome::Duplicate`]
    async fn create_post(&self, post: &NewPost<'_>) -> Result<CreatePostOutcome, DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn least_recently_fetched_feed(&self) -> Result<Option<Feed>, DatabaseError> {
        self.get_least_recently_fetched_feed().await
    }

    async fn claim_feed(&self, feed_id: i64, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.mark_feed_fetched(feed_id, now).await
    }

    async fn create_post(&self, post: &NewPost<'_>) -> Result<CreatePostOutcome, DatabaseError> {
        Database::create_post(self, post).await
    }
}
