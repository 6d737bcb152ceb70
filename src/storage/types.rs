use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock the busy timeout could not wait out
    #[error("The gator database is locked by another process. Please try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A row the caller referenced does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A uniqueness rule rejected the write (duplicate user name, feed URL, follow)
    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[source] sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx(err)
    }
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Timestamps are stored as Unix epoch milliseconds.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

// ============================================================================
// Helper Types
// ============================================================================

/// Raw feed row as read by sqlx
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: i64,
    pub last_fetched_at: Option<i64>,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            name: self.name,
            url: self.url,
            user_id: self.user_id,
            created_at: from_millis(self.created_at),
            last_fetched_at: self.last_fetched_at.map(from_millis),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserDbRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserDbRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: i64,
    pub created_at: i64,
}

impl PostDbRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            url: self.url,
            description: self.description,
            published_at: from_millis(self.published_at),
            created_at: from_millis(self.created_at),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Feed data from database
///
/// `url` is unique across all feeds. `last_fetched_at` is `None` until the
/// scheduler claims the feed for the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// User who added the feed
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Feed joined with the name of the user who added it (for `gator feeds`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedWithOwner {
    pub name: String,
    pub url: String,
    pub owner_name: String,
}

/// A user's subscription to a feed, joined with names for display
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub feed_name: String,
    pub user_name: String,
}

/// Post data from database
///
/// `url` is unique across all posts, regardless of which feed produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fields of a post about to be created
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub feed_id: i64,
    pub title: &'a str,
    pub url: &'a str,
    pub description: &'a str,
    pub published_at: DateTime<Utc>,
}

/// Outcome of a post insert.
///
/// A duplicate URL is an expected steady-state result (the same article is
/// seen again on every poll), so it is a value rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePostOutcome {
    /// A new row was written, carrying its id
    Created(i64),
    /// A post with this URL already exists
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_mark_conversion_detects_locking() {
        let err: DatabaseError = sqlx::Error::Protocol("database is locked".into()).into();
        assert!(matches!(err, DatabaseError::Locked));

        let err: DatabaseError = sqlx::Error::Protocol("SQLITE_BUSY".into()).into();
        assert!(matches!(err, DatabaseError::Locked));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DatabaseError::Other(sqlx::Error::RowNotFound)));
    }
}
