use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, CreatePostOutcome, DatabaseError, NewPost, Post, PostDbRow};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post keyed by its URL.
    ///
    /// Duplicate detection is explicit: `ON CONFLICT(url) DO NOTHING` plus
    /// `RETURNING` yields no row when the URL is already stored, which maps to
    /// [`CreatePostOutcome::Duplicate`]. Any other failure (foreign key,
    /// I/O, lock) surfaces as an error.
    pub async fn create_post(&self, post: &NewPost<'_>) -> Result<CreatePostOutcome, DatabaseError> {
        let now = to_millis(Utc::now());
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            RETURNING id
        "#,
        )
        .bind(post.feed_id)
        .bind(post.title)
        .bind(post.url)
        .bind(post.description)
        .bind(to_millis(post.published_at))
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(match inserted {
            Some((id,)) => CreatePostOutcome::Created(id),
            None => CreatePostOutcome::Duplicate,
        })
    }

    /// Newest posts from the feeds `user_id` follows
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostDbRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at, p.created_at
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostDbRow::into_post).collect())
    }

    /// All posts ingested from one feed, newest first
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostDbRow> = sqlx::query_as(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC, id DESC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostDbRow::into_post).collect())
    }

    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
