use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedDbRow, FeedWithOwner};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Add a feed owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::AlreadyExists`] if a feed with this URL is
    /// already registered (by anyone).
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = to_millis(Utc::now());
        let row: Option<FeedDbRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FeedDbRow::into_feed)
            .ok_or(DatabaseError::AlreadyExists("feed"))
    }

    /// Look up a feed by its URL
    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    /// Get a feed by id
    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    /// All feeds with the name of the user who added them, ordered by feed name
    pub async fn list_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.name, f.url, u.name AS owner_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name, f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// The feed that has gone longest without a fetch.
    ///
    /// Never-fetched feeds (`last_fetched_at IS NULL`) come first; ties are
    /// broken by ascending id so selection is deterministic.
    pub async fn get_least_recently_fetched_feed(&self) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> = sqlx::query_as(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    /// Claim a feed for polling by stamping `last_fetched_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] if the feed no longer exists.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let millis = to_millis(at);
        let result =
            sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
                .bind(millis)
                .bind(millis)
                .bind(feed_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("feed"));
        }
        Ok(())
    }
}
