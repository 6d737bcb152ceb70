use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, FeedFollow};

impl Database {
    // ========================================================================
    // Feed Follow Operations
    // ========================================================================

    /// Subscribe `user_id` to `feed_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::AlreadyExists`] if the user already follows
    /// the feed.
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, DatabaseError> {
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;

        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, feed_id) DO NOTHING
            RETURNING id
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((follow_id,)) = inserted else {
            return Err(DatabaseError::AlreadyExists("feed follow"));
        };

        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT ff.id, ff.user_id, ff.feed_id, f.name AS feed_name, u.name AS user_name
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            JOIN users u ON u.id = ff.user_id
            WHERE ff.id = ?
        "#,
        )
        .bind(follow_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(follow)
    }

    /// Feeds `user_id` follows, ordered by feed name
    pub async fn get_feed_follows_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<FeedFollow>, DatabaseError> {
        let follows = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT ff.id, ff.user_id, ff.feed_id, f.name AS feed_name, u.name AS user_name
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            JOIN users u ON u.id = ff.user_id
            WHERE ff.user_id = ?
            ORDER BY f.name, ff.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(follows)
    }

    /// Unsubscribe `user_id` from the feed at `feed_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] if the user does not follow a feed
    /// with that URL.
    pub async fn delete_feed_follow_by_url(
        &self,
        user_id: i64,
        feed_url: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            DELETE FROM feed_follows
            WHERE user_id = ?
              AND feed_id IN (SELECT id FROM feeds WHERE url = ?)
        "#,
        )
        .bind(user_id)
        .bind(feed_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("feed follow"));
        }
        Ok(())
    }
}
