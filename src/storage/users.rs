use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, User, UserDbRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::AlreadyExists`] if the name is taken.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = to_millis(Utc::now());
        let row: Option<UserDbRow> = sqlx::query_as(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserDbRow::into_user)
            .ok_or(DatabaseError::AlreadyExists("user"))
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, DatabaseError> {
        let row: Option<UserDbRow> =
            sqlx::query_as("SELECT id, name, created_at, updated_at FROM users WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(UserDbRow::into_user))
    }

    /// All users ordered by name
    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows: Vec<UserDbRow> =
            sqlx::query_as("SELECT id, name, created_at, updated_at FROM users ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(UserDbRow::into_user).collect())
    }

    /// Delete every user. Feeds, follows and posts go with them via
    /// `ON DELETE CASCADE`. Returns the number of users removed.
    pub async fn reset_users(&self) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM users").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM preferences WHERE key LIKE 'session.%'")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, NewPost};
    use chrono::Utc;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = test_db().await;
        let user = db.create_user("alice").await.unwrap();
        assert_eq!(user.name, "alice");

        let found = db.get_user_by_name("alice").await.unwrap();
        assert_eq!(found, Some(user));
        assert!(db.get_user_by_name("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let db = test_db().await;
        db.create_user("alice").await.unwrap();
        let err = db.create_user("alice").await.unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists("user")));
    }

    #[tokio::test]
    async fn test_list_users_sorted() {
        let db = test_db().await;
        db.create_user("carol").await.unwrap();
        db.create_user("alice").await.unwrap();

        let names: Vec<String> = db
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn test_reset_cascades() {
        let db = test_db().await;
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("Feed", "https://example.com/rss", user.id)
            .await
            .unwrap();
        db.create_feed_follow(user.id, feed.id).await.unwrap();
        db.create_post(&NewPost {
            feed_id: feed.id,
            title: "Post",
            url: "https://example.com/1",
            description: "",
            published_at: Utc::now(),
        })
        .await
        .unwrap();
        db.set_current_user("alice").await.unwrap();

        let removed = db.reset_users().await.unwrap();
        assert_eq!(removed, 1);

        assert!(db.list_users().await.unwrap().is_empty());
        assert!(db.list_feeds_with_owner().await.unwrap().is_empty());
        assert!(db.get_feed(feed.id).await.unwrap().is_none());
        assert_eq!(db.count_posts().await.unwrap(), 0);
        assert!(db.current_user().await.unwrap().is_none());
    }
}
