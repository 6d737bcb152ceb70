use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError};

/// Preference key holding the name of the logged-in user
const CURRENT_USER_KEY: &str = "session.current_user";

impl Database {
    // ========================================================================
    // Preference Operations
    // ========================================================================

    /// Get a single preference value by key.
    ///
    /// Keys use dotted convention: `session.current_user`.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT).
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO preferences (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Name of the logged-in user, if any
    pub async fn current_user(&self) -> Result<Option<String>, DatabaseError> {
        self.get_preference(CURRENT_USER_KEY).await
    }

    pub async fn set_current_user(&self, name: &str) -> Result<(), DatabaseError> {
        self.set_preference(CURRENT_USER_KEY, name).await
    }
}
