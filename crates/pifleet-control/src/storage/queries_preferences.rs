//! Dashboard preference queries.

use pifleet_core::db::{DatabaseError, unix_timestamp};

use super::db::FleetDatabase;
use super::models::UserPreferences;

impl FleetDatabase {
    /// Stored preferences for an identity, if any.
    pub async fn get_preferences(
        &self,
        email: &str,
    ) -> Result<Option<UserPreferences>, DatabaseError> {
        let prefs =
            sqlx::query_as::<_, UserPreferences>("SELECT * FROM user_preferences WHERE email = ?")
                .bind(email)
                .fetch_optional(self.pool())
                .await?;
        Ok(prefs)
    }

    /// Replace the preferences blob for an identity.
    pub async fn put_preferences(
        &self,
        email: &str,
        preferences: &str,
    ) -> Result<UserPreferences, DatabaseError> {
        sqlx::query(
            "INSERT INTO user_preferences (email, preferences, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(email) DO UPDATE SET preferences = excluded.preferences, updated_at = excluded.updated_at",
        )
        .bind(email)
        .bind(preferences)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_preferences(email)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Preferences for {email}")))
    }
}
