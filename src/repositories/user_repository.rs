//! Read-only lookups over the `users` table.

use crate::models::user::User;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct UserRepository {
    db: Arc<SqlitePool>,
}

impl UserRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Resolve the external-facing identifier (as sent in API paths and
    /// multipart `owner` fields) to the full user record.
    pub async fn find_by_external_id(&self, user_id: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT id, user_id, username FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&*self.db)
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT id, user_id, username FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await
    }
}
