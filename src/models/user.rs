//! Represents a registered user, consumed read-only by this service.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user account owning pets and community posts.
///
/// Users are provisioned by the surrounding application; this service only
/// resolves and joins them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// External-facing user identifier, as used in API paths and forms.
    pub user_id: String,

    /// Display name shown on posts.
    pub username: String,
}
