//! Represents a pet profile, consumed read-only by this service.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A pet that can be tagged on community posts.
///
/// Pets belong to exactly one owner; a post may only tag pets owned by the
/// post's owner.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Pet display name.
    pub name: String,

    /// Owning user's internal id.
    pub owner_id: Uuid,
}
