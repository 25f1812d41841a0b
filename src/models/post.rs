//! Represents a community post and its API projections.

use crate::models::{pet::Pet, user::User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Maximum number of images a single post may carry.
pub const MAX_IMAGES_PER_POST: usize = 4;

/// A community post row as stored in the `posts` table.
///
/// Image references and pet links live in the `post_images` and `post_pets`
/// tables and are joined on read.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Post {
    /// Unique identifier, generated at creation, immutable.
    pub id: Uuid,

    /// Free-text body. May be empty when the post carries images.
    pub description: String,

    /// Owning user's internal id, immutable after creation.
    pub owner_id: Uuid,

    /// Set once at creation.
    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
}

/// Owner attributes exposed on expanded posts.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostOwner {
    pub id: Uuid,
    pub user_id: String,
    pub username: String,
}

impl From<User> for PostOwner {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            user_id: user.user_id,
            username: user.username,
        }
    }
}

/// A post expanded with pet and owner display data, as returned by the
/// create, get, update, and list-all operations.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub description: String,

    /// Ordered media references: kept-in-original-order followed by newly
    /// uploaded, in submission order.
    pub images: Vec<String>,

    /// Fully expanded pet records.
    pub pets: Vec<Pet>,

    /// Expanded owner, absent only if the owner row disappeared between
    /// validation and read-back.
    pub owner: Option<PostOwner>,

    /// Convenience field for feed rendering; "Unknown" when the owner could
    /// not be re-resolved.
    pub owner_username: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lighter projection used when listing a single owner's posts: pets are
/// reduced to their names.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: Uuid,
    pub description: String,
    pub images: Vec<String>,

    /// Pet display names only.
    pub pets: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
