//! Persistence for post documents.
//!
//! A post spans three tables: the `posts` row itself, `post_images` holding
//! the ordered reference list, and `post_pets` linking tagged pets. All
//! multi-table writes run inside a transaction so a post is never persisted
//! with half its image list.

use crate::models::{pet::Pet, post::Post};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

const POST_COLUMNS: &str = "id, description, owner_id, created_at, updated_at";

#[derive(Clone)]
pub struct PostRepository {
    db: Arc<SqlitePool>,
}

/// Row shape for the pets-per-post join.
#[derive(FromRow)]
struct PetLinkRow {
    post_id: Uuid,
    id: Uuid,
    name: String,
    owner_id: Uuid,
}

/// Row shape for the images-per-post join.
#[derive(FromRow)]
struct ImageRow {
    post_id: Uuid,
    reference: String,
}

impl PostRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a post together with its image references and pet links.
    pub async fn insert(&self, post: &Post, images: &[String], pet_ids: &[Uuid]) -> sqlx::Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO posts (id, description, owner_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(post.id)
        .bind(&post.description)
        .bind(post.owner_id)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, reference) in images.iter().enumerate() {
            sqlx::query("INSERT INTO post_images (post_id, position, reference) VALUES (?, ?, ?)")
                .bind(post.id)
                .bind(position as i64)
                .bind(reference)
                .execute(&mut *tx)
                .await?;
        }

        for pet_id in pet_ids {
            sqlx::query("INSERT INTO post_pets (post_id, pet_id) VALUES (?, ?)")
                .bind(post.id)
                .bind(pet_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await
    }

    pub async fn fetch(&self, id: Uuid) -> sqlx::Result<Option<Post>> {
        sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await
    }

    /// All posts, newest first.
    pub async fn list_all(&self) -> sqlx::Result<Vec<Post>> {
        sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC"
        ))
        .fetch_all(&*self.db)
        .await
    }

    /// One owner's posts, newest first.
    pub async fn list_by_owner(&self, owner: Uuid) -> sqlx::Result<Vec<Post>> {
        sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(owner)
        .fetch_all(&*self.db)
        .await
    }

    /// Ordered image references for a single post.
    pub async fn images_for(&self, id: Uuid) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT reference FROM post_images WHERE post_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(&*self.db)
        .await
    }

    /// Ordered image references for a batch of posts, keyed by post id.
    pub async fn images_for_many(
        &self,
        ids: &[Uuid],
    ) -> sqlx::Result<HashMap<Uuid, Vec<String>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT post_id, reference FROM post_images WHERE post_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY post_id, position");

        let rows: Vec<ImageRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        let mut grouped: HashMap<Uuid, Vec<String>> = HashMap::new();
        for row in rows {
            grouped.entry(row.post_id).or_default().push(row.reference);
        }
        Ok(grouped)
    }

    /// Expanded pet records for a batch of posts, keyed by post id.
    pub async fn pets_for_many(&self, ids: &[Uuid]) -> sqlx::Result<HashMap<Uuid, Vec<Pet>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT pp.post_id, p.id, p.name, p.owner_id
             FROM post_pets pp JOIN pets p ON p.id = pp.pet_id
             WHERE pp.post_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY p.name");

        let rows: Vec<PetLinkRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        let mut grouped: HashMap<Uuid, Vec<Pet>> = HashMap::new();
        for row in rows {
            grouped.entry(row.post_id).or_default().push(Pet {
                id: row.id,
                name: row.name,
                owner_id: row.owner_id,
            });
        }
        Ok(grouped)
    }

    /// Rewrite a post's mutable fields.
    ///
    /// The image list is always replaced with the reconciled list; the pet
    /// link set is replaced only when `pet_ids` is provided.
    pub async fn update(
        &self,
        id: Uuid,
        description: &str,
        images: &[String],
        pet_ids: Option<&[Uuid]>,
        updated_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE posts SET description = ?, updated_at = ? WHERE id = ?")
            .bind(description)
            .bind(updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM post_images WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for (position, reference) in images.iter().enumerate() {
            sqlx::query("INSERT INTO post_images (post_id, position, reference) VALUES (?, ?, ?)")
                .bind(id)
                .bind(position as i64)
                .bind(reference)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(pet_ids) = pet_ids {
            sqlx::query("DELETE FROM post_pets WHERE post_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for pet_id in pet_ids {
                sqlx::query("INSERT INTO post_pets (post_id, pet_id) VALUES (?, ?)")
                    .bind(id)
                    .bind(pet_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await
    }

    /// Delete the post row; link tables cascade.
    ///
    /// Returns whether a row was actually removed.
    pub async fn delete(&self, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
