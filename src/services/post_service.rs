//! src/services/post_service.rs
//!
//! PostService — orchestrates the community post lifecycle: validates owner
//! and pet references, stages uploads into the MediaStore, reconciles the
//! image list on update, and cleans up orphaned media on update and delete.
//! The post document is the source of truth; media cleanup is best-effort
//! and never blocks a mutation that has already been decided.

use crate::{
    models::{
        post::{MAX_IMAGES_PER_POST, Post, PostSummary, PostView},
        user::User,
    },
    repositories::{PetRepository, PostRepository, UserRepository},
    services::media_store::{MediaStore, MediaStoreError, MediaUpload},
};
use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PostError {
    #[error("User not found")]
    OwnerNotFound,
    #[error("Post not found")]
    PostNotFound,
    #[error("You can upload at most {MAX_IMAGES_PER_POST} images ({submitted} submitted)")]
    TooManyImages { submitted: usize },
    #[error(transparent)]
    Media(#[from] MediaStoreError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub type PostResult<T> = Result<T, PostError>;

/// Fields accepted by the create operation.
#[derive(Debug, Default)]
pub struct NewPost {
    pub description: String,

    /// External-facing identifier of the claimed owner.
    pub owner_user_id: String,

    /// Candidate pet ids; entries that do not parse or do not belong to the
    /// owner are silently dropped.
    pub pet_ids: Vec<String>,

    pub images: Vec<MediaUpload>,
}

/// Fields accepted by the update operation.
#[derive(Debug, Default)]
pub struct PostUpdate {
    /// `Some` replaces the description (empty string included); `None`
    /// leaves it unchanged.
    pub description: Option<String>,

    /// A non-empty list replaces the stored pet set after re-validation;
    /// an empty list leaves the stored set unchanged.
    pub pet_ids: Vec<String>,

    /// References of already-stored images the client wants to keep.
    pub keep_images: Vec<String>,

    pub new_images: Vec<MediaUpload>,
}

/// Service owning the post lifecycle. Collaborators are injected so tests
/// can run against an in-memory database and a scratch media directory.
#[derive(Clone)]
pub struct PostService {
    posts: PostRepository,
    pets: PetRepository,
    users: UserRepository,
    media: Arc<dyn MediaStore>,
}

impl PostService {
    pub fn new(
        posts: PostRepository,
        pets: PetRepository,
        users: UserRepository,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            posts,
            pets,
            users,
            media,
        }
    }

    /// Create a post from a multipart submission.
    ///
    /// The file count is validated before any byte is staged, so an
    /// over-limit request leaves no stray media behind.
    pub async fn create_post(&self, input: NewPost) -> PostResult<PostView> {
        let owner = self
            .users
            .find_by_external_id(&input.owner_user_id)
            .await?
            .ok_or(PostError::OwnerNotFound)?;

        if input.images.len() > MAX_IMAGES_PER_POST {
            return Err(PostError::TooManyImages {
                submitted: input.images.len(),
            });
        }

        let pet_ids = parse_pet_ids(&input.pet_ids);
        let valid_pets = self.pets.find_owned(&pet_ids, owner.id).await?;
        let valid_pet_ids: Vec<Uuid> = valid_pets.iter().map(|p| p.id).collect();

        let references = self.stage_uploads(input.images).await?;

        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            description: input.description,
            owner_id: owner.id,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.posts.insert(&post, &references, &valid_pet_ids).await {
            // the document write failed, so the staged media is unreachable
            self.discard_media(&references).await;
            return Err(err.into());
        }

        self.expand_one(post.id).await
    }

    /// All posts, newest first, expanded with pets and owner display data.
    pub async fn list_posts(&self) -> PostResult<Vec<PostView>> {
        let rows = self.posts.list_all().await?;
        self.expand(rows).await
    }

    /// One owner's posts, newest first, with pets reduced to names.
    pub async fn list_posts_by_owner(&self, owner_user_id: &str) -> PostResult<Vec<PostSummary>> {
        let owner = self
            .users
            .find_by_external_id(owner_user_id)
            .await?
            .ok_or(PostError::OwnerNotFound)?;

        let rows = self.posts.list_by_owner(owner.id).await?;
        let ids: Vec<Uuid> = rows.iter().map(|p| p.id).collect();
        let mut images = self.posts.images_for_many(&ids).await?;
        let mut pets = self.posts.pets_for_many(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|post| PostSummary {
                images: images.remove(&post.id).unwrap_or_default(),
                pets: pets
                    .remove(&post.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|pet| pet.name)
                    .collect(),
                id: post.id,
                description: post.description,
                created_at: post.created_at,
                updated_at: post.updated_at,
            })
            .collect())
    }

    /// A single post, expanded. Used by the edit view.
    pub async fn get_post(&self, id: Uuid) -> PostResult<PostView> {
        match self.posts.fetch(id).await? {
            Some(_) => self.expand_one(id).await,
            None => Err(PostError::PostNotFound),
        }
    }

    /// Update a post's description, pet set, and image list.
    ///
    /// Image reconciliation: `removed = stored minus keep` is deleted from
    /// the media store (best-effort), new uploads are appended after the
    /// kept references, and the final list must stay within the image cap,
    /// checked before any deletion or upload happens.
    pub async fn update_post(&self, id: Uuid, update: PostUpdate) -> PostResult<PostView> {
        let post = self.posts.fetch(id).await?.ok_or(PostError::PostNotFound)?;
        let stored_images = self.posts.images_for(id).await?;

        let total = update.keep_images.len() + update.new_images.len();
        if total > MAX_IMAGES_PER_POST {
            return Err(PostError::TooManyImages { submitted: total });
        }

        for reference in stored_images
            .iter()
            .filter(|reference| !update.keep_images.contains(*reference))
        {
            if let Err(err) = self.media.delete(reference).await {
                warn!("failed to delete removed media {}: {}", reference, err);
            }
        }

        let new_references = self.stage_uploads(update.new_images).await?;

        let mut images = update.keep_images;
        images.extend(new_references.iter().cloned());

        let description = update.description.unwrap_or(post.description);

        let replacement_pets = if update.pet_ids.is_empty() {
            None
        } else {
            let candidate_ids = parse_pet_ids(&update.pet_ids);
            let valid = self.pets.find_owned(&candidate_ids, post.owner_id).await?;
            Some(valid.into_iter().map(|pet| pet.id).collect::<Vec<_>>())
        };

        if let Err(err) = self
            .posts
            .update(
                id,
                &description,
                &images,
                replacement_pets.as_deref(),
                Utc::now(),
            )
            .await
        {
            self.discard_media(&new_references).await;
            return Err(err.into());
        }

        self.expand_one(id).await
    }

    /// Delete a post and all of its backing media.
    ///
    /// Media deletions are attempted one by one and logged on failure; the
    /// document is removed regardless.
    pub async fn delete_post(&self, id: Uuid) -> PostResult<()> {
        if self.posts.fetch(id).await?.is_none() {
            return Err(PostError::PostNotFound);
        }

        for reference in self.posts.images_for(id).await? {
            if let Err(err) = self.media.delete(&reference).await {
                warn!("failed to delete media {} for post {}: {}", reference, id, err);
            }
        }

        if !self.posts.delete(id).await? {
            return Err(PostError::PostNotFound);
        }
        Ok(())
    }

    /// Upload files in submission order.
    ///
    /// A failed upload aborts the operation; files staged earlier in the
    /// same request are discarded so the failure leaks nothing.
    async fn stage_uploads(&self, uploads: Vec<MediaUpload>) -> PostResult<Vec<String>> {
        let mut references = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.media.store(upload).await {
                Ok(reference) => references.push(reference),
                Err(err) => {
                    self.discard_media(&references).await;
                    return Err(err.into());
                }
            }
        }
        Ok(references)
    }

    /// Best-effort removal of media staged by a failed operation.
    async fn discard_media(&self, references: &[String]) {
        for reference in references {
            if let Err(err) = self.media.delete(reference).await {
                warn!("failed to discard staged media {}: {}", reference, err);
            }
        }
    }

    async fn expand_one(&self, id: Uuid) -> PostResult<PostView> {
        let post = self.posts.fetch(id).await?.ok_or(PostError::PostNotFound)?;
        let mut views = self.expand(vec![post]).await?;
        views.pop().ok_or(PostError::PostNotFound)
    }

    /// Join pets, images, and owner display data onto post rows.
    async fn expand(&self, rows: Vec<Post>) -> PostResult<Vec<PostView>> {
        let ids: Vec<Uuid> = rows.iter().map(|p| p.id).collect();
        let mut images = self.posts.images_for_many(&ids).await?;
        let mut pets = self.posts.pets_for_many(&ids).await?;

        let mut owners: HashMap<Uuid, User> = HashMap::new();
        for post in &rows {
            if !owners.contains_key(&post.owner_id) {
                if let Some(user) = self.users.find_by_id(post.owner_id).await? {
                    owners.insert(post.owner_id, user);
                } else {
                    debug!("owner {} of post {} not resolvable", post.owner_id, post.id);
                }
            }
        }

        Ok(rows
            .into_iter()
            .map(|post| {
                let owner = owners.get(&post.owner_id).cloned();
                PostView {
                    owner_username: owner
                        .as_ref()
                        .map(|user| user.username.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    owner: owner.map(Into::into),
                    images: images.remove(&post.id).unwrap_or_default(),
                    pets: pets.remove(&post.id).unwrap_or_default(),
                    id: post.id,
                    description: post.description,
                    created_at: post.created_at,
                    updated_at: post.updated_at,
                }
            })
            .collect())
    }
}

/// Parse candidate pet id strings, silently dropping anything that is not a
/// well-formed id. Mirrors the ownership filter: bad references are excluded,
/// never an error.
fn parse_pet_ids(raw: &[String]) -> Vec<Uuid> {
    raw.iter()
        .filter_map(|value| match Uuid::parse_str(value) {
            Ok(id) => Some(id),
            Err(_) => {
                debug!("dropping malformed pet id `{}`", value);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::media_store::LocalMediaStore;
    use bytes::Bytes;
    use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
    use std::{env, path::PathBuf};

    struct TestContext {
        service: PostService,
        db: Arc<SqlitePool>,
        media_root: PathBuf,
    }

    impl TestContext {
        /// Filesystem path behind a `/uploads/Post/...` reference.
        fn media_path(&self, reference: &str) -> PathBuf {
            let name = reference
                .strip_prefix("/uploads/Post/")
                .expect("local reference");
            self.media_root.join("Post").join(name)
        }
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.media_root);
        }
    }

    async fn setup() -> TestContext {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        for stmt in include_str!("../../migrations/0001_init.sql")
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }

        let db = Arc::new(pool);
        let media_root = env::temp_dir().join(format!("community-test-{}", Uuid::new_v4()));
        let media = Arc::new(LocalMediaStore::new(&media_root));

        TestContext {
            service: PostService::new(
                PostRepository::new(db.clone()),
                PetRepository::new(db.clone()),
                UserRepository::new(db.clone()),
                media,
            ),
            db,
            media_root,
        }
    }

    async fn seed_user(db: &SqlitePool, user_id: &str, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, user_id, username) VALUES (?, ?, ?)")
            .bind(id)
            .bind(user_id)
            .bind(username)
            .execute(db)
            .await
            .unwrap();
        id
    }

    async fn seed_pet(db: &SqlitePool, owner: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO pets (id, name, owner_id) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(owner)
            .execute(db)
            .await
            .unwrap();
        id
    }

    fn image(name: &str) -> MediaUpload {
        MediaUpload {
            filename: name.to_string(),
            content_type: Some("image/jpeg".to_string()),
            data: Bytes::from_static(b"image-bytes"),
        }
    }

    async fn post_count(db: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_keeps_image_order_and_drops_foreign_pets() {
        let ctx = setup().await;
        let owner = seed_user(&ctx.db, "u1", "mina").await;
        let other = seed_user(&ctx.db, "u2", "boris").await;
        let own_pet = seed_pet(&ctx.db, owner, "Momo").await;
        let foreign_pet = seed_pet(&ctx.db, other, "Rex").await;

        let view = ctx
            .service
            .create_post(NewPost {
                description: "cute nap".to_string(),
                owner_user_id: "u1".to_string(),
                pet_ids: vec![own_pet.to_string(), foreign_pet.to_string()],
                images: vec![image("first.jpg"), image("second.jpg")],
            })
            .await
            .unwrap();

        assert_eq!(view.description, "cute nap");
        assert_eq!(view.owner_username, "mina");
        assert_eq!(view.pets.len(), 1);
        assert_eq!(view.pets[0].id, own_pet);

        assert_eq!(view.images.len(), 2);
        assert!(view.images[0].ends_with("-first.jpg"));
        assert!(view.images[1].ends_with("-second.jpg"));
        for reference in &view.images {
            assert!(ctx.media_path(reference).exists());
        }
    }

    #[tokio::test]
    async fn create_with_unknown_owner_is_rejected() {
        let ctx = setup().await;
        let err = ctx
            .service
            .create_post(NewPost {
                owner_user_id: "nobody".to_string(),
                ..NewPost::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PostError::OwnerNotFound));
    }

    #[tokio::test]
    async fn create_with_five_images_persists_nothing() {
        let ctx = setup().await;
        seed_user(&ctx.db, "u1", "mina").await;

        let err = ctx
            .service
            .create_post(NewPost {
                owner_user_id: "u1".to_string(),
                images: (0..5).map(|i| image(&format!("img{i}.jpg"))).collect(),
                ..NewPost::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PostError::TooManyImages { submitted: 5 }));
        assert_eq!(post_count(&ctx.db).await, 0);
        assert!(!ctx.media_root.join("Post").exists());
    }

    #[tokio::test]
    async fn update_reconciles_removed_and_new_images() {
        let ctx = setup().await;
        seed_user(&ctx.db, "u1", "mina").await;
        let created = ctx
            .service
            .create_post(NewPost {
                owner_user_id: "u1".to_string(),
                images: vec![image("a.jpg"), image("b.jpg")],
                ..NewPost::default()
            })
            .await
            .unwrap();
        let kept = created.images[0].clone();
        let removed = created.images[1].clone();

        let updated = ctx
            .service
            .update_post(
                created.id,
                PostUpdate {
                    keep_images: vec![kept.clone()],
                    new_images: vec![image("c.jpg")],
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.images.len(), 2);
        assert_eq!(updated.images[0], kept);
        assert!(updated.images[1].ends_with("-c.jpg"));

        assert!(ctx.media_path(&kept).exists());
        assert!(!ctx.media_path(&removed).exists());
        assert!(ctx.media_path(&updated.images[1]).exists());
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn update_with_same_keep_list_is_idempotent() {
        let ctx = setup().await;
        seed_user(&ctx.db, "u1", "mina").await;
        let created = ctx
            .service
            .create_post(NewPost {
                owner_user_id: "u1".to_string(),
                images: vec![image("a.jpg"), image("b.jpg")],
                ..NewPost::default()
            })
            .await
            .unwrap();

        let update = || PostUpdate {
            keep_images: created.images.clone(),
            ..PostUpdate::default()
        };
        let first = ctx.service.update_post(created.id, update()).await.unwrap();
        let second = ctx.service.update_post(created.id, update()).await.unwrap();

        assert_eq!(first.images, created.images);
        assert_eq!(second.images, created.images);
        for reference in &created.images {
            assert!(ctx.media_path(reference).exists());
        }
    }

    #[tokio::test]
    async fn update_over_image_cap_leaves_everything_untouched() {
        let ctx = setup().await;
        seed_user(&ctx.db, "u1", "mina").await;
        let created = ctx
            .service
            .create_post(NewPost {
                owner_user_id: "u1".to_string(),
                images: vec![image("a.jpg"), image("b.jpg"), image("c.jpg")],
                ..NewPost::default()
            })
            .await
            .unwrap();

        let err = ctx
            .service
            .update_post(
                created.id,
                PostUpdate {
                    keep_images: created.images.clone(),
                    new_images: vec![image("d.jpg"), image("e.jpg")],
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PostError::TooManyImages { submitted: 5 }));

        // nothing was deleted or uploaded
        let current = ctx.service.get_post(created.id).await.unwrap();
        assert_eq!(current.images, created.images);
        for reference in &created.images {
            assert!(ctx.media_path(reference).exists());
        }
    }

    #[tokio::test]
    async fn update_can_replace_all_images() {
        let ctx = setup().await;
        seed_user(&ctx.db, "u1", "mina").await;
        let created = ctx
            .service
            .create_post(NewPost {
                owner_user_id: "u1".to_string(),
                images: vec![image("a.jpg"), image("b.jpg"), image("c.jpg")],
                ..NewPost::default()
            })
            .await
            .unwrap();

        let updated = ctx
            .service
            .update_post(
                created.id,
                PostUpdate {
                    keep_images: Vec::new(),
                    new_images: (0..4).map(|i| image(&format!("new{i}.jpg"))).collect(),
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.images.len(), 4);
        for reference in &created.images {
            assert!(!ctx.media_path(reference).exists());
        }
        for reference in &updated.images {
            assert!(ctx.media_path(reference).exists());
        }
    }

    #[tokio::test]
    async fn update_description_semantics() {
        let ctx = setup().await;
        seed_user(&ctx.db, "u1", "mina").await;
        let created = ctx
            .service
            .create_post(NewPost {
                description: "original".to_string(),
                owner_user_id: "u1".to_string(),
                ..NewPost::default()
            })
            .await
            .unwrap();

        // omitted description is left unchanged
        let unchanged = ctx
            .service
            .update_post(created.id, PostUpdate::default())
            .await
            .unwrap();
        assert_eq!(unchanged.description, "original");

        // an explicit empty string replaces it
        let cleared = ctx
            .service
            .update_post(
                created.id,
                PostUpdate {
                    description: Some(String::new()),
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.description, "");
    }

    #[tokio::test]
    async fn update_replaces_pets_only_when_provided() {
        let ctx = setup().await;
        let owner = seed_user(&ctx.db, "u1", "mina").await;
        let other = seed_user(&ctx.db, "u2", "boris").await;
        let pet_a = seed_pet(&ctx.db, owner, "Momo").await;
        let pet_b = seed_pet(&ctx.db, owner, "Taro").await;
        let foreign = seed_pet(&ctx.db, other, "Rex").await;

        let created = ctx
            .service
            .create_post(NewPost {
                owner_user_id: "u1".to_string(),
                pet_ids: vec![pet_a.to_string()],
                ..NewPost::default()
            })
            .await
            .unwrap();

        // empty pet list leaves the stored set alone
        let unchanged = ctx
            .service
            .update_post(created.id, PostUpdate::default())
            .await
            .unwrap();
        assert_eq!(unchanged.pets.len(), 1);
        assert_eq!(unchanged.pets[0].id, pet_a);

        // replacement is re-validated against the post's owner
        let replaced = ctx
            .service
            .update_post(
                created.id,
                PostUpdate {
                    pet_ids: vec![pet_b.to_string(), foreign.to_string(), "not-an-id".into()],
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(replaced.pets.len(), 1);
        assert_eq!(replaced.pets[0].id, pet_b);
    }

    #[tokio::test]
    async fn update_unknown_post_is_not_found() {
        let ctx = setup().await;
        let err = ctx
            .service
            .update_post(Uuid::new_v4(), PostUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PostError::PostNotFound));
    }

    #[tokio::test]
    async fn delete_removes_document_and_media() {
        let ctx = setup().await;
        seed_user(&ctx.db, "u1", "mina").await;
        let created = ctx
            .service
            .create_post(NewPost {
                owner_user_id: "u1".to_string(),
                images: vec![image("a.jpg"), image("b.jpg")],
                ..NewPost::default()
            })
            .await
            .unwrap();

        ctx.service.delete_post(created.id).await.unwrap();

        for reference in &created.images {
            assert!(!ctx.media_path(reference).exists());
        }
        let err = ctx.service.get_post(created.id).await.unwrap_err();
        assert!(matches!(err, PostError::PostNotFound));

        let err = ctx.service.delete_post(created.id).await.unwrap_err();
        assert!(matches!(err, PostError::PostNotFound));
    }

    #[tokio::test]
    async fn list_by_owner_is_newest_first_with_pet_names() {
        let ctx = setup().await;
        let owner = seed_user(&ctx.db, "u1", "mina").await;
        seed_user(&ctx.db, "u2", "boris").await;
        let pet = seed_pet(&ctx.db, owner, "Momo").await;

        ctx.service
            .create_post(NewPost {
                description: "older".to_string(),
                owner_user_id: "u1".to_string(),
                pet_ids: vec![pet.to_string()],
                ..NewPost::default()
            })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        ctx.service
            .create_post(NewPost {
                description: "newer".to_string(),
                owner_user_id: "u1".to_string(),
                ..NewPost::default()
            })
            .await
            .unwrap();
        ctx.service
            .create_post(NewPost {
                description: "someone else's".to_string(),
                owner_user_id: "u2".to_string(),
                ..NewPost::default()
            })
            .await
            .unwrap();

        let posts = ctx.service.list_posts_by_owner("u1").await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].description, "newer");
        assert_eq!(posts[1].description, "older");
        assert_eq!(posts[1].pets, vec!["Momo".to_string()]);

        let err = ctx.service.list_posts_by_owner("ghost").await.unwrap_err();
        assert!(matches!(err, PostError::OwnerNotFound));
    }

    #[tokio::test]
    async fn expansion_falls_back_to_unknown_owner() {
        let ctx = setup().await;
        let owner = seed_user(&ctx.db, "u1", "mina").await;
        let created = ctx
            .service
            .create_post(NewPost {
                owner_user_id: "u1".to_string(),
                ..NewPost::default()
            })
            .await
            .unwrap();

        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&*ctx.db)
            .await
            .unwrap();
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(owner)
            .execute(&*ctx.db)
            .await
            .unwrap();

        let view = ctx.service.get_post(created.id).await.unwrap();
        assert!(view.owner.is_none());
        assert_eq!(view.owner_username, "Unknown");
    }
}
