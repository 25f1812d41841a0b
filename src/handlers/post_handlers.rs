//! HTTP handlers for the community-post endpoints.
//! Extracts multipart fields and files, then delegates lifecycle concerns to
//! `PostService`.

use crate::{
    errors::AppError,
    models::post::MAX_IMAGES_PER_POST,
    services::{
        media_store::MediaUpload,
        post_service::{NewPost, PostError, PostUpdate},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::Field},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

/// Multipart fields shared by the create and update endpoints.
///
/// Repeated `pets` / `existingImages` fields accumulate; a single scalar
/// value therefore arrives as a one-element list. Unknown fields are drained
/// and ignored.
#[derive(Default)]
struct PostForm {
    description: Option<String>,
    owner: Option<String>,
    pets: Vec<String>,
    existing_images: Vec<String>,
    images: Vec<MediaUpload>,
}

async fn text_value(field: Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart field: {}", err)))
}

/// Parse a multipart request into a `PostForm`.
///
/// The file-count cap is enforced while reading: the request is rejected as
/// soon as a fifth file shows up, before its bytes are buffered, so nothing
/// gets staged for an over-limit submission.
async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart request: {}", err)))?
    {
        let Some(name) = field.name().map(ToString::to_string) else {
            continue;
        };
        match name.as_str() {
            "description" => form.description = Some(text_value(field).await?),
            "owner" => form.owner = Some(text_value(field).await?),
            "pets" | "pets[]" => form.pets.push(text_value(field).await?),
            "existingImages" | "existingImages[]" => {
                form.existing_images.push(text_value(field).await?)
            }
            "images" | "images[]" => {
                if form.images.len() == MAX_IMAGES_PER_POST {
                    return Err(AppError::bad_request(format!(
                        "You can upload at most {} images",
                        MAX_IMAGES_PER_POST
                    )));
                }
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(ToString::to_string);
                let data = field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("malformed multipart file: {}", err))
                })?;
                form.images.push(MediaUpload {
                    filename,
                    content_type,
                    data,
                });
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    Ok(form)
}

/// POST `/api/community-posts` — create a post from a multipart submission.
pub async fn create_post(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_post_form(multipart).await?;

    let view = state
        .posts
        .create_post(NewPost {
            description: form.description.unwrap_or_default(),
            owner_user_id: form.owner.unwrap_or_default(),
            pet_ids: form.pets,
            images: form.images,
        })
        .await
        .map_err(|err| match err {
            // a bad owner reference is a client error on this endpoint
            PostError::OwnerNotFound => AppError::bad_request(err.to_string()),
            other => other.into(),
        })?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// GET `/api/community-posts` — all posts, newest first, expanded.
pub async fn list_posts(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let views = state.posts.list_posts().await?;
    Ok(Json(views))
}

/// GET `/api/community-posts/user/{user_id}` — one owner's posts, light
/// pet projection.
pub async fn list_user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let posts = state.posts.list_posts_by_owner(&user_id).await?;
    Ok(Json(posts))
}

/// GET `/api/community-posts/communityposts/{id}` — single post for the
/// edit view.
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.posts.get_post(id).await?;
    Ok(Json(view))
}

/// POST `/api/community-posts/updatePost/{id}` — update description, pets,
/// and reconcile the image list.
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_post_form(multipart).await?;

    let view = state
        .posts
        .update_post(
            id,
            PostUpdate {
                description: form.description,
                pet_ids: form.pets,
                keep_images: form.existing_images,
                new_images: form.images,
            },
        )
        .await?;

    Ok(Json(view))
}

/// DELETE `/api/community-posts/{id}` — delete the post and its media.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.posts.delete_post(id).await?;
    Ok(Json(json!({
        "message": "Post and all images deleted successfully"
    })))
}
