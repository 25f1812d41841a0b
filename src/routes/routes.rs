//! Defines routes for the community-post API.
//!
//! ## Structure
//! - **Post endpoints** (under `/api/community-posts`)
//!   - `POST   /api/community-posts` — create a post (multipart)
//!   - `GET    /api/community-posts` — list all posts, newest first
//!   - `GET    /api/community-posts/user/{user_id}` — one owner's posts
//!   - `GET    /api/community-posts/communityposts/{id}` — single post (edit view)
//!   - `POST   /api/community-posts/updatePost/{id}` — update a post (multipart)
//!   - `DELETE /api/community-posts/{id}` — delete a post and its media
//!
//! - **Media**
//!   - `GET    /uploads/Post/{filename}` — stream a locally stored image
//!
//! The multipart endpoints accept up to 4 image files per request.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        media_handlers::serve_upload,
        post_handlers::{
            create_post, delete_post, get_post, list_posts, list_user_posts, update_post,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Upper bound on a whole multipart request body: four images plus fields.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Build and return the router for all community-post routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // post endpoints
        .route("/api/community-posts", post(create_post).get(list_posts))
        .route("/api/community-posts/user/{user_id}", get(list_user_posts))
        .route(
            "/api/community-posts/communityposts/{id}",
            get(get_post),
        )
        .route("/api/community-posts/updatePost/{id}", post(update_post))
        .route("/api/community-posts/{id}", delete(delete_post))
        // locally stored media
        .route("/uploads/Post/{filename}", get(serve_upload))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
