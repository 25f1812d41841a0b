//! Shared application state handed to every handler.

use crate::services::{media_store::MediaStore, post_service::PostService};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    /// Post lifecycle orchestrator.
    pub posts: PostService,

    /// Media store used by readiness probes.
    pub media: Arc<dyn MediaStore>,

    /// Database pool used by readiness probes.
    pub db: Arc<SqlitePool>,

    /// Root of the local uploads directory when the local backend is active;
    /// `None` under the S3 backend (clients fetch absolute URLs directly).
    pub uploads_dir: Option<PathBuf>,
}
