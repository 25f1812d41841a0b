use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod repositories;
mod routes;
mod services;
mod state;

use config::MediaConfig;
use repositories::{PetRepository, PostRepository, UserRepository};
use services::{
    media_store::{LocalMediaStore, MediaStore, S3MediaStore, build_s3_client},
    post_service::PostService,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting petfolio-community with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // Create parent directory if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // Touch the database file so the pool can open it
    match fs::OpenOptions::new().create(true).write(true).open(db_path) {
        Ok(_) => tracing::debug!("Database file can be created/opened."),
        Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // --- Handle migration mode ---
    if migrate {
        run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Media store selection ---
    let (media, uploads_dir): (Arc<dyn MediaStore>, _) = match &cfg.media {
        MediaConfig::Local { upload_dir } => {
            if !Path::new(upload_dir).exists() {
                fs::create_dir_all(upload_dir)?;
                tracing::info!("Created uploads directory at {}", upload_dir);
            }
            (
                Arc::new(LocalMediaStore::new(upload_dir)),
                Some(upload_dir.into()),
            )
        }
        MediaConfig::S3 {
            bucket,
            region,
            endpoint,
            public_url,
            key_prefix,
        } => {
            let client = build_s3_client(region, endpoint.as_deref()).await;
            (
                Arc::new(S3MediaStore::new(
                    client,
                    bucket.clone(),
                    key_prefix,
                    public_url,
                )),
                None,
            )
        }
    };

    // --- Initialize core service ---
    let posts = PostService::new(
        PostRepository::new(db.clone()),
        PetRepository::new(db.clone()),
        UserRepository::new(db.clone()),
        media.clone(),
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(AppState {
        posts,
        media,
        db: db.clone(),
        uploads_dir,
    });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run SQLite migrations manually from the embedded SQL file.
async fn run_migrations(db: &Arc<sqlx::Pool<sqlx::Sqlite>>) -> Result<()> {
    let path = "migrations/0001_init.sql";

    if !Path::new(path).exists() {
        anyhow::bail!("Migration file not found: {}", path);
    }

    let sql = fs::read_to_string(path)?;
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(&**db).await?;
    }

    Ok(())
}
