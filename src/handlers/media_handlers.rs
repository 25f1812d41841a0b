//! Streams locally stored post media, standing in for the static file
//! mount of earlier service generations. Only mounted usefully when the
//! local media backend is active; under the S3 backend clients follow
//! absolute URLs and this route answers 404.

use crate::{errors::AppError, services::media_store::ensure_name_safe, state::AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use std::io::ErrorKind;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// GET `/uploads/Post/{filename}` — stream a stored image from disk.
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let Some(uploads_dir) = &state.uploads_dir else {
        return Err(AppError::not_found("File not found"));
    };
    ensure_name_safe(&filename).map_err(|_| AppError::not_found("File not found"))?;

    let path = uploads_dir.join("Post").join(&filename);
    let file = File::open(&path).await.map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            AppError::not_found("File not found")
        } else {
            AppError::internal(err.to_string())
        }
    })?;

    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(content_type_for(&filename)),
    );
    Ok(response)
}

/// Best-effort content type from the file extension.
fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_ascii_lowercase) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_covers_common_image_extensions() {
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("b.png"), "image/png");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
