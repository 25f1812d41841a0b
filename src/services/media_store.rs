//! src/services/media_store.rs
//!
//! MediaStore — capability interface over image blob storage, with two
//! implementations selectable by configuration: local disk under an uploads
//! directory, or an S3-compatible bucket addressed by public URL. Post
//! documents store only the returned references; payload bytes never touch
//! the database.

use async_trait::async_trait;
use aws_sdk_s3::{Client, config::Region, primitives::ByteStream};
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Folder (local) and key segment (remote) under which post media lives.
const POST_FOLDER: &str = "Post";

/// Client-facing prefix for locally stored references.
const LOCAL_PUBLIC_PREFIX: &str = "/uploads/Post/";

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("reference `{0}` does not belong to this media store")]
    ForeignReference(String),
    #[error("invalid media filename")]
    InvalidFilename,
    #[error("remote store error: {0}")]
    Remote(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type MediaResult<T> = Result<T, MediaStoreError>;

/// An image file received from a multipart request, held in memory until it
/// is handed to a store.
#[derive(Clone, Debug)]
pub struct MediaUpload {
    /// Client-supplied file name; sanitized before use.
    pub filename: String,

    /// MIME type as declared by the client, if any.
    pub content_type: Option<String>,

    /// Raw payload bytes.
    pub data: Bytes,
}

/// Abstraction over image blob storage.
///
/// `store` returns the client-facing reference recorded on the post;
/// `delete` derives the backing key from such a reference and removes the
/// blob. One scheme per deployment: local references are root-relative
/// paths, remote references are absolute URLs. The two are never mixed.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist an uploaded file and return its reference.
    async fn store(&self, upload: MediaUpload) -> MediaResult<String>;

    /// Remove the blob behind a previously returned reference.
    ///
    /// A missing blob is not an error; the post document is the source of
    /// truth, not the store's contents.
    async fn delete(&self, reference: &str) -> MediaResult<()>;

    /// Readiness check used by `/readyz`.
    async fn probe(&self) -> MediaResult<()>;
}

/// Reduce a client-supplied file name to a safe single path segment.
///
/// Takes the last path component, keeps ASCII alphanumerics plus `.`, `-`,
/// and `_`, and maps everything else to `_`. An empty result falls back to
/// a fixed name so the stored key is never blank.
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim_matches('.');
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Build the stored file name for an upload: a fresh UUID prefix keeps
/// concurrent uploads of the same file name from colliding.
fn stored_name(upload: &MediaUpload) -> String {
    format!("{}-{}", Uuid::new_v4(), sanitize_filename(&upload.filename))
}

// ---------------------------------------------------------------------------
// Local disk backend
// ---------------------------------------------------------------------------

/// Media store writing files beneath `<root>/Post/` and exposing them as
/// `/uploads/Post/<name>` references, served by this process.
#[derive(Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding post media payloads.
    fn post_dir(&self) -> PathBuf {
        self.root.join(POST_FOLDER)
    }

    /// Map a stored reference back to its payload path.
    ///
    /// Rejects references outside `/uploads/Post/` and file names that could
    /// escape the directory (`..`, separators, control bytes).
    fn payload_path(&self, reference: &str) -> MediaResult<PathBuf> {
        let name = reference
            .strip_prefix(LOCAL_PUBLIC_PREFIX)
            .ok_or_else(|| MediaStoreError::ForeignReference(reference.to_string()))?;
        ensure_name_safe(name)?;
        Ok(self.post_dir().join(name))
    }
}

/// Validate a single stored file name.
pub(crate) fn ensure_name_safe(name: &str) -> MediaResult<()> {
    if name.is_empty() || name.contains("..") {
        return Err(MediaStoreError::InvalidFilename);
    }
    if name
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\' || b == b'\0')
    {
        return Err(MediaStoreError::InvalidFilename);
    }
    Ok(())
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    /// Write the payload to a temporary file, fsync, then atomically rename
    /// into place. A failed write never leaves a partial payload behind.
    async fn store(&self, upload: MediaUpload) -> MediaResult<String> {
        let dir = self.post_dir();
        fs::create_dir_all(&dir).await?;

        let name = stored_name(&upload);
        let final_path = dir.join(&name);
        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));

        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = file.write_all(&upload.data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaStoreError::Io(err));
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaStoreError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaStoreError::Io(err));
        }

        Ok(format!("{}{}", LOCAL_PUBLIC_PREFIX, name))
    }

    async fn delete(&self, reference: &str) -> MediaResult<()> {
        let path = self.payload_path(reference)?;
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed media file {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("media file {} already missing", path.display());
            }
            Err(err) => return Err(MediaStoreError::Io(err)),
        }
        Ok(())
    }

    /// Best-effort write/read/delete round-trip under the uploads root.
    async fn probe(&self) -> MediaResult<()> {
        fs::create_dir_all(&self.root).await?;
        let tmp = self.root.join(format!(".probe-{}", Uuid::new_v4()));
        fs::write(&tmp, b"probe").await?;
        let bytes = fs::read(&tmp).await?;
        let _ = fs::remove_file(&tmp).await;
        if bytes != b"probe" {
            return Err(MediaStoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "probe file content mismatch",
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// S3-compatible backend
// ---------------------------------------------------------------------------

/// Media store uploading to an S3-compatible bucket. References are absolute
/// URLs beneath `public_base`, usable by clients as-is.
#[derive(Clone)]
pub struct S3MediaStore {
    client: Client,
    bucket: String,
    key_prefix: String,
    public_base: String,
}

impl S3MediaStore {
    pub fn new(
        client: Client,
        bucket: impl Into<String>,
        key_prefix: &str,
        public_base: &str,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key_prefix: key_prefix.trim_matches('/').to_string(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn object_key(&self, name: &str) -> String {
        if self.key_prefix.is_empty() {
            format!("{}/{}", POST_FOLDER, name)
        } else {
            format!("{}/{}/{}", self.key_prefix, POST_FOLDER, name)
        }
    }
}

/// Recover the bucket key from a stored URL reference.
///
/// Accepts `<public_base>/<key>` URLs as well as bare keys (tolerated so a
/// public-base reconfiguration does not orphan existing posts' media).
fn derive_object_key(reference: &str, public_base: &str) -> MediaResult<String> {
    if let Some(key) = reference
        .strip_prefix(public_base)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        if key.is_empty() {
            return Err(MediaStoreError::ForeignReference(reference.to_string()));
        }
        return Ok(key.to_string());
    }
    if !reference.contains("://") && !reference.starts_with('/') && !reference.is_empty() {
        return Ok(reference.to_string());
    }
    Err(MediaStoreError::ForeignReference(reference.to_string()))
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn store(&self, upload: MediaUpload) -> MediaResult<String> {
        let key = self.object_key(&stored_name(&upload));
        let MediaUpload {
            content_type, data, ..
        } = upload;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        request
            .send()
            .await
            .map_err(|err| MediaStoreError::Remote(err.to_string()))?;

        Ok(format!("{}/{}", self.public_base, key))
    }

    async fn delete(&self, reference: &str) -> MediaResult<()> {
        let key = derive_object_key(reference, &self.public_base)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| MediaStoreError::Remote(err.to_string()))?;
        debug!("removed remote media object {}", key);
        Ok(())
    }

    async fn probe(&self) -> MediaResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| MediaStoreError::Remote(err.to_string()))?;
        Ok(())
    }
}

/// Build an S3 client from region and optional custom endpoint, using the
/// ambient AWS credential chain.
pub async fn build_s3_client(region: &str, endpoint: Option<&str>) -> Client {
    let shared_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
    if let Some(endpoint) = endpoint {
        if !endpoint.trim().is_empty() {
            builder = builder.endpoint_url(endpoint);
        }
    }

    Client::from_conf(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch_store() -> (LocalMediaStore, PathBuf) {
        let root = env::temp_dir().join(format!("community-media-{}", Uuid::new_v4()));
        (LocalMediaStore::new(&root), root)
    }

    fn upload(name: &str, payload: &'static [u8]) -> MediaUpload {
        MediaUpload {
            filename: name.to_string(),
            content_type: Some("image/jpeg".to_string()),
            data: Bytes::from_static(payload),
        }
    }

    #[test]
    fn sanitize_keeps_simple_names() {
        assert_eq!(sanitize_filename("nap.jpg"), "nap.jpg");
        assert_eq!(sanitize_filename("my dog.png"), "my_dog.png");
    }

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\photos\\cat.jpg"), "cat.jpg");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn derive_key_from_url_and_bare_key() {
        let base = "https://cdn.example.com";
        assert_eq!(
            derive_object_key("https://cdn.example.com/media/Post/a.jpg", base).unwrap(),
            "media/Post/a.jpg"
        );
        assert_eq!(
            derive_object_key("media/Post/a.jpg", base).unwrap(),
            "media/Post/a.jpg"
        );
        assert!(derive_object_key("https://other.example.com/x.jpg", base).is_err());
        assert!(derive_object_key("/uploads/Post/a.jpg", base).is_err());
    }

    #[tokio::test]
    async fn local_store_and_delete_roundtrip() {
        let (store, root) = scratch_store();

        let reference = store.store(upload("nap.jpg", b"jpeg-bytes")).await.unwrap();
        assert!(reference.starts_with("/uploads/Post/"));
        assert!(reference.ends_with("-nap.jpg"));

        let path = store.payload_path(&reference).unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"jpeg-bytes");

        store.delete(&reference).await.unwrap();
        assert!(!path.exists());

        // a second delete of the same reference is tolerated
        store.delete(&reference).await.unwrap();

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn local_rejects_foreign_and_traversal_references() {
        let (store, _root) = scratch_store();

        assert!(matches!(
            store.delete("/etc/passwd").await,
            Err(MediaStoreError::ForeignReference(_))
        ));
        assert!(matches!(
            store.delete("/uploads/Post/../secret").await,
            Err(MediaStoreError::InvalidFilename)
        ));
        assert!(matches!(
            store.delete("/uploads/Post/a/b.jpg").await,
            Err(MediaStoreError::InvalidFilename)
        ));
    }

    #[tokio::test]
    async fn local_probe_round_trips() {
        let (store, root) = scratch_store();
        store.probe().await.unwrap();
        let _ = fs::remove_dir_all(&root).await;
    }
}
