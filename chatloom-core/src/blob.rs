//! Filesystem blob store for attachment payloads
//!
//! Each attachment occupies one directory under the configured root, named by
//! its id, holding the stored file plus a `metadata.json` side-file. The blob
//! store owns the bytes; the SQLite metadata store never sees them.
//!
//! When constructed with a metadata mirror, create/delete best-effort keep a
//! structured [`Attachment`] record in the metadata store. A mirror failure is
//! logged and swallowed: the blob store is the primary and never rolls back.

use crate::error::{Error, Result};
use crate::store::MetadataStore;
use crate::types::{
    Attachment, AttachmentCreateParams, AttachmentPayload, FileAttachment, ImageAttachment,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

const METADATA_FILE: &str = "metadata.json";

/// Side-file contents for one stored attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub id: String,
    /// Declared display name
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Filename of the blob inside the attachment directory
    pub stored_name: String,
    pub created_at: DateTime<Utc>,
}

/// Filesystem-backed attachment store.
pub struct BlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
    mirror: Option<Arc<MetadataStore>>,
}

impl BlobStore {
    /// Create a blob store rooted at `root`, creating the directory if needed.
    ///
    /// `public_base_url` is the prefix for image preview links; without it,
    /// previews fall back to local `file://` references.
    pub fn open(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
            mirror: None,
        })
    }

    /// Mirror attachment records into a metadata store on create/delete.
    pub fn with_mirror(mut self, mirror: Arc<MetadataStore>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Store a new attachment and return its typed record.
    ///
    /// `image/*` MIME types yield the image variant with a preview URL;
    /// everything else is a plain file attachment.
    pub async fn create(
        &self,
        params: AttachmentCreateParams,
        payload: AttachmentPayload,
    ) -> Result<Attachment> {
        let id = Uuid::new_v4().to_string();
        let bytes = resolve_payload(payload).await?;
        let size = bytes.len() as u64;
        let stored_name = derive_stored_name(&params.name, &params.mime_type, &id);

        let dir = self.attachment_dir(&id);
        let meta = BlobMetadata {
            id: id.clone(),
            name: params.name.clone(),
            mime_type: params.mime_type.clone(),
            size,
            stored_name: stored_name.clone(),
            created_at: Utc::now(),
        };

        let blob_path = task::spawn_blocking(move || -> Result<PathBuf> {
            std::fs::create_dir_all(&dir)?;
            let blob_path = dir.join(&meta.stored_name);
            std::fs::write(&blob_path, &bytes)?;
            // Side-file is rewritten whole in a single flush, never patched
            let json = serde_json::to_string_pretty(&meta)?;
            std::fs::write(dir.join(METADATA_FILE), json)?;
            Ok(std::fs::canonicalize(&blob_path).unwrap_or(blob_path))
        })
        .await
        .map_err(|e| Error::Runtime(format!("blocking task failed: {}", e)))??;

        let attachment = if is_image_mime(&params.mime_type) {
            let preview_url = match &self.public_base_url {
                Some(base) => format!("{}/{}/{}", base, id, stored_name),
                None => format!("file://{}", blob_path.display()),
            };
            Attachment::Image(ImageAttachment {
                id,
                name: params.name,
                mime_type: params.mime_type,
                size,
                upload_url: None,
                preview_url,
            })
        } else {
            Attachment::File(FileAttachment {
                id,
                name: params.name,
                mime_type: params.mime_type,
                size,
                upload_url: None,
            })
        };

        tracing::debug!(
            attachment_id = %attachment.id(),
            size,
            mime_type = %attachment.mime_type(),
            "Stored attachment"
        );

        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.save_attachment_record(&attachment).await {
                tracing::warn!(
                    attachment_id = %attachment.id(),
                    error = %e,
                    "Failed to mirror attachment record"
                );
            }
        }

        Ok(attachment)
    }

    /// Remove an attachment's directory and everything in it.
    pub async fn delete(&self, attachment_id: &str) -> Result<()> {
        let dir = self.attachment_dir(attachment_id);
        let id = attachment_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            if !dir.exists() {
                return Err(Error::AttachmentNotFound(id));
            }
            std::fs::remove_dir_all(&dir)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Runtime(format!("blocking task failed: {}", e)))??;

        if let Some(mirror) = &self.mirror {
            match mirror.delete_attachment_record(attachment_id).await {
                Ok(()) => {}
                // The mirror may legitimately have no record for this id
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(
                        attachment_id = %attachment_id,
                        error = %e,
                        "Failed to delete mirrored attachment record"
                    );
                }
            }
        }

        Ok(())
    }

    /// Absolute path to an attachment's stored file.
    pub async fn local_path(&self, attachment_id: &str) -> Result<PathBuf> {
        let meta = self.metadata(attachment_id).await?;
        if meta.stored_name.is_empty() {
            return Err(Error::AttachmentNotFound(attachment_id.to_string()));
        }

        let path = self.attachment_dir(attachment_id).join(&meta.stored_name);
        task::spawn_blocking(move || std::fs::canonicalize(&path).unwrap_or(path))
            .await
            .map_err(|e| Error::Runtime(format!("blocking task failed: {}", e)))
    }

    /// Read an attachment's side-file.
    pub async fn metadata(&self, attachment_id: &str) -> Result<BlobMetadata> {
        let path = self.attachment_dir(attachment_id).join(METADATA_FILE);
        let id = attachment_id.to_string();

        task::spawn_blocking(move || -> Result<BlobMetadata> {
            if !path.exists() {
                return Err(Error::AttachmentNotFound(id));
            }
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&content)?)
        })
        .await
        .map_err(|e| Error::Runtime(format!("blocking task failed: {}", e)))?
    }

    fn attachment_dir(&self, attachment_id: &str) -> PathBuf {
        self.root.join(attachment_id)
    }
}

/// Resolve a payload source to its raw bytes.
async fn resolve_payload(payload: AttachmentPayload) -> Result<Vec<u8>> {
    match payload {
        AttachmentPayload::Bytes(bytes) => Ok(bytes),
        AttachmentPayload::FilePath(path) => {
            task::spawn_blocking(move || -> Result<Vec<u8>> {
                if !path.exists() {
                    return Err(Error::InvalidArgument(format!(
                        "attachment payload path does not exist: {}",
                        path.display()
                    )));
                }
                Ok(std::fs::read(&path)?)
            })
            .await
            .map_err(|e| Error::Runtime(format!("blocking task failed: {}", e)))?
        }
        AttachmentPayload::Reader(mut reader) => {
            task::spawn_blocking(move || -> Result<Vec<u8>> {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            })
            .await
            .map_err(|e| Error::Runtime(format!("blocking task failed: {}", e)))?
        }
    }
}

/// Base name of the declared filename, or a synthesized `id` + MIME extension.
fn derive_stored_name(name: &str, mime_type: &str, fallback: &str) -> String {
    let candidate = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .unwrap_or("");
    if !candidate.is_empty() && candidate != "." {
        return candidate.to_string();
    }

    match mime_guess::get_mime_extensions_str(mime_type).and_then(|exts| exts.first()) {
        Some(ext) => format!("{}.{}", fallback, ext),
        None => fallback.to_string(),
    }
}

fn is_image_mime(mime_type: &str) -> bool {
    mime_type.to_ascii_lowercase().starts_with("image/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn params(name: &str, mime_type: &str) -> AttachmentCreateParams {
        AttachmentCreateParams {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_file_attachment() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        let att = store
            .create(
                params("report.pdf", "application/pdf"),
                b"pdf bytes".as_slice().into(),
            )
            .await
            .unwrap();

        assert!(matches!(att, Attachment::File(_)));
        assert!(att.preview_url().is_none());
        assert_eq!(att.size(), 9);

        let blob = tmp.path().join(att.id()).join("report.pdf");
        assert_eq!(std::fs::read(blob).unwrap(), b"pdf bytes");

        let meta = store.metadata(att.id()).await.unwrap();
        assert_eq!(meta.stored_name, "report.pdf");
        assert_eq!(meta.size, 9);
        assert_eq!(meta.mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_image_attachment_gets_public_preview_url() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(
            tmp.path(),
            Some("https://files.example.com/attachments/".to_string()),
        )
        .unwrap();

        let att = store
            .create(params("photo.png", "image/png"), b"png".as_slice().into())
            .await
            .unwrap();

        let preview = att.preview_url().expect("image should carry a preview");
        assert_eq!(
            preview,
            format!("https://files.example.com/attachments/{}/photo.png", att.id())
        );
    }

    #[tokio::test]
    async fn test_image_preview_falls_back_to_file_uri() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        let att = store
            .create(params("photo.png", "image/png"), b"png".as_slice().into())
            .await
            .unwrap();

        let preview = att.preview_url().unwrap();
        assert!(preview.starts_with("file://"), "got {}", preview);
        assert!(preview.ends_with("/photo.png"));
    }

    #[tokio::test]
    async fn test_stored_name_sanitized_to_base_name() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        let att = store
            .create(
                params("uploads/2026/notes.txt", "text/plain"),
                b"hi".as_slice().into(),
            )
            .await
            .unwrap();

        let meta = store.metadata(att.id()).await.unwrap();
        assert_eq!(meta.stored_name, "notes.txt");
    }

    #[tokio::test]
    async fn test_stored_name_synthesized_when_name_unusable() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        let att = store
            .create(params("", "image/png"), b"png".as_slice().into())
            .await
            .unwrap();

        let meta = store.metadata(att.id()).await.unwrap();
        assert!(
            meta.stored_name.starts_with(att.id()),
            "stored name should derive from the id"
        );
        assert!(meta.stored_name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_payload_from_file_path() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path().join("blobs"), None).unwrap();

        let source = tmp.path().join("source.bin");
        std::fs::write(&source, b"payload from disk").unwrap();

        let att = store
            .create(
                params("copy.bin", "application/octet-stream"),
                AttachmentPayload::FilePath(source),
            )
            .await
            .unwrap();
        assert_eq!(att.size(), 17);
    }

    #[tokio::test]
    async fn test_payload_from_missing_path_is_invalid_argument() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        let err = store
            .create(
                params("ghost.bin", "application/octet-stream"),
                AttachmentPayload::FilePath(tmp.path().join("does-not-exist")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_payload_from_reader() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        let reader = std::io::Cursor::new(b"streamed bytes".to_vec());
        let att = store
            .create(
                params("stream.txt", "text/plain"),
                AttachmentPayload::Reader(Box::new(reader)),
            )
            .await
            .unwrap();
        assert_eq!(att.size(), 14);

        let path = store.local_path(att.id()).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"streamed bytes");
    }

    #[tokio::test]
    async fn test_delete_removes_directory() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        let att = store
            .create(params("gone.txt", "text/plain"), b"x".as_slice().into())
            .await
            .unwrap();
        assert!(tmp.path().join(att.id()).exists());

        store.delete(att.id()).await.unwrap();
        assert!(!tmp.path().join(att.id()).exists());

        let err = store.metadata(att.id()).await.unwrap_err();
        assert!(matches!(err, Error::AttachmentNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_attachment_fails() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        let err = store.delete("ghost").await.unwrap_err();
        assert!(matches!(err, Error::AttachmentNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_local_path_missing_metadata_fails() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        let err = store.local_path("ghost").await.unwrap_err();
        assert!(matches!(err, Error::AttachmentNotFound(_)));
    }

    #[tokio::test]
    async fn test_mirror_records_follow_blob_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let metadata = Arc::new(MetadataStore::open_in_memory().unwrap());
        let store = BlobStore::open(tmp.path(), None)
            .unwrap()
            .with_mirror(Arc::clone(&metadata));

        let att = store
            .create(params("photo.png", "image/png"), b"png".as_slice().into())
            .await
            .unwrap();

        let record = metadata.load_attachment_record(att.id()).await.unwrap();
        assert_eq!(record, att);

        store.delete(att.id()).await.unwrap();
        let err = metadata.load_attachment_record(att.id()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_succeeds_when_mirror_has_no_record() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path(), None).unwrap();

        // Created without a mirror, deleted with one: the missing record is fine
        let att = store
            .create(params("a.txt", "text/plain"), b"x".as_slice().into())
            .await
            .unwrap();

        let metadata = Arc::new(MetadataStore::open_in_memory().unwrap());
        let mirrored = BlobStore::open(tmp.path(), None)
            .unwrap()
            .with_mirror(metadata);
        mirrored.delete(att.id()).await.unwrap();
    }

    #[test]
    fn test_derive_stored_name() {
        assert_eq!(derive_stored_name("a.txt", "text/plain", "id1"), "a.txt");
        assert_eq!(derive_stored_name("dir/a.txt", "text/plain", "id1"), "a.txt");
        assert!(derive_stored_name("  ", "text/plain", "id1").starts_with("id1."));
        assert!(derive_stored_name("", "image/png", "id1").ends_with(".png"));
        assert_eq!(
            derive_stored_name("", "application/x-unknown-subtype", "id1"),
            "id1"
        );
    }

    #[test]
    fn test_is_image_mime() {
        assert!(is_image_mime("image/png"));
        assert!(is_image_mime("IMAGE/JPEG"));
        assert!(!is_image_mime("application/pdf"));
        assert!(!is_image_mime("text/plain"));
    }
}
