//! Image attachments: validation, naming and blob storage.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use image::ImageFormat;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, warn};

use soko_db::Store;
use soko_types::{ChatId, UserId};

use crate::backend::load_chat_for;
use crate::error::{ChatError, ChatResult};

/// Root prefix of every chat attachment.
pub const MESSAGES_PREFIX: &str = "messages";

const MAX_FILE_NAME_LEN: usize = 100;

/// Relative, `/`-separated location of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// The chat an attachment belongs to, read from `messages/{chat_id}/...`.
    pub fn chat_id(&self) -> Option<ChatId> {
        let mut parts = self.0.split('/');
        match (parts.next(), parts.next()) {
            (Some(MESSAGES_PREFIX), Some(id)) => ChatId::parse(id).ok(),
            _ => None,
        }
    }
}

/// Binary object storage with public URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<BlobRef>;

    fn public_url(&self, blob: &BlobRef) -> String;

    /// Deleting a missing blob succeeds.
    async fn delete(&self, blob: &BlobRef) -> Result<()>;

    /// Every blob whose path starts with `prefix/`.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobRef>>;
}

/// Stores blobs as plain files under a root directory, served by the HTTP
/// layer at `{public_base_url}/files/{path}`.
pub struct DiskBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl DiskBlobStore {
    pub async fn new(root: PathBuf, public_base_url: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("Attachment storage directory: {}", root.display());
        Ok(Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a blob path onto the disk, refusing anything that could escape the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() || path.contains('\\') {
            bail!("invalid blob path '{}'", path);
        }
        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            bail!("invalid blob path '{}'", path);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<BlobRef> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &bytes).await?;
        Ok(BlobRef::new(path))
    }

    fn public_url(&self, blob: &BlobRef) -> String {
        format!("{}/files/{}", self.public_base_url, blob.path())
    }

    async fn delete(&self, blob: &BlobRef) -> Result<()> {
        let target = self.resolve(blob.path())?;
        match fs::remove_file(&target).await {
            Ok(()) => {
                info!("Deleted blob {}", blob.path());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", blob.path());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobRef>> {
        let start = self.resolve(prefix)?;
        let mut blobs = Vec::new();
        let mut pending = vec![(start, prefix.trim_end_matches('/').to_string())];

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let child = format!("{}/{}", rel, name);
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), child));
                } else {
                    blobs.push(BlobRef::new(child));
                }
            }
        }

        blobs.sort();
        Ok(blobs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedAttachment {
    pub url: String,
    pub path: String,
    pub size: usize,
    pub sha256: String,
    pub content_type: &'static str,
}

/// Validates and stores images sent in chats.
#[derive(Clone)]
pub struct AttachmentUploader {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    max_bytes: usize,
}

impl AttachmentUploader {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, max_bytes: usize) -> Self {
        Self {
            store,
            blobs,
            max_bytes,
        }
    }

    /// Stores `bytes` under `messages/{chat_id}/` and returns its public URL.
    ///
    /// The uploader must be a participant; the bytes must be a PNG, JPEG,
    /// GIF or WebP image no larger than the configured ceiling.
    pub async fn upload_attachment(
        &self,
        chat_id: ChatId,
        uploader: UserId,
        bytes: Bytes,
        file_name: &str,
    ) -> ChatResult<UploadedAttachment> {
        if bytes.is_empty() {
            return Err(ChatError::InvalidFile("file is empty".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(ChatError::InvalidFile(format!(
                "file is {} bytes, the limit is {} bytes",
                bytes.len(),
                self.max_bytes
            )));
        }
        let format = sniff_image(&bytes)
            .ok_or_else(|| ChatError::InvalidFile("file is not a supported image".into()))?;

        load_chat_for(&self.store, chat_id, uploader).await?;

        let path = format!(
            "{}/{}/{}_{}",
            MESSAGES_PREFIX,
            chat_id,
            Utc::now().timestamp_millis(),
            sanitize_file_name(file_name)
        );
        let size = bytes.len();
        let sha256 = hex::encode(Sha256::digest(&bytes));

        let blob = self.blobs.put(&path, bytes).await?;
        info!("{} uploaded {} ({} bytes) to chat {}", uploader, path, size, chat_id);

        Ok(UploadedAttachment {
            url: self.blobs.public_url(&blob),
            path,
            size,
            sha256,
            content_type: format.to_mime_type(),
        })
    }
}

/// Detects the image format from magic bytes. Only formats chat clients
/// render are accepted.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(bytes) {
        Ok(
            format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::WebP),
        ) => Some(format),
        _ => None,
    }
}

/// Reduces a client-supplied name to `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}
