//! Filesystem-backed bundle store
//!
//! Each bundle is a single zip file, sharded by the first two characters of
//! its identifier:
//!
//! ```text
//! <store_root>/
//! ├── dj/
//! │   └── django-rest-framework.zip
//! └── re/
//!     └── requests.zip
//! ```
//!
//! Uploads are written to a temporary file in the destination shard and
//! renamed into place, so a concurrent reader sees either the old archive or
//! the new one, never a partial write.

use crate::error::StoreError;
use crate::identifier::BundleId;
use crate::upload::{validate_archive, UploadRequest, DEFAULT_MAX_UNPACKED_BYTES};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// File extension of stored bundles
pub const BUNDLE_EXTENSION: &str = "zip";

/// Content type for whole-bundle downloads
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// A whole stored archive, read verbatim
#[derive(Debug, Clone)]
pub struct BundleArchive {
    pub id: BundleId,
    pub data: Vec<u8>,
    pub content_type: &'static str,
    pub modified: DateTime<Utc>,
}

/// Bundle store rooted at a pre-existing directory
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: PathBuf,
    max_unpacked_bytes: u64,
}

impl BundleStore {
    /// Open the store at `root`.
    ///
    /// The root must already exist and be a directory. This is checked once;
    /// failure here is a configuration error and the service must not start.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();

        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(StoreError::Config(format!(
                    "store root {} is not a directory",
                    root.display()
                )))
            }
            Err(e) => {
                return Err(StoreError::Config(format!(
                    "store root {} is unavailable: {}",
                    root.display(),
                    e
                )))
            }
        }

        info!(path = %root.display(), "Opened bundle store");

        Ok(Self {
            root,
            max_unpacked_bytes: DEFAULT_MAX_UNPACKED_BYTES,
        })
    }

    /// Set the largest total decompressed size accepted for one upload
    pub fn with_max_unpacked_bytes(mut self, limit: u64) -> Self {
        self.max_unpacked_bytes = limit;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shard directory for a bundle: `root/id[0:2]`
    pub fn shard_dir(&self, id: &BundleId) -> PathBuf {
        self.root.join(id.shard())
    }

    /// On-disk path for a bundle: `root/id[0:2]/id.zip`
    pub fn bundle_path(&self, id: &BundleId) -> PathBuf {
        self.shard_dir(id)
            .join(format!("{}.{}", id, BUNDLE_EXTENSION))
    }

    /// Check if a bundle exists
    pub async fn exists(&self, id: &BundleId) -> bool {
        fs::metadata(self.bundle_path(id))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Validate an upload and commit it, replacing any previous bundle with
    /// the same identifier.
    ///
    /// Nothing is written unless the identifier and archive both validate.
    pub async fn commit(&self, upload: &UploadRequest) -> Result<BundleId, StoreError> {
        let id = upload.candidate_id()?;
        let entries = validate_archive(&upload.content, self.max_unpacked_bytes)?;

        let shard_dir = self.shard_dir(&id);
        // Already existing is success, so concurrent first uploads to a shard don't race
        fs::create_dir_all(&shard_dir).await?;

        let final_path = self.bundle_path(&id);
        let temp_path = shard_dir.join(format!(".{}.{}.tmp", id, uuid::Uuid::new_v4()));

        if let Err(e) = write_then_rename(&temp_path, &final_path, &upload.content).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove temp upload");
                }
            }
            return Err(e.into());
        }

        info!(
            id = %id,
            size = upload.content.len(),
            entries,
            "Committed bundle"
        );

        Ok(id)
    }

    /// Retrieve a whole bundle archive without opening it
    pub async fn fetch_archive(&self, id: &BundleId) -> Result<BundleArchive, StoreError> {
        let path = self.bundle_path(id);
        let (data, modified) = self.read_record(id, &path).await?;

        debug!(id = %id, size = data.len(), "Serving bundle archive");

        Ok(BundleArchive {
            id: id.clone(),
            data,
            content_type: ARCHIVE_CONTENT_TYPE,
            modified,
        })
    }

    /// Read a record's bytes and mtime, mapping absence to `NotFound`.
    pub(crate) async fn read_record(
        &self,
        id: &BundleId,
        path: &Path,
    ) -> Result<(Vec<u8>, DateTime<Utc>), StoreError> {
        let not_found = || StoreError::NotFound(format!("bundle {}", id));

        let meta = match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let modified = meta.modified().map(DateTime::<Utc>::from)?;

        let data = match fs::read(path).await {
            Ok(data) => data,
            // replaced or removed between stat and read
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        Ok((data, modified))
    }
}

async fn write_then_rename(temp: &Path, dest: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp, dest).await
}
