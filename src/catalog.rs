//! Bundle listing
//!
//! Walks `root/??/*.zip` on every call. Nothing is cached, so the cost grows
//! with the number of stored bundles.

use crate::error::StoreError;
use crate::identifier::BundleId;
use crate::store::{BundleStore, BUNDLE_EXTENSION};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// One stored bundle as seen by the listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: BundleId,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl BundleStore {
    /// List every stored bundle, sorted by identifier.
    pub async fn catalog(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        let mut entries = Vec::new();

        let mut shards = fs::read_dir(self.root()).await?;
        while let Some(shard) = shards.next_entry().await? {
            let shard_name = shard.file_name().to_string_lossy().into_owned();
            if shard_name.chars().count() != 2 || shard_name.starts_with('.') {
                continue;
            }
            if !shard.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }

            let mut files = match fs::read_dir(shard.path()).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(shard = %shard_name, error = %e, "Skipping unreadable shard");
                    continue;
                }
            };

            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                let Some(id) = bundle_id_from_path(&path, &shard_name) else {
                    continue;
                };

                match fs::metadata(&path).await {
                    Ok(meta) if meta.is_file() => {
                        let modified = match meta.modified() {
                            Ok(time) => DateTime::<Utc>::from(time),
                            Err(e) => {
                                warn!(id = %id, error = %e, "Skipping bundle without mtime");
                                continue;
                            }
                        };
                        entries.push(CatalogEntry {
                            id,
                            size: meta.len(),
                            modified,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => warn!(id = %id, error = %e, "Skipping unreadable bundle"),
                }
            }
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));

        debug!(count = entries.len(), "Listed bundles");

        Ok(entries)
    }
}

/// Identifier for a bundle file, if the file belongs in the catalog.
fn bundle_id_from_path(path: &Path, shard: &str) -> Option<BundleId> {
    if path.extension()?.to_str()? != BUNDLE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    BundleId::parse(stem).filter(|id| id.shard() == shard)
}
