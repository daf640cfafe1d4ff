//! Upload requests and archive validation
//!
//! The HTTP layer turns an incoming request into an [`UploadRequest`] once;
//! [`crate::BundleStore::commit`] then derives the identifier and checks the
//! payload with [`validate_archive`] before anything touches the store.

use crate::error::StoreError;
use crate::identifier::BundleId;
use bytes::Bytes;
use std::io::{Cursor, Read};

/// A typed upload: optional display name, optional original filename, payload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub content: Bytes,
}

impl UploadRequest {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            name: None,
            filename: None,
            content: content.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Identifier this upload will be stored under.
    ///
    /// A non-blank display name wins. Otherwise the original filename is
    /// used with any directory part and `.zip` suffix removed.
    pub fn candidate_id(&self) -> Result<BundleId, StoreError> {
        if let Some(name) = self.name.as_deref().map(str::trim) {
            if !name.is_empty() {
                return BundleId::from_raw(name);
            }
        }

        let filename = self
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| StoreError::Validation("missing bundle name".to_string()))?;

        BundleId::from_raw(strip_zip_suffix(base_name(filename)))
    }
}

/// Default cap on the total decompressed size of one upload (1 GiB)
pub const DEFAULT_MAX_UNPACKED_BYTES: u64 = 1024 * 1024 * 1024;

/// Check that `data` is a zip archive whose entries all pass their CRC check.
///
/// Every entry must decompress to exactly the size its header declares, and
/// the entries together must not expand beyond `max_unpacked` bytes.
/// Returns the number of entries on success.
pub fn validate_archive(data: &[u8], max_unpacked: u64) -> Result<usize, StoreError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| StoreError::Validation(format!("not a zip archive: {}", e)))?;

    let too_large = || {
        StoreError::Validation(format!(
            "archive expands beyond {} bytes",
            max_unpacked
        ))
    };

    let mut unpacked: u64 = 0;
    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| StoreError::Validation(format!("corrupt archive entry {}: {}", i, e)))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let declared = file.size();
        let budget = max_unpacked - unpacked;
        if declared > budget {
            return Err(too_large());
        }

        // The CRC is checked when the reader hits EOF; one byte past the
        // budget is enough to tell an understated size
        let mut limited = file.take(budget.saturating_add(1));
        let read = std::io::copy(&mut limited, &mut std::io::sink())
            .map_err(|e| StoreError::Validation(format!("corrupt archive entry {}: {}", name, e)))?;
        if read > budget {
            return Err(too_large());
        }
        if read != declared {
            return Err(StoreError::Validation(format!(
                "corrupt archive entry {}: declares {} bytes, holds {}",
                name, declared, read
            )));
        }
        unpacked += read;
    }

    Ok(archive.len())
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn strip_zip_suffix(name: &str) -> &str {
    let len = name.len();
    if len >= 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".zip") {
        &name[..len - 4]
    } else {
        name
    }
}
