//! Serving files out of stored bundles
//!
//! Entries are looked up by exact internal path. An empty path, or one that
//! ends in `/`, means the directory index and resolves to `index.html`.
//! Conditional retrieval compares the caller's timestamp with the entry's
//! own zip timestamp for exact equality only.

use crate::error::StoreError;
use crate::identifier::BundleId;
use crate::store::BundleStore;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::io::{Cursor, Read};
use tracing::debug;

/// Directory index document
pub const INDEX_DOCUMENT: &str = "index.html";

/// Validity window attached to a not-modified outcome
pub const NOT_MODIFIED_SECS: i64 = 5 * 60;

/// Fallback content type for unknown extensions
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A single file read out of a bundle
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub data: Vec<u8>,
    pub content_type: &'static str,
    pub modified: DateTime<Utc>,
}

/// Outcome of an entry fetch
#[derive(Debug, Clone)]
pub enum EntryFetch {
    /// The caller's copy matches; valid until `expires`
    NotModified { expires: DateTime<Utc> },
    Content(ArchiveEntry),
}

impl BundleStore {
    /// Fetch one file out of a bundle, honouring a prior-known timestamp.
    pub async fn fetch_entry(
        &self,
        id: &BundleId,
        path: &str,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<EntryFetch, StoreError> {
        let path = resolve_entry_path(path);
        let content_type = guess_content_type(&path);

        let bundle_path = self.bundle_path(id);
        let (data, _) = self.read_record(id, &bundle_path).await?;

        let mut archive = zip::ZipArchive::new(Cursor::new(data))
            .map_err(|e| StoreError::Internal(format!("bundle {} is unreadable: {}", id, e)))?;

        let entry_not_found = || StoreError::NotFound(format!("{} in bundle {}", path, id));

        let mut file = match archive.by_name(&path) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Err(entry_not_found()),
            Err(e) => {
                return Err(StoreError::Internal(format!(
                    "bundle {} entry {}: {}",
                    id, path, e
                )))
            }
        };
        if file.is_dir() {
            return Err(entry_not_found());
        }

        let modified = file
            .last_modified()
            .and_then(zip_datetime_to_utc)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        if if_modified_since == Some(modified) {
            debug!(id = %id, path = %path, "Entry not modified");
            return Ok(EntryFetch::NotModified {
                expires: Utc::now() + Duration::seconds(NOT_MODIFIED_SECS),
            });
        }

        // header sizes are not trusted for allocation
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| StoreError::Internal(format!("bundle {} entry {}: {}", id, path, e)))?;

        debug!(id = %id, path = %path, size = data.len(), "Serving entry");

        Ok(EntryFetch::Content(ArchiveEntry {
            path,
            data,
            content_type,
            modified,
        }))
    }
}

/// Map a requested path to the archive entry name to look up.
pub fn resolve_entry_path(path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        format!("{}{}", path, INDEX_DOCUMENT)
    } else {
        path.to_string()
    }
}

/// Zip timestamps carry no zone and are treated as UTC.
fn zip_datetime_to_utc(dt: zip::DateTime) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)?
        .and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)
        .map(|naive| naive.and_utc())
}

/// Guess MIME type from file extension
pub fn guess_content_type(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let ext = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_CONTENT_TYPE,
    };
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "map" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "xml" => "application/xml",
        "txt" | "rst" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
