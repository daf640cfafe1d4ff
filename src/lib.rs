//! docserver - documentation bundle server
//!
//! Clients upload zipped documentation bundles by name; the server keeps one
//! zip per bundle on the local filesystem and serves individual files out of
//! the archives over HTTP, along with a listing of what is stored.
//!
//! ## Storage Layout
//!
//! ```text
//! <store_dir>/
//! ├── dj/
//! │   └── django-rest-framework.zip   # first 2 chars of the identifier as shard
//! └── re/
//!     └── requests.zip
//! ```
//!
//! ## Request Flow
//!
//! - **list**: [`BundleStore::catalog`]
//! - **upload**: [`UploadRequest`] → [`BundleStore::commit`]
//! - **fetch**: [`BundleStore::fetch_entry`] / [`BundleStore::fetch_archive`]
//!
//! The HTTP layer in [`http`] only parses requests and maps [`StoreError`]
//! variants to status codes.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod identifier;
pub mod store;
pub mod upload;

// Re-exports
pub use archive::{ArchiveEntry, EntryFetch};
pub use catalog::CatalogEntry;
pub use config::Config;
pub use error::StoreError;
pub use http::HttpServer;
pub use identifier::{normalize, BundleId};
pub use store::{BundleArchive, BundleStore};
pub use upload::UploadRequest;
