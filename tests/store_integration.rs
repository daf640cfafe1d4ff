//! Integration tests for the bundle store
//!
//! Exercise upload, listing and retrieval end to end against a temporary
//! store directory.

use chrono::Duration;
use docserver::archive::NOT_MODIFIED_SECS;
use docserver::{normalize, BundleId, BundleStore, EntryFetch, StoreError, UploadRequest};
use std::io::{Cursor, Write};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Helper to build an in-memory zip with the given files
fn make_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::from_date_and_time(2021, 3, 4, 5, 6, 8).unwrap());
    for (name, data) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Helper to open a store over a fresh temporary directory
async fn create_store() -> (BundleStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = BundleStore::open(temp_dir.path()).await.unwrap();
    (store, temp_dir)
}

#[tokio::test]
async fn test_upload_then_download_round_trip() {
    let (store, temp) = create_store().await;

    let data = make_zip(&[("index.html", b"<h1>Foo</h1>"), ("guide.html", b"guide")]);
    let id = store
        .commit(&UploadRequest::new(data.clone()).with_filename("foo.zip"))
        .await
        .unwrap();
    assert_eq!(id.as_str(), "foo");
    assert!(temp.path().join("fo/foo.zip").is_file());

    let archive = store.fetch_archive(&id).await.unwrap();
    assert_eq!(archive.data, data);
}

#[tokio::test]
async fn test_normalized_name_addresses_bundle() {
    let (store, temp) = create_store().await;

    assert_eq!(normalize("Django REST Framework"), "django-rest-framework");

    let data = make_zip(&[("index.html", b"drf")]);
    let id = store
        .commit(&UploadRequest::new(data).with_name("Django REST Framework"))
        .await
        .unwrap();

    assert_eq!(id.as_str(), "django-rest-framework");
    assert_eq!(
        store.bundle_path(&id),
        temp.path().join("dj").join("django-rest-framework.zip")
    );

    match store.fetch_entry(&id, "", None).await.unwrap() {
        EntryFetch::Content(entry) => assert_eq!(entry.data, b"drf"),
        EntryFetch::NotModified { .. } => panic!("expected content"),
    }
}

#[tokio::test]
async fn test_corrupt_upload_keeps_previous_record() {
    let (store, _temp) = create_store().await;

    let original = make_zip(&[("index.html", b"<p>original contents</p>")]);
    let id = store
        .commit(&UploadRequest::new(original.clone()).with_name("stable"))
        .await
        .unwrap();

    // Valid structure, broken CRC
    let payload: &[u8] = b"<p>replacement contents</p>";
    let mut corrupt = make_zip(&[("index.html", payload)]);
    let pos = corrupt
        .windows(payload.len())
        .position(|w| w == payload)
        .unwrap();
    corrupt[pos + 3] ^= 0x20;

    let result = store
        .commit(&UploadRequest::new(corrupt).with_name("stable"))
        .await;
    assert!(matches!(result, Err(StoreError::Validation(_))));

    assert_eq!(store.fetch_archive(&id).await.unwrap().data, original);
}

#[tokio::test]
async fn test_catalog_order_and_sizes() {
    let (store, _temp) = create_store().await;

    let ab = make_zip(&[("index.html", b"ab")]);
    let aa = make_zip(&[("index.html", b"aa"), ("extra.txt", b"more bytes")]);

    store
        .commit(&UploadRequest::new(ab.clone()).with_name("ab"))
        .await
        .unwrap();
    store
        .commit(&UploadRequest::new(aa.clone()).with_name("aa"))
        .await
        .unwrap();

    let catalog = store.catalog().await.unwrap();
    let ids: Vec<String> = catalog.iter().map(|e| e.id.to_string()).collect();
    assert_eq!(ids, vec!["aa", "ab"]);
    assert_eq!(catalog[0].size, aa.len() as u64);
    assert_eq!(catalog[1].size, ab.len() as u64);
}

#[tokio::test]
async fn test_conditional_fetch_policy() {
    let (store, _temp) = create_store().await;

    let data = make_zip(&[("index.html", b"cached")]);
    let id = store
        .commit(&UploadRequest::new(data).with_name("cachey"))
        .await
        .unwrap();

    let stamp = match store.fetch_entry(&id, "index.html", None).await.unwrap() {
        EntryFetch::Content(entry) => entry.modified,
        EntryFetch::NotModified { .. } => panic!("expected content"),
    };

    let before = chrono::Utc::now();
    match store.fetch_entry(&id, "index.html", Some(stamp)).await.unwrap() {
        EntryFetch::NotModified { expires } => {
            let window = Duration::seconds(NOT_MODIFIED_SECS);
            assert!(expires >= before + window);
            assert!(expires <= chrono::Utc::now() + window);
        }
        EntryFetch::Content(_) => panic!("expected not modified"),
    }

    let other = stamp + Duration::minutes(10);
    assert!(matches!(
        store.fetch_entry(&id, "index.html", Some(other)).await.unwrap(),
        EntryFetch::Content(_)
    ));
}

#[tokio::test]
async fn test_concurrent_uploads_same_identifier() {
    let (store, _temp) = create_store().await;
    let store = Arc::new(store);

    let versions: Vec<Vec<u8>> = (0..8)
        .map(|i| make_zip(&[("index.html", format!("version {}", i).as_bytes())]))
        .collect();

    let mut handles = Vec::new();
    for data in versions.clone() {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .commit(&UploadRequest::new(data).with_name("racy"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Last rename wins; whatever is on disk is one complete upload
    let id = BundleId::parse("racy").unwrap();
    let on_disk = store.fetch_archive(&id).await.unwrap().data;
    assert!(versions.contains(&on_disk));

    assert_eq!(store.catalog().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_store_root_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = BundleStore::open(temp_dir.path().join("absent")).await;
    assert!(matches!(result, Err(StoreError::Config(_))));
}
