use super::*;
use crate::StorageConfig;
use crate::database::{Database, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    fn at(timestamp: i64) -> Arc<Self> {
        Arc::new(Self(Mutex::new(Utc.timestamp_opt(timestamp, 0).unwrap())))
    }

    fn set(&self, timestamp: i64) {
        *self.0.lock().unwrap() = Utc.timestamp_opt(timestamp, 0).unwrap();
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Treats the uploaded bytes themselves as the embedded timestamp.
struct ContentExtractor;

impl MetadataExtractor for ContentExtractor {
    fn capture_datetime(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }
}

struct NoMetadata;

impl MetadataExtractor for NoMetadata {
    fn capture_datetime(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// Index whose inserts always fail. With `block_cleanup`, the written file is
/// swapped for a directory first so the compensating delete fails too.
struct FailingInsertStore {
    inner: Database,
    block_cleanup: bool,
}

#[async_trait]
impl PhotoStore for FailingInsertStore {
    async fn owner_key(&self, username: &str) -> Result<Option<i64>, StoreError> {
        self.inner.owner_key(username).await
    }

    async fn insert_photo(&self, photo: NewPhoto) -> Result<i64, StoreError> {
        if self.block_cleanup {
            std::fs::remove_file(&photo.path)?;
            std::fs::create_dir(&photo.path)?;
            std::fs::write(photo.path.join("keep"), b"x")?;
        }
        Err(StoreError::CorruptRow("injected insert failure".to_string()))
    }

    async fn take_photo(&self, id: i64, owner: i64) -> Result<Option<Photo>, StoreError> {
        self.inner.take_photo(id, owner).await
    }

    async fn list_photos(&self, owner: Option<i64>) -> Result<Vec<Photo>, StoreError> {
        self.inner.list_photos(owner).await
    }
}

struct Harness {
    _temp_dir: TempDir,
    root: PathBuf,
    db: Database,
    clock: Arc<FixedClock>,
    manager: PhotoManager,
}

fn storage_config(root: &Path) -> StorageConfig {
    StorageConfig {
        root_directory: root.to_path_buf(),
        media_prefix: "/media".to_string(),
        default_extension: "jpg".to_string(),
        max_upload_bytes: 1024 * 1024,
        public_listing: false,
    }
}

async fn harness_with(
    extractor: Arc<dyn MetadataExtractor>,
    wrap: impl FnOnce(Database) -> Arc<dyn PhotoStore>,
) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    std::fs::create_dir_all(&root).unwrap();

    let db = Database::open_in_memory().await.unwrap();
    db.add_user("alice", "alice@example.com").await.unwrap();
    db.add_user("bob", "bob@example.com").await.unwrap();

    let clock = FixedClock::at(1_700_000_000);
    let manager = PhotoManager::new(
        &storage_config(&root),
        wrap(db.clone()),
        extractor,
        clock.clone(),
    );

    Harness {
        _temp_dir: temp_dir,
        root,
        db,
        clock,
        manager,
    }
}

fn plain(db: Database) -> Arc<dyn PhotoStore> {
    Arc::new(db)
}

async fn harness() -> Harness {
    harness_with(Arc::new(NoMetadata), plain).await
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_upload_stores_file_and_row() {
    let h = harness().await;

    let outcome = h
        .manager
        .upload("alice", "vacation.png", &b"png bytes"[..])
        .await
        .unwrap();
    assert_eq!(outcome.unique_name, "1700000000_vacation.png");

    let stored = h.root.join("alice").join("1700000000_vacation.png");
    assert_eq!(std::fs::read(&stored).unwrap(), b"png bytes");

    let rows = h.db.list_photos(None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, outcome.id);
    assert_eq!(rows[0].name, "vacation");
    assert_eq!(rows[0].ext, "png");
    assert_eq!(rows[0].path, stored);
}

#[tokio::test]
async fn test_upload_without_metadata_uses_upload_instant() {
    let h = harness().await;

    let outcome = h
        .manager
        .upload("alice", "vacation.png", &b"no exif here"[..])
        .await
        .unwrap();

    // 1700000000 is 2023-11-14 22:13:20 UTC
    assert_eq!(outcome.date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
    assert_eq!(outcome.time, NaiveTime::from_hms_opt(22, 13, 20).unwrap());

    let rows = h.db.list_photos(None).await.unwrap();
    assert_eq!(rows[0].date, outcome.date);
    assert_eq!(rows[0].time, outcome.time);
}

#[tokio::test]
async fn test_upload_uses_embedded_capture_time() {
    let h = harness_with(Arc::new(ContentExtractor), plain).await;

    let outcome = h
        .manager
        .upload("alice", "old.jpg", &b"2005:07:30 07:22:46"[..])
        .await
        .unwrap();

    assert_eq!(outcome.date, NaiveDate::from_ymd_opt(2005, 7, 30).unwrap());
    assert_eq!(outcome.time, NaiveTime::from_hms_opt(7, 22, 46).unwrap());
}

#[tokio::test]
async fn test_unparseable_capture_time_falls_back() {
    let h = harness_with(Arc::new(ContentExtractor), plain).await;

    let outcome = h
        .manager
        .upload("alice", "odd.jpg", &b"sometime in spring"[..])
        .await
        .unwrap();

    assert_eq!(outcome.date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
    assert_eq!(outcome.time, NaiveTime::from_hms_opt(22, 13, 20).unwrap());
}

#[tokio::test]
async fn test_date_only_capture_time_falls_back() {
    let h = harness_with(Arc::new(ContentExtractor), plain).await;

    let outcome = h
        .manager
        .upload("alice", "scan.jpg", &b"2024:01:02"[..])
        .await
        .unwrap();

    assert_eq!(outcome.date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
    assert_eq!(outcome.time, NaiveTime::from_hms_opt(22, 13, 20).unwrap());

    let rows = h.db.list_photos(None).await.unwrap();
    assert_eq!(rows[0].date, outcome.date);
    assert_eq!(rows[0].time, outcome.time);
}

#[tokio::test]
async fn test_failed_insert_removes_written_file() {
    let h = harness_with(Arc::new(NoMetadata), |db| -> Arc<dyn PhotoStore> {
        Arc::new(FailingInsertStore {
            inner: db,
            block_cleanup: false,
        })
    })
    .await;

    let result = h
        .manager
        .upload("alice", "vacation.png", &b"png bytes"[..])
        .await;

    assert!(matches!(result, Err(PhotoError::Persistence(_))));
    assert!(files_in(&h.root.join("alice")).is_empty());
    assert!(h.db.list_photos(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_compensation_reports_orphan() {
    let h = harness_with(Arc::new(NoMetadata), |db| -> Arc<dyn PhotoStore> {
        Arc::new(FailingInsertStore {
            inner: db,
            block_cleanup: true,
        })
    })
    .await;

    let result = h
        .manager
        .upload("alice", "vacation.png", &b"png bytes"[..])
        .await;

    match result {
        Err(PhotoError::Consistency { orphan, .. }) => {
            assert_eq!(orphan, h.root.join("alice").join("1700000000_vacation.png"));
        }
        other => panic!("expected consistency error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_same_second_same_name_does_not_overwrite() {
    let h = harness().await;

    let first = h
        .manager
        .upload("alice", "vacation.png", &b"first"[..])
        .await
        .unwrap();
    let second = h
        .manager
        .upload("alice", "vacation.png", &b"second"[..])
        .await
        .unwrap();

    assert_eq!(first.unique_name, "1700000000_vacation.png");
    assert_eq!(second.unique_name, "1700000000_vacation_1.png");

    let dir = h.root.join("alice");
    assert_eq!(std::fs::read(dir.join(&first.unique_name)).unwrap(), b"first");
    assert_eq!(std::fs::read(dir.join(&second.unique_name)).unwrap(), b"second");
}

#[tokio::test]
async fn test_same_second_different_names_never_collide() {
    let h = harness().await;

    let a = h.manager.upload("alice", "a.png", &b"a"[..]).await.unwrap();
    let b = h.manager.upload("alice", "b.png", &b"b"[..]).await.unwrap();
    assert_ne!(a.unique_name, b.unique_name);

    h.clock.set(1_700_000_001);
    let c = h.manager.upload("alice", "a.png", &b"c"[..]).await.unwrap();
    assert_eq!(c.unique_name, "1700000001_a.png");
}

#[tokio::test]
async fn test_upload_for_unknown_user_writes_nothing() {
    let h = harness().await;

    let result = h.manager.upload("mallory", "x.png", &b"x"[..]).await;
    assert!(matches!(result, Err(PhotoError::Unauthorized(_))));
    assert!(!h.root.join("mallory").exists());
}

#[tokio::test]
async fn test_upload_rejects_empty_file_name() {
    let h = harness().await;

    let result = h.manager.upload("alice", "", &b"x"[..]).await;
    assert!(matches!(result, Err(PhotoError::Validation(_))));
    assert!(h.db.list_photos(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_traversal_in_file_name_stays_in_user_directory() {
    let h = harness().await;

    let outcome = h
        .manager
        .upload("alice", "../../bob/evil.png", &b"x"[..])
        .await
        .unwrap();

    assert_eq!(outcome.unique_name, "1700000000_evil.png");
    assert!(h.root.join("alice").join("1700000000_evil.png").exists());
    assert!(!h.root.join("bob").exists());
}

#[tokio::test]
async fn test_delete_removes_row_and_file() {
    let h = harness().await;
    let outcome = h
        .manager
        .upload("alice", "vacation.png", &b"png"[..])
        .await
        .unwrap();
    let stored = h.root.join("alice").join(&outcome.unique_name);

    let deleted = h.manager.delete("alice", outcome.id).await.unwrap();
    assert_eq!(deleted.path, stored);
    assert!(!stored.exists());
    assert!(h.db.list_photos(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_of_other_users_photo_is_not_found() {
    let h = harness().await;
    let outcome = h
        .manager
        .upload("alice", "vacation.png", &b"png"[..])
        .await
        .unwrap();
    let stored = h.root.join("alice").join(&outcome.unique_name);

    let result = h.manager.delete("bob", outcome.id).await;
    assert!(matches!(result, Err(PhotoError::NotFound)));
    assert!(stored.exists());
    assert_eq!(h.db.list_photos(None).await.unwrap().len(), 1);

    let result = h.manager.delete("alice", outcome.id + 100).await;
    assert!(matches!(result, Err(PhotoError::NotFound)));
}

#[tokio::test]
async fn test_delete_with_unremovable_file_leaves_orphan() {
    let h = harness().await;
    let outcome = h
        .manager
        .upload("alice", "vacation.png", &b"png"[..])
        .await
        .unwrap();
    let stored = h.root.join("alice").join(&outcome.unique_name);

    // A non-empty directory in place of the file cannot be unlinked
    std::fs::remove_file(&stored).unwrap();
    std::fs::create_dir(&stored).unwrap();
    std::fs::write(stored.join("keep"), b"x").unwrap();

    let result = h.manager.delete("alice", outcome.id).await;
    assert!(matches!(result, Err(PhotoError::Storage { .. })));
    assert!(stored.exists());
    assert!(h.db.list_photos(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_with_missing_file_succeeds() {
    let h = harness().await;
    let outcome = h
        .manager
        .upload("alice", "vacation.png", &b"png"[..])
        .await
        .unwrap();
    std::fs::remove_file(h.root.join("alice").join(&outcome.unique_name)).unwrap();

    assert!(h.manager.delete("alice", outcome.id).await.is_ok());
    assert!(h.db.list_photos(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_listing_is_owner_scoped() {
    let h = harness().await;
    h.manager.upload("alice", "a.png", &b"a"[..]).await.unwrap();
    h.manager.upload("bob", "b.png", &b"b"[..]).await.unwrap();
    h.manager.upload("bob", "c.png", &b"c"[..]).await.unwrap();

    let alice = h.manager.list(Some("alice")).await.unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].name, "a");
    assert_eq!(alice[0].path, "/media/alice/1700000000_a.png");

    let bob = h.manager.list(Some("bob")).await.unwrap();
    assert_eq!(bob.len(), 2);
    assert!(bob.iter().all(|p| p.path.starts_with("/media/bob/")));

    let everyone = h.manager.list(None).await.unwrap();
    assert_eq!(everyone.len(), 3);
}

#[tokio::test]
async fn test_listing_newest_first() {
    let h = harness_with(Arc::new(ContentExtractor), plain).await;
    let stamps = [
        "2021:05:01 10:00:00",
        "2023:01:01 09:00:00",
        "2021:05:01 18:30:00",
        "2019:12:31 23:59:59",
    ];
    for (i, stamp) in stamps.iter().enumerate() {
        h.manager
            .upload("alice", &format!("p{}.jpg", i), stamp.as_bytes())
            .await
            .unwrap();
    }

    let listed = h.manager.list(Some("alice")).await.unwrap();
    let order: Vec<(&str, &str)> = listed
        .iter()
        .map(|p| (p.date.as_str(), p.time.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("2023-01-01", "09:00:00"),
            ("2021-05-01", "18:30:00"),
            ("2021-05-01", "10:00:00"),
            ("2019-12-31", "23:59:59"),
        ]
    );
}

#[tokio::test]
async fn test_listing_fails_on_path_outside_root() {
    let h = harness().await;
    let owner = h.db.owner_key("alice").await.unwrap().unwrap();
    h.db.insert_photo(NewPhoto {
        user_id: owner,
        date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        time: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        path: PathBuf::from("/elsewhere/alice/x.png"),
        name: "x".to_string(),
        ext: "png".to_string(),
    })
    .await
    .unwrap();

    let result = h.manager.list(Some("alice")).await;
    assert!(matches!(result, Err(PhotoError::CorruptRecord { .. })));
}

#[tokio::test]
async fn test_take_photo_requires_matching_owner() {
    let h = harness().await;
    let alice = h.db.owner_key("alice").await.unwrap().unwrap();
    let bob = h.db.owner_key("bob").await.unwrap().unwrap();
    let id = h
        .db
        .insert_photo(NewPhoto {
            user_id: alice,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            path: h.root.join("alice").join("x.png"),
            name: "x".to_string(),
            ext: "png".to_string(),
        })
        .await
        .unwrap();

    assert!(h.db.take_photo(id, bob).await.unwrap().is_none());
    let taken = h.db.take_photo(id, alice).await.unwrap().unwrap();
    assert_eq!(taken.id, id);
    assert!(h.db.take_photo(id, alice).await.unwrap().is_none());
}

#[test]
fn test_delete_request_parsing() {
    let request: DeleteRequest =
        serde_json::from_str(r#"{"id": "7", "name": "vacation.png"}"#).unwrap();
    assert_eq!(request.photo_id(), Some(7));
    assert!(request.has_id() && request.has_name());

    let request: DeleteRequest = serde_json::from_str(r#"{"id": 7, "name": ""}"#).unwrap();
    assert_eq!(request.photo_id(), Some(7));
    assert!(!request.has_name());

    let request: DeleteRequest = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
    assert!(!request.has_id());

    let request: DeleteRequest = serde_json::from_str(r#"{"id": "seven", "name": "x"}"#).unwrap();
    assert!(request.has_id());
    assert_eq!(request.photo_id(), None);
}
