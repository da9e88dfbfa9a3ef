use sgncache::db::DB;
use tempfile::TempDir;

/// Crée une DB temporaire pour les tests
fn create_test_db() -> (TempDir, DB) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = DB::init(&db_path).unwrap();
    (temp_dir, db)
}

#[test]
fn test_db_init() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    assert!(DB::init(&db_path).is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_upsert_and_get() {
    let (_temp_dir, db) = create_test_db();

    db.upsert("pk1", "https://x.io/a.mp4", Some("video/mp4"), "mp4", 42)
        .unwrap();

    let entry = db.get("pk1").unwrap().unwrap();
    assert_eq!(entry.source_url, "https://x.io/a.mp4");
    assert_eq!(entry.content_type.as_deref(), Some("video/mp4"));
    assert_eq!(entry.file_ext, "mp4");
    assert_eq!(entry.size, 42);
    assert_eq!(entry.hits, 0);
    assert!(entry.last_used.is_some());

    assert!(db.get("missing").unwrap().is_none());
}

#[test]
fn test_upsert_keeps_hits() {
    let (_temp_dir, db) = create_test_db();

    db.upsert("pk1", "https://x.io/a", None, "bin", 1).unwrap();
    db.update_hit("pk1").unwrap();
    db.update_hit("pk1").unwrap();
    db.upsert("pk1", "https://x.io/a", Some("image/png"), "png", 2)
        .unwrap();

    let entry = db.get("pk1").unwrap().unwrap();
    assert_eq!(entry.hits, 2);
    assert_eq!(entry.file_ext, "png");
}

#[test]
fn test_list_delete_count_purge() {
    let (_temp_dir, db) = create_test_db();

    for pk in ["b", "a", "c"] {
        db.upsert(pk, "ref", None, "bin", 1).unwrap();
    }
    assert_eq!(db.list_keys().unwrap(), vec!["a", "b", "c"]);
    assert_eq!(db.count().unwrap(), 3);

    assert!(db.delete("b").unwrap());
    assert!(!db.delete("b").unwrap());
    assert_eq!(db.count().unwrap(), 2);

    db.purge().unwrap();
    assert_eq!(db.count().unwrap(), 0);
}
