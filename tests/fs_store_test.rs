mod common;

use chrono::{TimeZone, Utc};
use common::{create_test_dir, item_dir, read_item, write_item};
use pagestamp_daemon::reconcile::{ItemErrorKind, ReconciliationRun, RunFailure};
use pagestamp_daemon::store::{
    CommitError, ConnectionError, ContentQuery, ContentStore, FsContentStore, MutationError,
    ServiceIdentity,
};
use pagestamp_daemon::utils::{property, ContentPath, ITEM_FILE};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(120);

fn root() -> ContentPath {
    ContentPath::parse("/content").unwrap()
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn run_for(store_root: &std::path::Path) -> ReconciliationRun {
    ReconciliationRun::new(
        Arc::new(FsContentStore::new(store_root)),
        ServiceIdentity::default(),
    )
}

#[tokio::test]
async fn test_run_stamps_published_pages_on_disk() {
    let temp_dir = create_test_dir();
    let store_root = temp_dir.path();

    write_item(store_root, "/content", json!({"title": "Root", "lastReplicated": "2024-01-01T00:00:00Z"})).await;
    write_item(store_root, "/content/site", json!({"title": "Site", "lastReplicated": "2024-01-01T00:00:00Z"})).await;
    write_item(store_root, "/content/site/en", json!({"title": "English", "lastReplicated": "2024-01-01T00:00:00Z"})).await;
    write_item(store_root, "/content/site/draft", json!({"title": "Draft"})).await;

    let outcome = run_for(store_root).execute(&root(), WINDOW, now()).await;

    assert_eq!(outcome.scanned_count, 2);
    assert_eq!(outcome.processed_paths, vec!["/content/site", "/content/site/en"]);
    assert!(outcome.committed);

    let en = read_item(store_root, "/content/site/en").await;
    let stamped = chrono::DateTime::parse_from_rfc3339(en["processedAt"].as_str().unwrap()).unwrap();
    assert_eq!(stamped.with_timezone(&Utc), now());
    assert_eq!(en["title"], "English");

    let draft = read_item(store_root, "/content/site/draft").await;
    assert!(draft.get("processedAt").is_none());
    let content_root = read_item(store_root, "/content").await;
    assert!(content_root.get("processedAt").is_none());

    // no temp files left behind
    assert!(!item_dir(store_root, "/content/site/en")
        .join(format!("{}.tmp", ITEM_FILE))
        .exists());
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let temp_dir = create_test_dir();
    let store_root = temp_dir.path();
    write_item(store_root, "/content/page", json!({"lastReplicated": "2024-01-01T00:00:00Z"})).await;

    let run = run_for(store_root);
    assert!(run.execute(&root(), WINDOW, now()).await.committed);

    let second = run
        .execute(&root(), WINDOW, now() + chrono::Duration::seconds(5))
        .await;
    assert_eq!(second.scanned_count, 1);
    assert_eq!(second.processed_count, 0);
    assert!(!second.committed);
}

#[tokio::test]
async fn test_read_only_item_is_isolated() {
    let temp_dir = create_test_dir();
    let store_root = temp_dir.path();
    write_item(store_root, "/content/a", json!({"lastReplicated": "2024-01-01T00:00:00Z"})).await;
    write_item(store_root, "/content/b", json!({"lastReplicated": "2024-01-01T00:00:00Z"})).await;
    write_item(store_root, "/content/c", json!({"lastReplicated": "2024-01-01T00:00:00Z"})).await;

    let locked = item_dir(store_root, "/content/b").join(ITEM_FILE);
    let mut perms = std::fs::metadata(&locked).unwrap().permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(&locked, perms).unwrap();

    let outcome = run_for(store_root).execute(&root(), WINDOW, now()).await;

    assert_eq!(outcome.scanned_count, 3);
    assert_eq!(outcome.processed_count, 2);
    assert_eq!(outcome.failed_paths(), vec!["/content/b"]);
    assert_eq!(outcome.failures[0].kind, ItemErrorKind::Mutation);
    assert!(outcome.committed);

    assert!(read_item(store_root, "/content/a").await.get("processedAt").is_some());
    assert!(read_item(store_root, "/content/b").await.get("processedAt").is_none());
    assert!(read_item(store_root, "/content/c").await.get("processedAt").is_some());
}

#[tokio::test]
async fn test_missing_store_root_is_a_connection_failure() {
    let temp_dir = create_test_dir();
    let missing = temp_dir.path().join("does-not-exist");

    let outcome = run_for(&missing).execute(&root(), WINDOW, now()).await;

    assert_eq!(outcome.scanned_count, 0);
    assert!(!outcome.committed);
    assert!(matches!(outcome.failure, Some(RunFailure::Connection(_))));
}

#[tokio::test]
async fn test_corrupt_item_is_skipped_by_query() {
    let temp_dir = create_test_dir();
    let store_root = temp_dir.path();
    write_item(store_root, "/content/good", json!({"lastReplicated": "2024-01-01T00:00:00Z"})).await;
    let bad_dir = item_dir(store_root, "/content/bad");
    tokio::fs::create_dir_all(&bad_dir).await.unwrap();
    tokio::fs::write(bad_dir.join(ITEM_FILE), "{ not json").await.unwrap();

    let outcome = run_for(store_root).execute(&root(), WINDOW, now()).await;

    assert_eq!(outcome.scanned_count, 1);
    assert_eq!(outcome.processed_paths, vec!["/content/good"]);
    assert!(outcome.committed);
}

#[tokio::test]
async fn test_missing_search_root_yields_no_candidates() {
    let temp_dir = create_test_dir();
    let outcome = run_for(temp_dir.path())
        .execute(&ContentPath::parse("/nowhere").unwrap(), WINDOW, now())
        .await;

    assert_eq!(outcome.scanned_count, 0);
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_session_reads_its_own_staged_writes() {
    let temp_dir = create_test_dir();
    let store_root = temp_dir.path();
    write_item(store_root, "/content/page", json!({"title": "Old"})).await;

    let store = FsContentStore::new(store_root);
    let mut session = store.connect(&ServiceIdentity::default()).await.unwrap();
    session.begin().await.unwrap();
    session
        .set_property("/content/page", property::TITLE, "New".into())
        .await
        .unwrap();

    let seen = session.get_item("/content/page").await.unwrap().unwrap();
    assert_eq!(seen.string_property(property::TITLE), Some("New".to_string()));
    assert_eq!(read_item(store_root, "/content/page").await["title"], "Old");

    session.release().await;
    assert_eq!(read_item(store_root, "/content/page").await["title"], "Old");
}

#[tokio::test]
async fn test_set_property_on_missing_item() {
    let temp_dir = create_test_dir();
    let store = FsContentStore::new(temp_dir.path());
    let mut session = store.connect(&ServiceIdentity::default()).await.unwrap();
    session.begin().await.unwrap();

    let result = session
        .set_property("/content/ghost", property::TITLE, "x".into())
        .await;
    assert!(matches!(result, Err(MutationError::ItemNotFound(_))));
    session.release().await;
}

#[tokio::test]
async fn test_connect_rejects_empty_service_user() {
    let temp_dir = create_test_dir();
    let store = FsContentStore::new(temp_dir.path());
    let result = store.connect(&ServiceIdentity::new(" ")).await;
    assert!(matches!(result, Err(ConnectionError::Unauthorized(_))));
}

#[tokio::test]
async fn test_query_and_children_after_release_fail() {
    let temp_dir = create_test_dir();
    let store = FsContentStore::new(temp_dir.path());
    let mut session = store.connect(&ServiceIdentity::default()).await.unwrap();
    session.begin().await.unwrap();
    session.release().await;

    assert!(session
        .query(&ContentQuery::descendants_of(root()))
        .await
        .is_err());
    assert!(session.list_children("/content").await.is_err());
    assert!(session.begin().await.is_err());
}

/// Every `.content.json.tmp` left anywhere under `root`
fn leftover_temps(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".json.tmp"))
        .map(|e| e.into_path())
        .collect()
}

#[tokio::test]
async fn test_commit_leaves_other_properties_untouched() {
    let temp_dir = create_test_dir();
    let store_root = temp_dir.path();
    write_item(
        store_root,
        "/content/page",
        json!({
            "lastReplicated": "2024-01-01T00:00:00+01:00",
            "title": "2024-03-01T10:00:00+02:00",
            "count": 18446744073709551615u64
        }),
    )
    .await;
    write_item(
        store_root,
        "/content/fresh",
        json!({
            "lastReplicated": "2024-01-01T00:00:00Z",
            "processedAt": "2024-06-01T11:59:30+00:00",
            "title": "2024-03-01T10:00:00+02:00"
        }),
    )
    .await;
    let fresh_file = item_dir(store_root, "/content/fresh").join(ITEM_FILE);
    let fresh_before = tokio::fs::read(&fresh_file).await.unwrap();

    let outcome = run_for(store_root).execute(&root(), WINDOW, now()).await;

    assert!(outcome.committed);
    assert_eq!(outcome.processed_paths, vec!["/content/page"]);

    let page = read_item(store_root, "/content/page").await;
    assert_eq!(page["title"], "2024-03-01T10:00:00+02:00");
    assert_eq!(page["lastReplicated"], "2024-01-01T00:00:00+01:00");
    assert_eq!(page["count"], json!(18446744073709551615u64));
    assert_eq!(page["processedAt"], "2024-06-01T12:00:00Z");

    // skipped items are not rewritten at all
    assert_eq!(tokio::fs::read(&fresh_file).await.unwrap(), fresh_before);
}

#[tokio::test]
async fn test_items_with_any_json_values_are_stamped() {
    let temp_dir = create_test_dir();
    let store_root = temp_dir.path();
    write_item(
        store_root,
        "/content/rated",
        json!({"lastReplicated": "2024-01-01T00:00:00Z", "rating": 4.5}),
    )
    .await;
    write_item(
        store_root,
        "/content/tagged",
        json!({
            "lastReplicated": "2024-01-01T00:00:00Z",
            "tags": ["x", "y"],
            "meta": {"owner": null}
        }),
    )
    .await;
    write_item(
        store_root,
        "/content/unpublished",
        json!({"lastReplicated": null, "rating": 1.25}),
    )
    .await;

    let outcome = run_for(store_root).execute(&root(), WINDOW, now()).await;

    assert_eq!(outcome.scanned_count, 2);
    assert_eq!(outcome.processed_paths, vec!["/content/rated", "/content/tagged"]);
    assert!(outcome.committed);

    let rated = read_item(store_root, "/content/rated").await;
    assert_eq!(rated["rating"], json!(4.5));
    assert!(rated.get("processedAt").is_some());

    let tagged = read_item(store_root, "/content/tagged").await;
    assert_eq!(tagged["tags"], json!(["x", "y"]));
    assert_eq!(tagged["meta"], json!({"owner": null}));

    let unpublished = read_item(store_root, "/content/unpublished").await;
    assert!(unpublished.get("processedAt").is_none());
}

#[tokio::test]
async fn test_failed_commit_applies_nothing() {
    let temp_dir = create_test_dir();
    let store_root = temp_dir.path();
    for name in ["a", "b", "c"] {
        write_item(
            store_root,
            &format!("/content/{}", name),
            json!({"lastReplicated": "2024-01-01T00:00:00Z"}),
        )
        .await;
    }
    let file_of = |name: &str| item_dir(store_root, &format!("/content/{}", name)).join(ITEM_FILE);
    let a_before = tokio::fs::read(file_of("a")).await.unwrap();
    let c_before = tokio::fs::read(file_of("c")).await.unwrap();

    let store = FsContentStore::new(store_root);
    let mut session = store.connect(&ServiceIdentity::default()).await.unwrap();
    session.begin().await.unwrap();
    for name in ["a", "b", "c"] {
        session
            .set_property(&format!("/content/{}", name), property::PROCESSED_AT, now().into())
            .await
            .unwrap();
    }

    // b breaks between staging and commit, after a's temp file is written
    tokio::fs::write(file_of("b"), "{ not json").await.unwrap();

    let result = session.commit().await;
    session.release().await;

    assert!(matches!(result, Err(CommitError::JsonError(_))));
    assert_eq!(tokio::fs::read(file_of("a")).await.unwrap(), a_before);
    assert_eq!(tokio::fs::read(file_of("c")).await.unwrap(), c_before);
    assert_eq!(tokio::fs::read_to_string(file_of("b")).await.unwrap(), "{ not json");
    assert!(leftover_temps(store_root).is_empty());
}

#[tokio::test]
async fn test_item_removed_before_commit_applies_nothing() {
    let temp_dir = create_test_dir();
    let store_root = temp_dir.path();
    write_item(store_root, "/content/a", json!({"title": "A"})).await;
    write_item(store_root, "/content/b", json!({"title": "B"})).await;

    let store = FsContentStore::new(store_root);
    let mut session = store.connect(&ServiceIdentity::default()).await.unwrap();
    session.begin().await.unwrap();
    session
        .set_property("/content/a", property::PROCESSED_AT, now().into())
        .await
        .unwrap();
    session
        .set_property("/content/b", property::PROCESSED_AT, now().into())
        .await
        .unwrap();

    tokio::fs::remove_file(item_dir(store_root, "/content/b").join(ITEM_FILE))
        .await
        .unwrap();

    let result = session.commit().await;
    session.release().await;

    assert!(matches!(result, Err(CommitError::ItemVanished(_))));
    assert!(read_item(store_root, "/content/a").await.get("processedAt").is_none());
    assert!(leftover_temps(store_root).is_empty());
}
