//! Integration coverage for the Workspace abstraction wired the way the
//! Strategy Orchestrator uses it: a scratch workspace and a separate result
//! store, addressed through the same `Collection`/`File` shapes, with the
//! asymmetric cleanup policy (DESIGN.md open question decision #4) exercised
//! across both.

use std::time::Duration;

use transcode_worker::workspace::{open_workspace, Collection};

fn file_uri(dir: &std::path::Path) -> String {
    format!("file://{}", dir.display())
}

fn open(uri: &str) -> std::sync::Arc<dyn transcode_worker::workspace::Workspace> {
    open_workspace(uri, Duration::from_secs(1), Duration::from_secs(1)).unwrap()
}

#[tokio::test]
async fn sentinel_round_trips_through_a_job_shaped_collection_tree() {
    let temp_dir = tempfile::tempdir().unwrap();
    let temp = open(&file_uri(temp_dir.path()));

    let basename = "b1a2c3d4";
    let sources = Collection::root().collection(basename).collection("sources");
    let results = Collection::root().collection(basename).collection("results");
    temp.ensure_collection(&sources).await.unwrap();
    temp.ensure_collection(&results).await.unwrap();

    let sentinel = sources.file("source.json");
    assert!(!temp.exists(sentinel.resource()).await.unwrap());

    temp.write(&sentinel, br#"{"uri":"file:///x.mkv"}"#).await.unwrap();
    assert!(temp.exists(sentinel.resource()).await.unwrap());

    let bytes = temp.read(&sentinel).await.unwrap();
    assert_eq!(bytes, br#"{"uri":"file:///x.mkv"}"#);
}

#[tokio::test]
async fn success_cleanup_drops_temp_tree_but_leaves_store_tree_intact() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let temp = open(&file_uri(temp_dir.path()));
    let store = open(&file_uri(store_dir.path()));

    let basename = "job-42";
    let job_root = Collection::root().collection(basename);
    temp.ensure_collection(&job_root).await.unwrap();
    store.ensure_collection(&job_root).await.unwrap();
    store
        .write(&job_root.file("index.m3u8"), b"#EXTM3U\n")
        .await
        .unwrap();

    // Mirrors Orchestrator::cleanup_on_success: only the temp tree goes.
    temp.delete_collection(&job_root).await.unwrap();

    assert!(!temp_dir.path().join(basename).exists());
    assert!(store_dir.path().join(basename).join("index.m3u8").exists());
}

#[tokio::test]
async fn error_cleanup_drops_store_tree_but_leaves_temp_tree_for_forensic_resume() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let temp = open(&file_uri(temp_dir.path()));
    let store = open(&file_uri(store_dir.path()));

    let basename = "job-err";
    let job_root = Collection::root().collection(basename);
    temp.ensure_collection(&job_root).await.unwrap();
    store.ensure_collection(&job_root).await.unwrap();
    temp.write(&job_root.collection("sources").file("source.json"), b"{}")
        .await
        .unwrap();

    // Mirrors Orchestrator::cleanup_on_error: only the store tree goes.
    store.delete_collection(&job_root).await.unwrap();

    assert!(!store_dir.path().join(basename).exists());
    assert!(temp_dir
        .path()
        .join(basename)
        .join("sources")
        .join("source.json")
        .exists());
}
