mod common;

use common::{books_schema, BookMapper};
use searchsync::worker::{ChangesetIndexWorker, IndexWorker, IndexingContext};
use searchsync::{Backend, BackendConfig, DocumentReference, SessionContext};
use serial_test::serial;
use std::env;
use tempfile::TempDir;

const VARS: &[&str] = &[
    "SEARCHSYNC_BACKEND",
    "SEARCHSYNC_TANTIVY_DIRECTORY",
    "SEARCHSYNC_TANTIVY_ROOT",
    "SEARCHSYNC_TANTIVY_WRITER_HEAP_BYTES",
    "SEARCHSYNC_TANTIVY_COMMIT_POLICY",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[tokio::test]
#[serial]
async fn test_backend_from_env_writes_to_disk() {
    let tmp = TempDir::new().unwrap();
    clear_env();
    env::set_var("SEARCHSYNC_BACKEND", "tantivy");
    env::set_var("SEARCHSYNC_TANTIVY_DIRECTORY", "filesystem");
    env::set_var("SEARCHSYNC_TANTIVY_ROOT", tmp.path());
    env::set_var("SEARCHSYNC_TANTIVY_WRITER_HEAP_BYTES", "20000000");
    env::set_var("SEARCHSYNC_TANTIVY_COMMIT_POLICY", "per_operation");
    let config = BackendConfig::from_env();
    clear_env();

    let backend = Backend::start(&config.unwrap()).await.unwrap();
    let tantivy = backend.as_tantivy().unwrap();
    let (builder, fields) = books_schema();
    let manager = tantivy.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);

    let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
    worker
        .add(DocumentReference::new("1"), &mapper.title_only("on disk"))
        .unwrap();
    worker.execute().await.unwrap();
    backend.close().await;

    assert!(tmp.path().join("books").join("meta.json").exists());
}

#[tokio::test]
#[serial]
async fn test_saved_config_round_trips_into_backend() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("searchsync.json");
    let mut config = BackendConfig::default();
    config.tantivy.writer_heap_bytes = 15_000_000;
    config.tantivy.max_concurrent_writers = 2;
    config.save(&path).unwrap();

    let loaded = BackendConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    let backend = Backend::start(&loaded).await.unwrap();
    assert_eq!(
        backend.as_tantivy().unwrap().budget().max_concurrent_writers(),
        2
    );
}
