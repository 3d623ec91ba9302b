mod common;

use common::{books_schema, tantivy_config, with_tenancy, Book, BookMapper};
use searchsync::backend::TantivyBackend;
use searchsync::config::{CommitPolicy, LifecycleStrategy};
use searchsync::model::IndexSchemaBuilder;
use searchsync::worker::{ChangesetIndexWorker, IndexWorker, IndexingContext, StreamIndexWorker};
use searchsync::{DocumentReference, SearchSyncError, SessionContext};
use tantivy::query::{AllQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use std::sync::Arc;
use tantivy::Term;
use tempfile::TempDir;
use tokio::sync::Barrier;

fn all() -> Box<dyn tantivy::query::Query> {
    Box::new(AllQuery)
}

#[tokio::test]
async fn test_changeset_commits_once_after_all_works() {
    let backend = TantivyBackend::new(&tantivy_config(None)).unwrap();
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);

    let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
    worker
        .add(DocumentReference::new("1"), &mapper.title_only("first"))
        .unwrap();
    worker
        .update(DocumentReference::new("1"), &mapper.title_only("second"))
        .unwrap();
    worker.delete(DocumentReference::new("2")).unwrap();
    worker.execute().await.unwrap();

    let stats = manager.stats();
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.works, 3);
    assert_eq!(stats.commits, 1);

    let result = manager
        .search(&SessionContext::new(), all(), None, None)
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.hits[0].id, "1");
    assert_eq!(result.hits[0].source["title"], "second");
    backend.close().await;
}

#[tokio::test]
async fn test_tenant_delete_only_touches_its_tenant() {
    let backend = TantivyBackend::new(&with_tenancy(tantivy_config(None))).unwrap();
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);

    for tenant in ["t1", "t2"] {
        let mut worker = manager
            .create_changeset_worker(&SessionContext::for_tenant(tenant))
            .unwrap();
        worker
            .add(DocumentReference::new("2"), &mapper.title_only("shared id"))
            .unwrap();
        worker.execute().await.unwrap();
    }

    let mut worker = manager
        .create_changeset_worker(&SessionContext::for_tenant("t1"))
        .unwrap();
    worker.delete(DocumentReference::new("2")).unwrap();
    worker.execute().await.unwrap();

    let t1 = manager
        .search(&SessionContext::for_tenant("t1"), all(), None, None)
        .unwrap();
    let t2 = manager
        .search(&SessionContext::for_tenant("t2"), all(), None, None)
        .unwrap();
    assert_eq!(t1.total, 0);
    assert_eq!(t2.total, 1);
    assert_eq!(t2.hits[0].id, "2");
    assert!(t2.hits[0].source.get("__tenant_id").is_none());
    backend.close().await;
}

#[tokio::test]
async fn test_per_operation_policy_commits_every_call() {
    let mut config = tantivy_config(None);
    config.tantivy.commit_policy = CommitPolicy::PerOperation;
    let backend = TantivyBackend::new(&config).unwrap();
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);

    let mut worker = manager.create_stream_worker(&SessionContext::new()).unwrap();
    for id in ["1", "2", "3"] {
        worker
            .add(DocumentReference::new(id), &mapper.title_only("x"))
            .unwrap()
            .await
            .unwrap();
    }
    assert_eq!(manager.stats().commits, 3);
    backend.close().await;
}

#[tokio::test]
async fn test_deferred_stream_commits_at_threshold() {
    let mut config = tantivy_config(None);
    config.tantivy.commit_threshold = 4;
    let backend = TantivyBackend::new(&config).unwrap();
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);

    let mut worker = manager.create_stream_worker(&SessionContext::new()).unwrap();
    let mut futures = Vec::new();
    for id in ["1", "2", "3", "4"] {
        futures.push(
            worker
                .add(DocumentReference::new(id), &mapper.title_only("x"))
                .unwrap(),
        );
    }
    for future in futures {
        future.await.unwrap();
    }
    assert_eq!(manager.stats().commits, 1);

    worker.optimize().await.unwrap();
    let result = manager
        .search(&SessionContext::new(), all(), None, Some(0))
        .unwrap();
    assert_eq!(result.total, 4);
    assert!(result.hits.is_empty());
    backend.close().await;
}

#[tokio::test]
async fn test_null_sentinel_is_indexed() {
    let backend = TantivyBackend::new(&tantivy_config(None)).unwrap();
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);

    let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
    worker
        .add(
            DocumentReference::new("1"),
            &mapper.book(Book {
                title: Some("No pages"),
                pages: None,
                authors: Some(vec!["Anon"]),
            }),
        )
        .unwrap();
    worker
        .add(
            DocumentReference::new("2"),
            &mapper.book(Book {
                pages: Some(100),
                ..Book::titled("Some pages")
            }),
        )
        .unwrap();
    worker.execute().await.unwrap();

    let pages = manager.model().field("pages").unwrap();
    let query = TermQuery::new(Term::from_field_i64(pages, -1), IndexRecordOption::Basic);
    let result = manager
        .search(&SessionContext::new(), Box::new(query), None, None)
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.hits[0].id, "1");
    assert_eq!(result.hits[0].source["authors.name"], "Anon");
    backend.close().await;
}

#[tokio::test]
async fn test_filesystem_index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    {
        let backend = TantivyBackend::new(&tantivy_config(Some(tmp.path()))).unwrap();
        let (builder, fields) = books_schema();
        let manager = backend.create_index_manager(builder).await.unwrap();
        let mapper = BookMapper::new(manager.schema(), &fields);
        let mut worker = manager.create_stream_worker(&SessionContext::new()).unwrap();
        let pending = worker
            .add(DocumentReference::new("1"), &mapper.title_only("persisted"))
            .unwrap();
        // Deferred: committed by close.
        backend.close().await;
        pending.await.unwrap();
    }

    let mut config = tantivy_config(Some(tmp.path()));
    config.lifecycle = LifecycleStrategy::None;
    let backend = TantivyBackend::new(&config).unwrap();
    let (builder, _) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let query = manager
        .query_parser(&["title"])
        .unwrap()
        .parse_query("persisted")
        .unwrap();
    let result = manager.search(&SessionContext::new(), query, None, None).unwrap();
    assert_eq!(result.total, 1);
    backend.close().await;
}

#[tokio::test]
async fn test_writer_budget_limits_open_indexes() {
    let mut config = tantivy_config(None);
    config.tantivy.max_concurrent_writers = 1;
    let backend = TantivyBackend::new(&config).unwrap();

    let (builder, _) = books_schema();
    backend.create_index_manager(builder).await.unwrap();

    let mut other = IndexSchemaBuilder::new("films");
    let root = other.root();
    other.field::<String>(&root, "title");
    assert!(matches!(
        backend.create_index_manager(other).await,
        Err(SearchSyncError::TooManyConcurrentWriters { max: 1, .. })
    ));

    backend.close().await;
    assert_eq!(backend.budget().active_writers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_yields_one_manager() {
    let backend = Arc::new(TantivyBackend::new(&tantivy_config(None)).unwrap());
    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let backend = Arc::clone(&backend);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            let (builder, _) = books_schema();
            barrier.wait().await;
            backend.create_index_manager(builder).await
        }));
    }

    let mut created = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(manager) => created.push(manager),
            Err(e) => assert!(e.is_configuration(), "unexpected error: {}", e),
        }
    }
    assert_eq!(created.len(), 1);
    assert_eq!(backend.budget().active_writers(), 1);
    assert!(Arc::ptr_eq(
        &backend.index_manager("books").unwrap(),
        &created[0]
    ));

    backend.close().await;
    drop(created);
    assert_eq!(backend.budget().active_writers(), 0);
}

#[tokio::test]
async fn test_failed_creation_releases_the_name() {
    let backend = TantivyBackend::new(&tantivy_config(None)).unwrap();
    let mut broken = IndexSchemaBuilder::new("books");
    let root = broken.root();
    broken.field::<String>(&root, "title").analyzer("klingon");
    assert!(backend.create_index_manager(broken).await.is_err());

    let (builder, _) = books_schema();
    backend.create_index_manager(builder).await.unwrap();
    backend.close().await;
}

#[tokio::test]
async fn test_closed_manager_rejects_works() {
    let backend = TantivyBackend::new(&tantivy_config(None)).unwrap();
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);
    backend.close().await;

    let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
    worker
        .add(DocumentReference::new("1"), &mapper.title_only("late"))
        .unwrap();
    assert!(matches!(
        worker.execute().await,
        Err(SearchSyncError::OrchestratorClosed(_))
    ));
}
