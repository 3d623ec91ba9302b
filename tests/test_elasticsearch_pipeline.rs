mod common;

use common::{books_schema, Book, BookMapper};
use searchsync::backend::elasticsearch::{
    ElasticsearchBackend, ElasticsearchRequest, ElasticsearchResponse, Method,
    RecordingElasticsearchClient,
};
use searchsync::config::{BackendConfig, BackendKind, LifecycleStrategy, MultiTenancyConfig};
use searchsync::error::ErrorKind;
use searchsync::worker::{
    ChangesetIndexWorker, IndexWorker, IndexingContext, StreamIndexWorker, WorkerState,
};
use searchsync::{DocumentReference, MultiTenancyStrategy, SearchSyncError, SessionContext};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Barrier;

fn es_config(multi_tenancy: MultiTenancyConfig) -> BackendConfig {
    BackendConfig {
        backend: BackendKind::Elasticsearch,
        multi_tenancy,
        ..BackendConfig::default()
    }
}

async fn backend(
    client: &Arc<RecordingElasticsearchClient>,
    multi_tenancy: MultiTenancyConfig,
) -> ElasticsearchBackend {
    ElasticsearchBackend::with_client(client.clone(), &es_config(multi_tenancy))
        .await
        .unwrap()
}

fn bulk_requests(requests: &[ElasticsearchRequest]) -> Vec<&ElasticsearchRequest> {
    requests.iter().filter(|r| r.is_bulk()).collect()
}

// ============================================================
// SCENARIOS
// ============================================================

#[tokio::test]
async fn test_single_add_produces_one_bulk_pair() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = backend(&client, MultiTenancyConfig::None).await;
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);

    let lifecycle = client.drain();
    assert_eq!(lifecycle.len(), 2);
    assert_eq!(lifecycle[0].method, Method::Head);
    assert_eq!(lifecycle[1].method, Method::Put);
    assert_eq!(lifecycle[1].path, "/books");

    let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
    worker
        .add(DocumentReference::new("1"), &mapper.title_only("foo"))
        .unwrap();
    assert_eq!(worker.pending(), 1);
    worker.execute().await.unwrap();

    let requests = client.drain();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].body_string().unwrap(),
        "{\"index\":{\"_index\":\"books\",\"_id\":\"1\"}}\n{\"title\":\"foo\"}\n"
    );
    backend.close().await;
}

#[tokio::test]
async fn test_tenant_delete_uses_composite_id() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = backend(&client, MultiTenancyConfig::Discriminator).await;
    let (builder, _) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    client.drain();

    let mut worker = manager
        .create_changeset_worker(&SessionContext::for_tenant("t1"))
        .unwrap();
    worker.delete(DocumentReference::new("2")).unwrap();
    worker.execute().await.unwrap();

    let requests = client.drain();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].body,
        vec![json!({"delete": {"_index": "books", "_id": "t1_2"}})]
    );
    backend.close().await;
}

#[tokio::test]
async fn test_changeset_is_one_ordered_batch() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = backend(&client, MultiTenancyConfig::None).await;
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);
    client.drain();
    let before = manager.stats();

    let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
    worker
        .add(DocumentReference::new("1"), &mapper.title_only("first"))
        .unwrap();
    worker
        .update(DocumentReference::new("1"), &mapper.title_only("second"))
        .unwrap();
    worker.delete(DocumentReference::new("2")).unwrap();
    worker.execute().await.unwrap();

    let after = manager.stats();
    assert_eq!(after.batches, before.batches + 1);
    assert_eq!(after.works, before.works + 3);

    let requests = client.drain();
    assert_eq!(requests.len(), 1);
    let lines: Vec<String> = requests[0].body.iter().map(Value::to_string).collect();
    assert_eq!(
        lines,
        vec![
            r#"{"index":{"_index":"books","_id":"1"}}"#,
            r#"{"title":"first"}"#,
            r#"{"index":{"_index":"books","_id":"1"}}"#,
            r#"{"title":"second"}"#,
            r#"{"delete":{"_index":"books","_id":"2"}}"#,
        ]
    );
    backend.close().await;
}

// ============================================================
// PROPERTIES
// ============================================================

#[tokio::test]
async fn test_second_execute_submits_nothing() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = backend(&client, MultiTenancyConfig::None).await;
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);
    client.drain();

    let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
    worker
        .add(DocumentReference::new("1"), &mapper.title_only("foo"))
        .unwrap();
    worker.execute().await.unwrap();
    let batches = manager.stats().batches;

    worker.execute().await.unwrap();
    assert_eq!(manager.stats().batches, batches);
    assert_eq!(bulk_requests(&client.drain()).len(), 1);
    backend.close().await;
}

#[tokio::test]
async fn test_every_tenant_document_carries_discriminator() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = backend(&client, MultiTenancyConfig::Discriminator).await;
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);
    client.drain();

    let pairs = [("t1", "1"), ("t2", "1"), ("acme_corp", "with_underscore")];
    for (tenant, id) in pairs {
        let mut worker = manager
            .create_changeset_worker(&SessionContext::for_tenant(tenant))
            .unwrap();
        worker
            .add(DocumentReference::new(id), &mapper.title_only("foo"))
            .unwrap();
        worker.execute().await.unwrap();
    }

    let strategy = MultiTenancyStrategy::Discriminator;
    let requests = client.drain();
    assert_eq!(requests.len(), pairs.len());
    for ((tenant, id), request) in pairs.iter().zip(&requests) {
        let es_id = request.body[0]["index"]["_id"].as_str().unwrap();
        assert_eq!(strategy.from_elasticsearch_id(Some(*tenant), es_id), *id);
        assert_eq!(request.body[1]["__HSearch_TenantId"], *tenant);
        assert_eq!(request.body[1]["__HSearch_Id"], *id);
    }

    assert!(matches!(
        manager.create_changeset_worker(&SessionContext::new()),
        Err(SearchSyncError::MissingTenantId(_))
    ));
    backend.close().await;
}

#[tokio::test]
async fn test_null_and_missing_values() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = backend(&client, MultiTenancyConfig::None).await;
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);
    client.drain();

    let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
    worker
        .add(
            DocumentReference::new("1"),
            &mapper.book(Book {
                title: None,
                pages: None,
                authors: None,
            }),
        )
        .unwrap();
    worker
        .add(DocumentReference::new("2"), &mapper.title_only("untouched"))
        .unwrap();
    worker.execute().await.unwrap();

    let requests = client.drain();
    let explicit = &requests[0].body[1];
    let untouched = &requests[0].body[3];
    assert_eq!(explicit, &json!({"pages": -1, "authors": null}));
    assert!(explicit.get("title").is_none());
    assert_eq!(untouched, &json!({"title": "untouched"}));
    assert!(untouched.get("authors").is_none());
    backend.close().await;
}

#[tokio::test]
async fn test_identical_input_identical_bytes() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = backend(&client, MultiTenancyConfig::None).await;
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);
    client.drain();

    let book = Book {
        title: Some("Good Omens"),
        pages: Some(412),
        authors: Some(vec!["Terry", "Neil"]),
    };
    for _ in 0..2 {
        let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
        worker
            .add(DocumentReference::new("1"), &mapper.book(book.clone()))
            .unwrap();
        worker.execute().await.unwrap();
    }

    let requests = client.drain();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body_string(), requests[1].body_string());
    assert_eq!(
        requests[0].body[1].to_string(),
        r#"{"title":"Good Omens","pages":412,"authors":[{"name":"Terry"},{"name":"Neil"}]}"#
    );
    backend.close().await;
}

// ============================================================
// FAILURES AND STREAMING
// ============================================================

#[tokio::test]
async fn test_rejected_item_fails_changeset() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = backend(&client, MultiTenancyConfig::None).await;
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);
    client.drain();

    client.enqueue(Ok(ElasticsearchResponse::new(
        200,
        json!({
            "errors": true,
            "items": [
                {"index": {"_index": "books", "_id": "1", "status": 201}},
                {"index": {"_index": "books", "_id": "2", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "failed to parse"}}}
            ]
        }),
    )));

    let mut worker = manager.create_changeset_worker(&SessionContext::new()).unwrap();
    worker
        .add(DocumentReference::new("1"), &mapper.title_only("ok"))
        .unwrap();
    worker
        .add(DocumentReference::new("2"), &mapper.title_only("bad"))
        .unwrap();
    let err = worker.execute().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PartialBatch);
    match err {
        SearchSyncError::BulkItems { failures, .. } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].position, 1);
            assert_eq!(failures[0].status, 400);
            assert!(failures[0].reason.contains("mapper_parsing_exception"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(worker.state(), WorkerState::Failed);
    assert_eq!(manager.stats().failed_batches, 1);
    backend.close().await;
}

#[tokio::test]
async fn test_stream_worker_sends_each_call() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = backend(&client, MultiTenancyConfig::None).await;
    let (builder, fields) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    let mapper = BookMapper::new(manager.schema(), &fields);
    client.drain();

    let mut worker = manager.create_stream_worker(&SessionContext::new()).unwrap();
    worker
        .add(DocumentReference::new("1"), &mapper.title_only("a"))
        .unwrap()
        .await
        .unwrap();
    worker
        .delete(DocumentReference::new("1"))
        .unwrap()
        .await
        .unwrap();
    worker.flush().await.unwrap();
    worker.optimize().await.unwrap();
    manager.refresh().await.unwrap();

    let requests = client.drain();
    let optimize = &requests[3];
    assert_eq!(
        optimize.params,
        vec![("max_num_segments".to_string(), "1".to_string())]
    );
    let paths: Vec<String> = requests.into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec![
            "/_bulk",
            "/_bulk",
            "/books/_flush",
            "/books/_forcemerge",
            "/books/_refresh"
        ]
    );
    backend.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_creates_index_once() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let backend = Arc::new(backend(&client, MultiTenancyConfig::None).await);
    client.drain();

    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let backend = Arc::clone(&backend);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            let (builder, _) = books_schema();
            barrier.wait().await;
            backend.create_index_manager(builder).await.is_ok()
        }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 1);

    let methods: Vec<Method> = client.drain().into_iter().map(|r| r.method).collect();
    assert_eq!(methods, vec![Method::Head, Method::Put]);
    assert!(backend.index_manager("books").is_some());
    backend.close().await;
}

#[tokio::test]
async fn test_lifecycle_none_sends_nothing() {
    let client = Arc::new(RecordingElasticsearchClient::default());
    let mut config = es_config(MultiTenancyConfig::None);
    config.lifecycle = LifecycleStrategy::None;
    let backend = ElasticsearchBackend::with_client(client.clone(), &config)
        .await
        .unwrap();
    let (builder, _) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();

    assert!(client.drain().is_empty());
    assert_eq!(manager.stats().batches, 0);
    backend.close().await;
}

#[tokio::test]
async fn test_search_strips_tenant_prefix() {
    let client = Arc::new(
        RecordingElasticsearchClient::default().with_responder(|request| {
            if request.method == Method::Post && request.path == "/books/_search" {
                return Some(Ok(ElasticsearchResponse::new(
                    200,
                    json!({"hits": {"total": {"value": 1, "relation": "eq"}, "hits": [
                        {"_index": "books", "_id": "t1_9", "_score": 1.5,
                         "_source": {"title": "foo"}}
                    ]}}),
                )));
            }
            None
        }),
    );
    let backend = backend(&client, MultiTenancyConfig::Discriminator).await;
    let (builder, _) = books_schema();
    let manager = backend.create_index_manager(builder).await.unwrap();
    client.drain();

    let result = manager
        .search(
            &SessionContext::for_tenant("t1"),
            json!({"match": {"title": "foo"}}),
            None,
            Some(10),
        )
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.hits[0].id, "9");
    assert_eq!(result.hits[0].source["title"], "foo");

    let requests = client.drain();
    let body = &requests[0].body[0];
    assert_eq!(body["size"], 10);
    assert_eq!(body["track_total_hits"], true);
    assert!(body["query"].to_string().contains("__HSearch_TenantId"));
    backend.close().await;
}
