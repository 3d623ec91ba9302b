//! Elasticsearch works and the dialect-specific factories producing them.

use super::client::{ElasticsearchClient, ElasticsearchRequest, ElasticsearchResponse};
use crate::error::{Result, SearchSyncError};
use crate::types::WorkKind;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum WorkPayload {
    /// One action line plus, for index actions, the document line.
    Bulk { action: Value, source: Option<Value> },
    /// A standalone request executed at its position in the batch.
    Request(ElasticsearchRequest),
}

/// Immutable, self-contained unit of work against one index.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticsearchWork {
    kind: WorkKind,
    index: String,
    id: Option<String>,
    routing: Option<String>,
    payload: WorkPayload,
}

impl ElasticsearchWork {
    pub fn kind(&self) -> WorkKind {
        self.kind
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Elasticsearch `_id`, tenant prefix included.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn routing(&self) -> Option<&str> {
        self.routing.as_deref()
    }

    pub fn document(&self) -> Option<&Value> {
        match &self.payload {
            WorkPayload::Bulk { source, .. } => source.as_ref(),
            WorkPayload::Request(_) => None,
        }
    }

    pub fn payload(&self) -> &WorkPayload {
        &self.payload
    }

    pub fn is_bulkable(&self) -> bool {
        matches!(self.payload, WorkPayload::Bulk { .. })
    }

    pub(crate) fn push_bulk_lines(&self, lines: &mut Vec<Value>) {
        if let WorkPayload::Bulk { action, source } = &self.payload {
            lines.push(action.clone());
            if let Some(source) = source {
                lines.push(source.clone());
            }
        }
    }

    /// Whether a bulk item status is acceptable for this work.
    pub(crate) fn accepts_item_status(&self, status: u16) -> bool {
        (200..300).contains(&status) || (self.kind == WorkKind::Delete && status == 404)
    }

    /// Execute a standalone work. Bulkable works go through the orchestrator.
    pub async fn execute(&self, client: &dyn ElasticsearchClient) -> Result<ElasticsearchResponse> {
        let WorkPayload::Request(request) = &self.payload else {
            return Err(SearchSyncError::IllegalState(format!(
                "{} work on '{}' must be sent in a bulk request",
                self.kind, self.index
            )));
        };
        let response = client.execute(request.clone()).await?;
        if self.kind == WorkKind::DropIndexIfExists && response.status == 404 {
            return Ok(response);
        }
        response.into_result(request)
    }
}

/// How a dialect reports the total hit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalHitsFormat {
    /// `hits.total` is a number.
    Numeric,
    /// `hits.total` is `{"value": .., "relation": ..}`.
    Object,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchWork {
    request: ElasticsearchRequest,
    total_hits: TotalHitsFormat,
}

/// Raw hits of a search, before identifiers are mapped back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<Value>,
}

impl SearchWork {
    pub fn request(&self) -> &ElasticsearchRequest {
        &self.request
    }

    pub async fn execute(&self, client: &dyn ElasticsearchClient) -> Result<SearchResponse> {
        let response = client
            .execute(self.request.clone())
            .await?
            .into_result(&self.request)?;
        let hits_root = &response.body["hits"];
        let total = match self.total_hits {
            TotalHitsFormat::Numeric => hits_root["total"].as_u64(),
            TotalHitsFormat::Object => hits_root["total"]["value"].as_u64(),
        }
        .unwrap_or(0);
        let hits = hits_root["hits"].as_array().cloned().unwrap_or_default();
        Ok(SearchResponse { total, hits })
    }
}

/// Builds works for one protocol dialect.
///
/// Implementors only describe how their dialect differs; the provided
/// methods assemble the works.
pub trait ElasticsearchWorkFactory: Send + Sync {
    fn dialect_name(&self) -> &'static str;

    /// Mapping type to put in action lines, if the dialect has one.
    fn document_type(&self) -> Option<&'static str>;

    /// Wrap a typeless root mapping as the dialect expects it.
    fn wrap_mapping(&self, mapping: Value) -> Value;

    fn total_hits_format(&self) -> TotalHitsFormat;

    fn create_index(&self, index: &str, mapping: Value) -> ElasticsearchWork {
        let body = json!({"mappings": self.wrap_mapping(mapping)});
        standalone(
            WorkKind::CreateIndex,
            index,
            ElasticsearchRequest::put(format!("/{}", index)).json(body),
        )
    }

    fn drop_index_if_exists(&self, index: &str) -> ElasticsearchWork {
        standalone(
            WorkKind::DropIndexIfExists,
            index,
            ElasticsearchRequest::delete(format!("/{}", index)),
        )
    }

    fn index_exists(&self, index: &str) -> ElasticsearchRequest {
        ElasticsearchRequest::head(format!("/{}", index))
    }

    fn add(&self, index: &str, id: &str, routing: Option<&str>, document: Value) -> ElasticsearchWork {
        self.bulkable(WorkKind::Add, "index", index, id, routing, Some(document))
    }

    /// Full replacement, same action as `add`.
    fn update(
        &self,
        index: &str,
        id: &str,
        routing: Option<&str>,
        document: Value,
    ) -> ElasticsearchWork {
        self.bulkable(WorkKind::Update, "index", index, id, routing, Some(document))
    }

    fn delete(&self, index: &str, id: &str, routing: Option<&str>) -> ElasticsearchWork {
        self.bulkable(WorkKind::Delete, "delete", index, id, routing, None)
    }

    fn flush(&self, index: &str) -> ElasticsearchWork {
        standalone(
            WorkKind::Flush,
            index,
            ElasticsearchRequest::post(format!("/{}/_flush", index)),
        )
    }

    fn refresh(&self, index: &str) -> ElasticsearchWork {
        standalone(
            WorkKind::Refresh,
            index,
            ElasticsearchRequest::post(format!("/{}/_refresh", index)),
        )
    }

    fn optimize(&self, index: &str) -> ElasticsearchWork {
        standalone(
            WorkKind::Optimize,
            index,
            ElasticsearchRequest::post(format!("/{}/_forcemerge", index))
                .param("max_num_segments", "1"),
        )
    }

    fn search(
        &self,
        indexes: &[&str],
        query: Value,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> SearchWork {
        let mut body = Map::new();
        body.insert("query".into(), query);
        if let Some(offset) = offset {
            body.insert("from".into(), json!(offset));
        }
        if let Some(limit) = limit {
            body.insert("size".into(), json!(limit));
        }
        if self.total_hits_format() == TotalHitsFormat::Object {
            body.insert("track_total_hits".into(), json!(true));
        }
        SearchWork {
            request: ElasticsearchRequest::post(format!("/{}/_search", indexes.join(",")))
                .json(Value::Object(body)),
            total_hits: self.total_hits_format(),
        }
    }

    #[doc(hidden)]
    fn bulkable(
        &self,
        kind: WorkKind,
        action: &str,
        index: &str,
        id: &str,
        routing: Option<&str>,
        source: Option<Value>,
    ) -> ElasticsearchWork {
        let mut meta = Map::new();
        meta.insert("_index".into(), json!(index));
        if let Some(doc_type) = self.document_type() {
            meta.insert("_type".into(), json!(doc_type));
        }
        meta.insert("_id".into(), json!(id));
        if let Some(routing) = routing {
            meta.insert("routing".into(), json!(routing));
        }
        let mut line = Map::new();
        line.insert(action.to_string(), Value::Object(meta));

        ElasticsearchWork {
            kind,
            index: index.to_string(),
            id: Some(id.to_string()),
            routing: routing.map(str::to_string),
            payload: WorkPayload::Bulk {
                action: Value::Object(line),
                source,
            },
        }
    }
}

fn standalone(kind: WorkKind, index: &str, request: ElasticsearchRequest) -> ElasticsearchWork {
    ElasticsearchWork {
        kind,
        index: index.to_string(),
        id: None,
        routing: None,
        payload: WorkPayload::Request(request),
    }
}

/// Elasticsearch 7.x and 8.x: typeless APIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Elasticsearch7WorkFactory;

impl ElasticsearchWorkFactory for Elasticsearch7WorkFactory {
    fn dialect_name(&self) -> &'static str {
        "es7"
    }

    fn document_type(&self) -> Option<&'static str> {
        None
    }

    fn wrap_mapping(&self, mapping: Value) -> Value {
        mapping
    }

    fn total_hits_format(&self) -> TotalHitsFormat {
        TotalHitsFormat::Object
    }
}

/// Elasticsearch 6.2 to 6.x: a single `_doc` mapping type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Elasticsearch6WorkFactory;

impl ElasticsearchWorkFactory for Elasticsearch6WorkFactory {
    fn dialect_name(&self) -> &'static str {
        "es6"
    }

    fn document_type(&self) -> Option<&'static str> {
        Some("_doc")
    }

    fn wrap_mapping(&self, mapping: Value) -> Value {
        json!({"_doc": mapping})
    }

    fn total_hits_format(&self) -> TotalHitsFormat {
        TotalHitsFormat::Numeric
    }
}

/// Elasticsearch 5.x, 6.0 and 6.1: a single mapping type, which may not
/// start with an underscore.
#[derive(Debug, Clone, Copy, Default)]
pub struct Elasticsearch5WorkFactory;

impl ElasticsearchWorkFactory for Elasticsearch5WorkFactory {
    fn dialect_name(&self) -> &'static str {
        "es5"
    }

    fn document_type(&self) -> Option<&'static str> {
        Some("doc")
    }

    fn wrap_mapping(&self, mapping: Value) -> Value {
        json!({"doc": mapping})
    }

    fn total_hits_format(&self) -> TotalHitsFormat {
        TotalHitsFormat::Numeric
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::elasticsearch::stub::RecordingElasticsearchClient;

    #[test]
    fn test_action_lines_per_dialect() {
        let es7 = Elasticsearch7WorkFactory.add("books", "1", None, json!({"title": "foo"}));
        assert_eq!(es7.kind(), WorkKind::Add);
        assert_eq!(es7.document(), Some(&json!({"title": "foo"})));
        let mut lines = Vec::new();
        es7.push_bulk_lines(&mut lines);
        assert_eq!(
            lines,
            vec![
                json!({"index": {"_index": "books", "_id": "1"}}),
                json!({"title": "foo"})
            ]
        );

        let es6 = Elasticsearch6WorkFactory.delete("books", "t1_2", Some("shard-a"));
        let mut lines = Vec::new();
        es6.push_bulk_lines(&mut lines);
        assert_eq!(
            lines,
            vec![json!({"delete": {"_index": "books", "_type": "_doc", "_id": "t1_2", "routing": "shard-a"}})]
        );
    }

    #[test]
    fn test_mapping_wrapping() {
        let mapping = json!({"dynamic": "strict", "properties": {}});
        let es7 = Elasticsearch7WorkFactory.create_index("books", mapping.clone());
        let es6 = Elasticsearch6WorkFactory.create_index("books", mapping.clone());
        match (es7.payload(), es6.payload()) {
            (WorkPayload::Request(r7), WorkPayload::Request(r6)) => {
                assert_eq!(r7.path, "/books");
                assert_eq!(r7.body[0], json!({"mappings": mapping}));
                assert_eq!(r6.body[0]["mappings"]["_doc"]["dynamic"], "strict");
            }
            _ => panic!("index creation must be standalone"),
        }
        assert!(!es7.is_bulkable());
    }

    #[test]
    fn test_es5_type_name_has_no_underscore() {
        let mapping = json!({"dynamic": "strict", "properties": {}});
        match Elasticsearch5WorkFactory.create_index("books", mapping).payload() {
            WorkPayload::Request(request) => {
                assert_eq!(request.body[0]["mappings"]["doc"]["dynamic"], "strict");
                assert!(request.body[0]["mappings"].get("_doc").is_none());
            }
            _ => panic!("index creation must be standalone"),
        }

        let add = Elasticsearch5WorkFactory.add("books", "1", None, json!({"title": "foo"}));
        let mut lines = Vec::new();
        add.push_bulk_lines(&mut lines);
        assert_eq!(
            lines[0],
            json!({"index": {"_index": "books", "_type": "doc", "_id": "1"}})
        );
    }

    #[test]
    fn test_delete_tolerates_missing_document() {
        let delete = Elasticsearch7WorkFactory.delete("books", "2", None);
        assert!(delete.accepts_item_status(404));
        let add = Elasticsearch7WorkFactory.add("books", "2", None, json!({}));
        assert!(!add.accepts_item_status(404));
        assert!(add.accepts_item_status(201));
    }

    #[tokio::test]
    async fn test_drop_ignores_missing_index() {
        let client = RecordingElasticsearchClient::default();
        client.enqueue(Ok(ElasticsearchResponse::new(404, json!({"error": "index_not_found"}))));
        Elasticsearch7WorkFactory
            .drop_index_if_exists("books")
            .execute(&client)
            .await
            .unwrap();

        client.enqueue(Ok(ElasticsearchResponse::new(404, json!({}))));
        let err = Elasticsearch7WorkFactory
            .flush("books")
            .execute(&client)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchSyncError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_search_total_hits_per_dialect() {
        let client = RecordingElasticsearchClient::default();
        client.enqueue(Ok(ElasticsearchResponse::new(
            200,
            json!({"hits": {"total": {"value": 3, "relation": "eq"}, "hits": [{"_id": "1"}]}}),
        )));
        let work = Elasticsearch7WorkFactory.search(&["books"], json!({"match_all": {}}), Some(0), Some(1));
        assert_eq!(work.request().body[0]["track_total_hits"], true);
        assert_eq!(work.request().body[0]["query"], json!({"match_all": {}}));
        let response = work.execute(&client).await.unwrap();
        assert_eq!(response.total, 3);
        assert_eq!(response.hits.len(), 1);

        client.enqueue(Ok(ElasticsearchResponse::new(
            200,
            json!({"hits": {"total": 5, "hits": []}}),
        )));
        let work = Elasticsearch6WorkFactory.search(&["books", "authors"], json!({"match_all": {}}), None, None);
        assert_eq!(work.request().path, "/books,authors/_search");
        assert!(work.request().body[0].get("track_total_hits").is_none());
        assert_eq!(work.execute(&client).await.unwrap().total, 5);
    }
}
