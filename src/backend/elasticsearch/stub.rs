//! In-memory client that records requests and answers them with canned
//! responses. Each instance is owned by its test.

use super::client::{ElasticsearchClient, ElasticsearchRequest, ElasticsearchResponse, Method};
use crate::error::{Result, SearchSyncError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&ElasticsearchRequest) -> Option<Result<ElasticsearchResponse>> + Send + Sync>;

pub struct RecordingElasticsearchClient {
    version: String,
    requests: Mutex<Vec<ElasticsearchRequest>>,
    queued: Mutex<VecDeque<Result<ElasticsearchResponse>>>,
    responder: Option<Responder>,
}

impl Default for RecordingElasticsearchClient {
    fn default() -> Self {
        Self::new("7.10.2")
    }
}

impl RecordingElasticsearchClient {
    /// A client reporting `version` from `GET /`.
    pub fn new(version: impl Into<String>) -> Self {
        RecordingElasticsearchClient {
            version: version.into(),
            requests: Mutex::new(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            responder: None,
        }
    }

    /// Consulted before the built-in answers; `None` falls through.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ElasticsearchRequest) -> Option<Result<ElasticsearchResponse>> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Answer the next request (other than version detection) with `response`.
    pub fn enqueue(&self, response: Result<ElasticsearchResponse>) {
        self.lock_queue().push_back(response);
    }

    pub fn requests(&self) -> Vec<ElasticsearchRequest> {
        self.lock_requests().clone()
    }

    /// Remove and return recorded requests, excluding version detection.
    pub fn drain(&self) -> Vec<ElasticsearchRequest> {
        self.lock_requests()
            .drain(..)
            .filter(|r| !(r.method == Method::Get && r.path == "/"))
            .collect()
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<ElasticsearchRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<ElasticsearchResponse>>> {
        self.queued.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn default_response(&self, request: &ElasticsearchRequest) -> ElasticsearchResponse {
        if request.method == Method::Get && request.path == "/" {
            return ElasticsearchResponse::new(
                200,
                json!({"name": "stub", "version": {"number": self.version}}),
            );
        }
        if request.is_bulk() {
            return ElasticsearchResponse::new(200, bulk_success(&request.body));
        }
        match request.method {
            Method::Head => ElasticsearchResponse::new(404, Value::Null),
            Method::Post if request.path.ends_with("/_search") => ElasticsearchResponse::new(
                200,
                json!({"took": 1, "hits": {"total": {"value": 0, "relation": "eq"}, "hits": []}}),
            ),
            _ => ElasticsearchResponse::new(200, json!({"acknowledged": true})),
        }
    }
}

/// A bulk response acknowledging every action line of `lines`.
fn bulk_success(lines: &[Value]) -> Value {
    let mut items = Vec::new();
    let mut iter = lines.iter();
    while let Some(line) = iter.next() {
        let Some((action, meta)) = line.as_object().and_then(|o| o.iter().next()) else {
            continue;
        };
        let status = match action.as_str() {
            "index" | "create" => {
                iter.next();
                201
            }
            "update" => {
                iter.next();
                200
            }
            _ => 200,
        };
        let mut item = meta.clone();
        if let Some(obj) = item.as_object_mut() {
            obj.insert("status".into(), json!(status));
        }
        let mut wrapped = serde_json::Map::new();
        wrapped.insert(action.clone(), item);
        items.push(Value::Object(wrapped));
    }
    json!({"took": 1, "errors": false, "items": items})
}

#[async_trait]
impl ElasticsearchClient for RecordingElasticsearchClient {
    async fn execute(&self, request: ElasticsearchRequest) -> Result<ElasticsearchResponse> {
        tracing::debug!(
            "stub {} {} ({} body parts)",
            request.method.as_str(),
            request.path,
            request.body.len()
        );
        self.lock_requests().push(request.clone());

        let is_version_probe = request.method == Method::Get && request.path == "/";
        if !is_version_probe {
            if let Some(queued) = self.lock_queue().pop_front() {
                return queued;
            }
        }
        if let Some(responder) = &self.responder {
            if let Some(response) = responder(&request) {
                return response;
            }
        }
        Ok(self.default_response(&request))
    }
}

impl RecordingElasticsearchClient {
    /// A transport failure, for scripting error paths.
    pub fn connection_refused() -> Result<ElasticsearchResponse> {
        Err(SearchSyncError::Transport("connection refused".into()))
    }
}
