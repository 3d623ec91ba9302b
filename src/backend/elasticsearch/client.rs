use crate::error::{Result, SearchSyncError};
use crate::logging::render_json;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// One HTTP call against the cluster.
///
/// A request with several body parts is sent as newline-delimited JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticsearchRequest {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Vec<Value>,
    bulk: bool,
}

impl ElasticsearchRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ElasticsearchRequest {
            method,
            path: path.into(),
            params: Vec::new(),
            body: Vec::new(),
            bulk: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::Head, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn bulk(lines: Vec<Value>) -> Self {
        ElasticsearchRequest {
            body: lines,
            bulk: true,
            ..Self::post("/_bulk")
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = vec![body];
        self.bulk = false;
        self
    }

    pub fn is_bulk(&self) -> bool {
        self.bulk
    }

    /// Serialized body: one line per part for bulk requests.
    pub fn body_string(&self) -> Option<String> {
        if self.body.is_empty() {
            return None;
        }
        if self.bulk {
            let mut out = String::new();
            for line in &self.body {
                out.push_str(&line.to_string());
                out.push('\n');
            }
            Some(out)
        } else {
            Some(self.body[0].to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElasticsearchResponse {
    pub status: u16,
    pub body: Value,
}

impl ElasticsearchResponse {
    pub fn new(status: u16, body: Value) -> Self {
        ElasticsearchResponse { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into an error.
    pub fn into_result(self, request: &ElasticsearchRequest) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(SearchSyncError::Http {
            method: request.method.as_str().to_string(),
            path: request.path.clone(),
            status: self.status,
            body: self.body.to_string(),
        })
    }
}

/// Transport to an Elasticsearch cluster.
///
/// Implementations return every HTTP response, successful or not; only
/// transport failures are errors.
#[async_trait]
pub trait ElasticsearchClient: Send + Sync {
    async fn execute(&self, request: ElasticsearchRequest) -> Result<ElasticsearchResponse>;
}

/// `reqwest`-backed client with a pooled connection and request timeout.
pub struct HttpElasticsearchClient {
    base_url: String,
    http_client: reqwest::Client,
    pretty_json: bool,
}

impl HttpElasticsearchClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, pretty_json: bool) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchSyncError::Config(format!("Invalid HTTP client settings: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            pretty_json,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ElasticsearchClient for HttpElasticsearchClient {
    async fn execute(&self, request: ElasticsearchRequest) -> Result<ElasticsearchResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.http_client.request(method, &url).query(&request.params);
        if let Some(body) = request.body_string() {
            let content_type = if request.is_bulk() {
                "application/x-ndjson"
            } else {
                "application/json"
            };
            if tracing::enabled!(tracing::Level::DEBUG) {
                let rendered: Vec<String> = request
                    .body
                    .iter()
                    .map(|part| render_json(part, self.pretty_json))
                    .collect();
                tracing::debug!(
                    "{} {} request body:\n{}",
                    request.method.as_str(),
                    request.path,
                    rendered.join("\n")
                );
            }
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body);
        }

        let response = builder.send().await.map_err(|e| {
            SearchSyncError::Transport(format!(
                "{} {} failed: {}",
                request.method.as_str(),
                url,
                e
            ))
        })?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        tracing::debug!(
            "{} {} -> {}: {}",
            request.method.as_str(),
            request.path,
            status,
            render_json(&body, self.pretty_json)
        );

        Ok(ElasticsearchResponse { status, body })
    }
}
