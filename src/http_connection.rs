//! CouchDB connection over the HTTP document API.

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

use crate::connection::{Connector, CouchConnection, CouchDatabase, Document};
use crate::error::CouchError;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const DESIGN_PREFIX: &str = "_design/";

/// Builds [`HttpConnection`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, name: &str, url: &Url) -> Arc<dyn CouchConnection> {
        Arc::new(HttpConnection::new(name, url.clone()))
    }
}

/// Shared between a connection and every database handle it hands out
struct Endpoint {
    name: String,
    base: Url,
    client: OnceCell<Client>,
}

impl Endpoint {
    /// Lazily initialize the HTTP client on first use
    async fn client(&self, method: &'static str, path: &str) -> Result<&Client, CouchError> {
        self.client
            .get_or_try_init(|| async {
                tracing::info!("Initializing HTTP client for connection '{}'", self.name);

                Client::builder()
                    .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                    .build()
            })
            .await
            .map_err(|source| CouchError::Transport {
                method,
                path: path.to_string(),
                source,
            })
    }

    /// `base/<segments...>`, each segment percent-encoded
    fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        verb: Verb,
        segments: &[&str],
        body: Option<&Document>,
    ) -> Result<Value, CouchError> {
        let method_name = verb.as_str();
        let path = format!("/{}", segments.join("/"));
        let client = self.client(method_name, &path).await?;

        tracing::debug!("{} {} via connection '{}'", method_name, path, self.name);

        let mut request = client
            .request(verb.method(), self.url_for(segments))
            .header("Accept", "application/json");
        if let Some(doc) = body {
            request = request.json(doc);
        }

        let response = request.send().await.map_err(|source| CouchError::Transport {
            method: method_name,
            path: path.clone(),
            source,
        })?;

        read_response(method_name, path, response).await
    }
}

/// The subset of HTTP verbs the document API needs
#[derive(Debug, Clone, Copy)]
enum Verb {
    Get,
    Put,
}

impl Verb {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }

    fn method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Put => Method::PUT,
        }
    }
}

async fn read_response(
    method: &'static str,
    path: String,
    response: Response,
) -> Result<Value, CouchError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|source| CouchError::Transport {
        method,
        path: path.clone(),
        source,
    })?;

    if !status.is_success() {
        return Err(CouchError::Status {
            method,
            path,
            status: status.as_u16(),
            reason: error_reason(&bytes),
        });
    }

    serde_json::from_slice(&bytes).map_err(|source| CouchError::Decode {
        method,
        path,
        source,
    })
}

/// CouchDB error bodies look like `{"error": "not_found", "reason": "missing"}`
fn error_reason(body: &[u8]) -> String {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    match (field("error"), field("reason")) {
        (Some(error), Some(reason)) => format!("{error} ({reason})"),
        (Some(text), None) | (None, Some(text)) => text,
        (None, None) => String::from_utf8_lossy(body).chars().take(200).collect(),
    }
}

/// `_design/name` stays a two-segment path; any other id is one segment
fn document_segments<'a>(database: &'a str, id: &'a str) -> Vec<&'a str> {
    match id.strip_prefix(DESIGN_PREFIX) {
        Some(design) => vec![database, "_design", design],
        None => vec![database, id],
    }
}

/// Direct CouchDB connection via URL.
pub struct HttpConnection {
    endpoint: Arc<Endpoint>,
    url: String,
}

impl HttpConnection {
    pub fn new(name: impl Into<String>, base: Url) -> Self {
        let url = base.to_string();
        Self {
            endpoint: Arc::new(Endpoint {
                name: name.into(),
                base,
                client: OnceCell::new(),
            }),
            url,
        }
    }
}

#[async_trait]
impl CouchConnection for HttpConnection {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn database_info(&self, database: &str) -> Result<Value, CouchError> {
        self.endpoint.send(Verb::Get, &[database], None).await
    }

    async fn create_database(&self, database: &str) -> Result<(), CouchError> {
        self.endpoint.send(Verb::Put, &[database], None).await?;
        Ok(())
    }

    fn database(&self, database: &str) -> Arc<dyn CouchDatabase> {
        Arc::new(HttpDatabase {
            endpoint: self.endpoint.clone(),
            name: database.to_string(),
        })
    }
}

pub struct HttpDatabase {
    endpoint: Arc<Endpoint>,
    name: String,
}

#[async_trait]
impl CouchDatabase for HttpDatabase {
    fn connection_name(&self) -> &str {
        &self.endpoint.name
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> Result<Document, CouchError> {
        let segments = document_segments(&self.name, id);
        match self.endpoint.send(Verb::Get, &segments, None).await? {
            Value::Object(doc) => Ok(doc),
            other => Err(CouchError::MalformedResponse {
                path: format!("/{}", segments.join("/")),
                message: format!("expected a JSON object, got {other}"),
            }),
        }
    }

    async fn insert(&self, id: &str, doc: &Document) -> Result<String, CouchError> {
        let segments = document_segments(&self.name, id);
        let response = self.endpoint.send(Verb::Put, &segments, Some(doc)).await?;

        response
            .get("rev")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CouchError::MalformedResponse {
                path: format!("/{}", segments.join("/")),
                message: "write response has no 'rev'".to_string(),
            })
    }
}
