//! CouchDB connection abstraction.
//! The registry only talks to the store through these traits, so the HTTP
//! client and the in-memory test store are interchangeable.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::{CouchError, Error};

/// A JSON object as stored in CouchDB
pub type Document = Map<String, Value>;

/// One CouchDB server endpoint.
#[async_trait]
pub trait CouchConnection: Send + Sync {
    /// Connection name from the configuration
    fn name(&self) -> &str;

    /// Server URL, credentials included when configured
    fn url(&self) -> &str;

    /// Fetch database metadata (`GET /<db>`); fails when the database is missing
    async fn database_info(&self, database: &str) -> Result<Value, CouchError>;

    /// Create a database (`PUT /<db>`)
    async fn create_database(&self, database: &str) -> Result<(), CouchError>;

    /// Handle for a database on this server. Performs no I/O.
    fn database(&self, database: &str) -> Arc<dyn CouchDatabase>;
}

/// One database reachable through a [`CouchConnection`].
#[async_trait]
pub trait CouchDatabase: Send + Sync {
    fn connection_name(&self) -> &str;

    fn name(&self) -> &str;

    /// Fetch a document by id
    async fn get(&self, id: &str) -> Result<Document, CouchError>;

    /// Create or overwrite a document by id, returning the new revision.
    /// Overwrites must carry the current `_rev`.
    async fn insert(&self, id: &str, doc: &Document) -> Result<String, CouchError>;
}

/// Builds connections from their (credential-embedded) URL.
pub trait Connector: Send + Sync {
    fn connect(&self, name: &str, url: &Url) -> Arc<dyn CouchConnection>;
}

/// Parse the connection URL and embed `username:password` unless the URL
/// already carries credentials or either value is missing or empty.
pub fn connection_url(name: &str, config: &ConnectionConfig) -> Result<Url, Error> {
    let build_error = |reason: String| Error::ConnectionBuild {
        connection: name.to_string(),
        url: config.url.clone(),
        reason,
    };

    let mut url = Url::parse(&config.url).map_err(|e| build_error(e.to_string()))?;

    let (Some(username), Some(password)) = (non_empty(&config.username), non_empty(&config.password))
    else {
        return Ok(url);
    };

    let has_auth = !url.username().is_empty() || url.password().is_some();
    if !has_auth {
        url.set_username(username)
            .map_err(|()| build_error("URL cannot carry credentials".to_string()))?;
        url.set_password(Some(password))
            .map_err(|()| build_error("URL cannot carry credentials".to_string()))?;
    }

    Ok(url)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Registry holding all configured connections
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<String, Arc<dyn CouchConnection>>,
}

impl ConnectionRegistry {
    pub fn register(&mut self, conn: Arc<dyn CouchConnection>) {
        let name = conn.name().to_string();
        self.connections.insert(name, conn);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CouchConnection>> {
        self.connections.get(name).cloned()
    }

    pub fn all(&self) -> BTreeMap<String, Arc<dyn CouchConnection>> {
        self.connections.clone()
    }
}
