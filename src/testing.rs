//! In-memory CouchDB stand-in for tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::connection::{Connector, CouchConnection, CouchDatabase, Document};
use crate::error::CouchError;

/// A remote call, as seen by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DatabaseInfo { connection: String, database: String },
    CreateDatabase { connection: String, database: String },
    Get { connection: String, database: String, id: String },
    Insert { connection: String, database: String, id: String },
}

type DbKey = (String, String);

#[derive(Default)]
struct State {
    databases: HashMap<DbKey, HashMap<String, Document>>,
    failing_creates: HashSet<DbKey>,
    failing_writes: HashSet<DbKey>,
    urls: HashMap<String, String>,
    calls: Vec<Call>,
    next_rev: u64,
}

impl State {
    fn new_rev(&mut self) -> String {
        self.next_rev += 1;
        format!("{}-{:08x}", self.next_rev, self.next_rev * 2_654_435_761)
    }
}

fn key(connection: &str, database: &str) -> DbKey {
    (connection.to_string(), database.to_string())
}

/// Every connection name is its own server; databases are keyed by
/// (connection, database).
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(self, connection: &str, database: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .databases
            .entry(key(connection, database))
            .or_default();
        self
    }

    /// Make database creation fail for this database
    pub fn failing_create(self, connection: &str, database: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_creates
            .insert(key(connection, database));
        self
    }

    /// Make document writes fail for this database
    pub fn failing_writes(self, connection: &str, database: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_writes
            .insert(key(connection, database));
        self
    }

    /// Store a document directly, returning its revision
    pub fn put_document(&self, connection: &str, database: &str, id: &str, doc: Value) -> String {
        let mut state = self.state.lock().unwrap();
        let rev = state.new_rev();
        let mut doc = doc.as_object().cloned().unwrap_or_default();
        doc.insert("_id".to_string(), json!(id));
        doc.insert("_rev".to_string(), json!(rev));
        state
            .databases
            .entry(key(connection, database))
            .or_default()
            .insert(id.to_string(), doc);
        rev
    }

    pub fn document(&self, connection: &str, database: &str, id: &str) -> Option<Document> {
        let state = self.state.lock().unwrap();
        state
            .databases
            .get(&key(connection, database))
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn has_database(&self, connection: &str, database: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.databases.contains_key(&key(connection, database))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn url_of(&self, connection: &str) -> Option<String> {
        self.state.lock().unwrap().urls.get(connection).cloned()
    }

    pub fn connection(&self, name: &str) -> Arc<dyn CouchConnection> {
        Arc::new(MemoryConnection {
            name: name.to_string(),
            url: format!("memory://{name}/"),
            store: self.clone(),
        })
    }
}

impl Connector for MemoryStore {
    fn connect(&self, name: &str, url: &Url) -> Arc<dyn CouchConnection> {
        self.state
            .lock()
            .unwrap()
            .urls
            .insert(name.to_string(), url.to_string());
        Arc::new(MemoryConnection {
            name: name.to_string(),
            url: url.to_string(),
            store: self.clone(),
        })
    }
}

struct MemoryConnection {
    name: String,
    url: String,
    store: MemoryStore,
}

#[async_trait]
impl CouchConnection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn database_info(&self, database: &str) -> Result<Value, CouchError> {
        let mut state = self.store.state.lock().unwrap();
        state.calls.push(Call::DatabaseInfo {
            connection: self.name.clone(),
            database: database.to_string(),
        });

        match state.databases.get(&key(&self.name, database)) {
            Some(docs) => Ok(json!({ "db_name": database, "doc_count": docs.len() })),
            None => Err(CouchError::not_found("GET", format!("/{database}"))),
        }
    }

    async fn create_database(&self, database: &str) -> Result<(), CouchError> {
        let mut state = self.store.state.lock().unwrap();
        state.calls.push(Call::CreateDatabase {
            connection: self.name.clone(),
            database: database.to_string(),
        });

        let db_key = key(&self.name, database);
        if state.failing_creates.contains(&db_key) {
            return Err(CouchError::Status {
                method: "PUT",
                path: format!("/{database}"),
                status: 401,
                reason: "unauthorized".to_string(),
            });
        }
        state.databases.entry(db_key).or_default();
        Ok(())
    }

    fn database(&self, database: &str) -> Arc<dyn CouchDatabase> {
        Arc::new(MemoryDatabase {
            connection: self.name.clone(),
            name: database.to_string(),
            store: self.store.clone(),
        })
    }
}

struct MemoryDatabase {
    connection: String,
    name: String,
    store: MemoryStore,
}

#[async_trait]
impl CouchDatabase for MemoryDatabase {
    fn connection_name(&self) -> &str {
        &self.connection
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> Result<Document, CouchError> {
        let mut state = self.store.state.lock().unwrap();
        state.calls.push(Call::Get {
            connection: self.connection.clone(),
            database: self.name.clone(),
            id: id.to_string(),
        });

        state
            .databases
            .get(&key(&self.connection, &self.name))
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| CouchError::not_found("GET", format!("/{}/{id}", self.name)))
    }

    async fn insert(&self, id: &str, doc: &Document) -> Result<String, CouchError> {
        let mut state = self.store.state.lock().unwrap();
        state.calls.push(Call::Insert {
            connection: self.connection.clone(),
            database: self.name.clone(),
            id: id.to_string(),
        });

        let path = format!("/{}/{id}", self.name);
        let db_key = key(&self.connection, &self.name);
        if state.failing_writes.contains(&db_key) {
            return Err(CouchError::Status {
                method: "PUT",
                path,
                status: 500,
                reason: "internal_server_error".to_string(),
            });
        }

        let current = state
            .databases
            .get(&db_key)
            .ok_or_else(|| CouchError::not_found("PUT", path.clone()))?
            .get(id)
            .and_then(|existing| existing.get("_rev").cloned());

        if current.as_ref() != doc.get("_rev") {
            return Err(CouchError::Status {
                method: "PUT",
                path,
                status: 409,
                reason: "conflict".to_string(),
            });
        }

        let rev = state.new_rev();
        let mut stored = doc.clone();
        stored.insert("_id".to_string(), json!(id));
        stored.insert("_rev".to_string(), json!(rev));
        state
            .databases
            .entry(db_key)
            .or_default()
            .insert(id.to_string(), stored);

        Ok(rev)
    }
}
