//! Database handle indexes.
//!
//! Every registered database is reachable by its qualified name
//! (`<connection>:<database>`) and, while no other connection registers the
//! same name, by its bare database name.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::connection::CouchDatabase;
use crate::designs::qualified_name;
use crate::error::Error;

#[derive(Default)]
pub struct DatabaseIndex {
    qualified: HashMap<String, Arc<dyn CouchDatabase>>,
    by_name: HashMap<String, BTreeMap<String, Arc<dyn CouchDatabase>>>,
}

impl DatabaseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a handle under both names. Re-registering the same qualified name
    /// replaces the earlier handle.
    pub fn register(&mut self, db: Arc<dyn CouchDatabase>) {
        let connection = db.connection_name().to_string();
        let database = db.name().to_string();

        self.qualified
            .insert(qualified_name(&connection, &database), db.clone());

        let by_conn = self.by_name.entry(database.clone()).or_default();
        if by_conn.keys().any(|existing| *existing != connection) {
            tracing::warn!(
                "Multiple databases are using the name \"{}\" (connections: {}, {})",
                database,
                by_conn.keys().cloned().collect::<Vec<_>>().join(", "),
                connection
            );
        }
        by_conn.insert(connection, db);
    }

    /// Resolve `<connection>:<database>` directly, or a bare database name
    /// when exactly one connection registered it.
    pub fn get(&self, name: &str) -> Result<Option<Arc<dyn CouchDatabase>>, Error> {
        if name.contains(':') {
            return Ok(self.qualified.get(name).cloned());
        }

        let Some(by_conn) = self.by_name.get(name) else {
            return Ok(None);
        };

        if by_conn.len() > 1 {
            return Err(Error::AmbiguousName {
                name: name.to_string(),
                connections: by_conn.keys().cloned().collect(),
            });
        }

        Ok(by_conn.values().next().cloned())
    }

    /// All qualified names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.qualified.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, qualified: &str) -> bool {
        self.qualified.contains_key(qualified)
    }
}
