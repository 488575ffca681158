//! Named CouchDB connections, verified databases and design document sync.
//!
//! A [`CouchService`] is built from the `couchdb` configuration section and a
//! set of local design documents. [`CouchService::init`] connects, checks (and
//! optionally creates) every configured database, and registers each under
//! `<connection>:<database>` and its bare name.

pub mod config;
pub mod connection;
pub mod designs;
pub mod error;
pub mod http_connection;
pub mod reconcile;
pub mod registry;
pub mod scope;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::{Config, ConnectionConfig, CouchConfig, DatabaseConfig, ScopeOptions};
pub use connection::{Connector, CouchConnection, CouchDatabase, Document};
pub use designs::{DesignPath, DesignSet};
pub use error::{CouchError, Error};
pub use http_connection::HttpConnector;
pub use reconcile::{DesignOutcome, DesignStatus};
pub use service::{CouchService, DatabaseReport, InitReport};
