//! Error types.
//!
//! [`CouchError`] describes a failed call against the document store.
//! [`Error`] is what the registry and the design reconciler report; it always
//! names the connection/database/design involved and keeps the wire error as
//! its source.

use thiserror::Error;

/// Failure of a single request against a CouchDB server
#[derive(Debug, Error)]
pub enum CouchError {
    #[error("{method} {path} returned {status}: {reason}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        reason: String,
    },

    #[error("{method} {path} failed")]
    Transport {
        method: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response of {method} {path}")]
    Decode {
        method: &'static str,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected response from {path}: {message}")]
    MalformedResponse { path: String, message: String },
}

impl CouchError {
    pub fn not_found(method: &'static str, path: impl Into<String>) -> Self {
        Self::Status {
            method,
            path: path.into(),
            status: 404,
            reason: "not_found".to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Errors reported by the connection registry and design reconciliation
#[derive(Debug, Error)]
pub enum Error {
    #[error("Could not build connection '{connection}' from URL '{url}': {reason}")]
    ConnectionBuild {
        connection: String,
        url: String,
        reason: String,
    },

    #[error("Could not connect to DB {database} of connection {connection}")]
    DatabaseConnection {
        connection: String,
        database: String,
        #[source]
        source: CouchError,
    },

    #[error("Could not create DB {database} of connection {connection}")]
    DatabaseCreation {
        connection: String,
        database: String,
        #[source]
        source: CouchError,
    },

    #[error("The database name \"{name}\" is ambiguous for connections {}", .connections.join(", "))]
    AmbiguousName {
        name: String,
        connections: Vec<String>,
    },

    #[error("Unknown Database '{name}'")]
    UnknownDatabase { name: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("No local design document '{design}' for database '{database}'")]
    LocalDesignNotFound { database: String, design: String },

    #[error("Invalid design path '{path}': expected <connection>.<database>.<design>")]
    InvalidDesignPath { path: String },

    #[error("Failed to write design document '_design/{design}' to {database}")]
    DesignWrite {
        database: String,
        design: String,
        #[source]
        source: CouchError,
    },
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

/// Render an error with its full cause chain on one line
pub fn format_error(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
