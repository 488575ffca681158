//! Design document reconciliation.
//!
//! A local design document is written to `_design/<name>` only when the
//! remote copy is missing or differs. The remote `_rev` is carried over so the
//! store accepts the overwrite; comparing with that revision in place makes a
//! second run against unchanged content a no-op.

use serde_json::Value;
use std::fmt;

use crate::connection::{CouchDatabase, Document};
use crate::designs::{DesignPath, qualified_name};
use crate::error::Error;

const ID_FIELD: &str = "_id";
const REV_FIELD: &str = "_rev";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesignStatus {
    Updated {
        database: String,
        design: String,
        rev: String,
    },
    Identical {
        database: String,
        design: String,
    },
}

impl fmt::Display for DesignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated {
                database,
                design,
                rev,
            } => write!(
                f,
                "Design document _design/{design} of {database} updated to revision {rev}"
            ),
            Self::Identical { database, design } => write!(
                f,
                "Local and remote design documents _design/{design} of {database} are identical, no update"
            ),
        }
    }
}

/// Result of reconciling one design document
#[derive(Debug)]
pub struct DesignOutcome {
    pub path: DesignPath,
    pub result: Result<DesignStatus, Error>,
}

impl DesignOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub fn design_id(design: &str) -> String {
    format!("_design/{design}")
}

/// Bring `_design/<design>` of `db` in line with `local`.
pub async fn reconcile(
    db: &dyn CouchDatabase,
    design: &str,
    local: &Value,
) -> Result<DesignStatus, Error> {
    let database = qualified_name(db.connection_name(), db.name());

    if design.trim().is_empty() {
        return Err(Error::invalid_argument(format!(
            "design name for {database} must not be empty"
        )));
    }
    let Some(local) = local.as_object() else {
        return Err(Error::invalid_argument(format!(
            "design document '{design}' for {database} must be a JSON object"
        )));
    };

    let id = design_id(design);
    let mut working: Document = local.clone();
    working.remove(ID_FIELD);
    working.remove(REV_FIELD);

    match db.get(&id).await {
        Ok(mut remote) => {
            if let Some(rev) = remote.get(REV_FIELD) {
                working.insert(REV_FIELD.to_string(), rev.clone());
            }
            remote.remove(ID_FIELD);

            if working == remote {
                tracing::debug!("{} of {} is up to date", id, database);
                return Ok(DesignStatus::Identical {
                    database,
                    design: design.to_string(),
                });
            }
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!("{} of {} does not exist yet", id, database);
        }
        Err(e) => {
            tracing::debug!("Could not fetch {} of {}, writing anyway: {}", id, database, e);
        }
    }

    let rev = db
        .insert(&id, &working)
        .await
        .map_err(|source| Error::DesignWrite {
            database: database.clone(),
            design: design.to_string(),
            source,
        })?;

    tracing::info!("Updated {} of {} to revision {}", id, database, rev);

    Ok(DesignStatus::Updated {
        database,
        design: design.to_string(),
        rev,
    })
}
