//! The connection/database registry service.
//!
//! [`CouchService::init`] builds every configured connection, verifies each of
//! its databases concurrently and registers the ones that pass. Verification of
//! a single database runs strictly in order: existence check, optional
//! creation, registration, optional design update. Failures are collected per
//! database and never stop sibling databases or connections.

use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::{ConnectionConfig, CouchConfig};
use crate::connection::{
    ConnectionRegistry, Connector, CouchConnection, CouchDatabase, connection_url,
};
use crate::designs::{DesignPath, DesignSet, qualified_name};
use crate::error::Error;
use crate::reconcile::{self, DesignOutcome, DesignStatus};
use crate::registry::DatabaseIndex;
use crate::scope::{OptionKey, ScopedConfig};

/// Verification result of one configured database
#[derive(Debug)]
pub struct DatabaseReport {
    /// `<connection>:<database>`
    pub name: String,
    /// Design outcomes when `updateDesigns` applied, empty otherwise
    pub result: Result<Vec<DesignOutcome>, Error>,
}

/// Everything [`CouchService::init`] observed
#[derive(Debug, Default)]
pub struct InitReport {
    pub connection_errors: Vec<Error>,
    pub databases: Vec<DatabaseReport>,
}

impl InitReport {
    /// Connection, database and design failures, in that order
    pub fn errors(&self) -> Vec<&Error> {
        let mut errors: Vec<&Error> = self.connection_errors.iter().collect();
        for db in &self.databases {
            match &db.result {
                Err(e) => errors.push(e),
                Ok(designs) => errors.extend(designs.iter().filter_map(|d| d.result.as_ref().err())),
            }
        }
        errors
    }

    pub fn is_ok(&self) -> bool {
        self.errors().is_empty()
    }

    pub fn design_outcomes(&self) -> impl Iterator<Item = &DesignOutcome> {
        self.databases
            .iter()
            .filter_map(|db| db.result.as_ref().ok())
            .flatten()
    }
}

#[derive(Default)]
struct Registry {
    connections: ConnectionRegistry,
    databases: DatabaseIndex,
}

pub struct CouchService {
    scope: ScopedConfig,
    designs: DesignSet,
    connector: Arc<dyn Connector>,
    registry: RwLock<Registry>,
}

impl CouchService {
    pub fn new(config: CouchConfig, designs: DesignSet, connector: Arc<dyn Connector>) -> Self {
        Self {
            scope: ScopedConfig::new(config),
            designs,
            connector,
            registry: RwLock::new(Registry::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build all connections and verify all databases.
    ///
    /// Never fails as a whole; inspect [`InitReport::errors`] to decide
    /// whether a partial failure is fatal.
    pub async fn init(&self) -> InitReport {
        let connections = &self.scope.config().connections;
        tracing::debug!(
            "Initializing connections {}",
            connections.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        let results = join_all(
            connections
                .iter()
                .map(|(name, config)| self.init_connection(name, config)),
        )
        .await;

        let mut report = InitReport::default();
        for result in results {
            match result {
                Ok(databases) => report.databases.extend(databases),
                Err(e) => {
                    tracing::error!("{}", e);
                    report.connection_errors.push(e);
                }
            }
        }
        report
    }

    async fn init_connection(
        &self,
        name: &str,
        config: &ConnectionConfig,
    ) -> Result<Vec<DatabaseReport>, Error> {
        let url = connection_url(name, config)?;
        let conn = self.connector.connect(name, &url);
        self.write().connections.register(conn.clone());

        let verifications = config.databases.keys().map(|database| {
            let conn = conn.clone();
            async move {
                let result = self.verify_database(conn.as_ref(), database).await;
                if let Err(e) = &result {
                    tracing::error!("{}", crate::error::format_error(e));
                }
                DatabaseReport {
                    name: qualified_name(name, database),
                    result,
                }
            }
        });

        Ok(join_all(verifications).await)
    }

    async fn verify_database(
        &self,
        conn: &dyn CouchConnection,
        database: &str,
    ) -> Result<Vec<DesignOutcome>, Error> {
        let connection = conn.name();
        tracing::debug!("Verifying database {} of connection {}", database, connection);

        let option = |key: OptionKey, default: bool| {
            self.scope.get(key, Some(connection), Some(database), default)
        };

        if option(OptionKey::ValidateConnection, true) {
            if let Err(err) = conn.database_info(database).await {
                if !option(OptionKey::CreateDatabase, false) {
                    return Err(Error::DatabaseConnection {
                        connection: connection.to_string(),
                        database: database.to_string(),
                        source: err,
                    });
                }

                tracing::debug!(
                    "DB {} of connection {} unavailable ({}), creating it",
                    database,
                    connection,
                    err
                );
                conn.create_database(database)
                    .await
                    .map_err(|source| Error::DatabaseCreation {
                        connection: connection.to_string(),
                        database: database.to_string(),
                        source,
                    })?;
                tracing::info!("Created database {} of connection {}.", database, connection);
            }
        } else {
            tracing::debug!(
                "{} is false for {}:{}, skipping existence check",
                OptionKey::ValidateConnection.as_str(),
                connection,
                database
            );
        }

        self.write().databases.register(conn.database(database));

        if !option(OptionKey::UpdateDesigns, false) {
            return Ok(Vec::new());
        }
        Ok(self.update_database_designs(connection, database).await)
    }

    /// Reconcile every local design of one registered database
    async fn update_database_designs(&self, connection: &str, database: &str) -> Vec<DesignOutcome> {
        let qualified = qualified_name(connection, database);
        let Some(designs) = self.designs.for_database(&qualified) else {
            tracing::warn!("No design documents found for database {}", qualified);
            return Vec::new();
        };

        let paths: Vec<DesignPath> = designs
            .keys()
            .map(|design| DesignPath::new(connection, database, design))
            .collect();
        self.update_designs(Some(&paths)).await
    }

    pub fn get_connection(&self, name: &str) -> Option<Arc<dyn CouchConnection>> {
        self.read().connections.get(name)
    }

    pub fn get_connections(&self) -> BTreeMap<String, Arc<dyn CouchConnection>> {
        self.read().connections.all()
    }

    /// Every registered `<connection>:<database>`, sorted
    pub fn get_database_names(&self) -> Vec<String> {
        self.read().databases.names()
    }

    /// Look up a database by `<connection>:<database>` or bare name.
    ///
    /// A bare name registered by more than one connection is an
    /// [`Error::AmbiguousName`]; an unknown name is `Ok(None)`.
    pub fn get(&self, name: &str) -> Result<Option<Arc<dyn CouchDatabase>>, Error> {
        self.read().databases.get(name)
    }

    /// Write `document` to `_design/<design>` of `database` unless the remote
    /// copy is already identical.
    pub async fn update_design(
        &self,
        database: &str,
        design: &str,
        document: &Value,
    ) -> Result<DesignStatus, Error> {
        let db = self.get(database)?.ok_or_else(|| Error::UnknownDatabase {
            name: database.to_string(),
        })?;
        reconcile::reconcile(db.as_ref(), design, document).await
    }

    /// Reconcile the given design paths, or every local design of every
    /// registered database when `paths` is `None`. One outcome per path, in
    /// input order.
    pub async fn update_designs(&self, paths: Option<&[DesignPath]>) -> Vec<DesignOutcome> {
        let paths = match paths {
            Some(paths) => paths.to_vec(),
            None => self.known_design_paths(),
        };

        join_all(paths.into_iter().map(|path| async move {
            let result = self.update_design_path(&path).await;
            DesignOutcome { path, result }
        }))
        .await
    }

    fn known_design_paths(&self) -> Vec<DesignPath> {
        let registry = self.read();
        self.designs
            .paths()
            .into_iter()
            .filter(|path| registry.databases.contains(&path.qualified_database()))
            .collect()
    }

    async fn update_design_path(&self, path: &DesignPath) -> Result<DesignStatus, Error> {
        let qualified = path.qualified_database();
        let db = self.get(&qualified)?.ok_or_else(|| Error::UnknownDatabase {
            name: qualified.clone(),
        })?;
        let document = self
            .designs
            .get(path)
            .ok_or_else(|| Error::LocalDesignNotFound {
                database: qualified.clone(),
                design: path.design.clone(),
            })?;

        reconcile::reconcile(db.as_ref(), &path.design, document).await
    }
}
