//! Scoped option lookup: database, then connection, then global, then a default.

use crate::config::{CouchConfig, ScopeOptions};

/// A named option that can be set at any scope level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    ValidateConnection,
    CreateDatabase,
    UpdateDesigns,
}

impl OptionKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidateConnection => "validateConnection",
            Self::CreateDatabase => "createDatabase",
            Self::UpdateDesigns => "updateDesigns",
        }
    }

    /// The value a single scope defines for this key, if any.
    fn lookup(self, options: &ScopeOptions) -> Option<bool> {
        match self {
            Self::ValidateConnection => options.validate_connection,
            Self::CreateDatabase => options.create_database,
            Self::UpdateDesigns => options.update_designs,
        }
    }
}

pub struct ScopedConfig {
    config: CouchConfig,
}

impl ScopedConfig {
    pub fn new(config: CouchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CouchConfig {
        &self.config
    }

    /// Most specific defined value for `key`, or `None` when no scope sets it.
    ///
    /// Unknown connection or database names count as "not set at that scope".
    /// A database scope is only consulted together with its connection.
    pub fn resolve(
        &self,
        key: OptionKey,
        connection: Option<&str>,
        database: Option<&str>,
    ) -> Option<bool> {
        let conn_cfg = connection.and_then(|name| self.config.connections.get(name));

        let db_value = database
            .zip(conn_cfg)
            .and_then(|(db, conn)| conn.databases.get(db))
            .and_then(|db| key.lookup(&db.options));

        db_value
            .or_else(|| conn_cfg.and_then(|conn| key.lookup(&conn.options)))
            .or_else(|| key.lookup(&self.config.options))
    }

    pub fn get(
        &self,
        key: OptionKey,
        connection: Option<&str>,
        database: Option<&str>,
        default: bool,
    ) -> bool {
        self.resolve(key, connection, database).unwrap_or(default)
    }
}
