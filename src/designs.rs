//! Local design documents bundled with the application.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use walkdir::WalkDir;

use crate::error::Error;

/// Join a connection and database name into `<connection>:<database>`
pub fn qualified_name(connection: &str, database: &str) -> String {
    format!("{connection}:{database}")
}

/// Address of one design document: `<connection>.<database>.<design>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DesignPath {
    pub connection: String,
    pub database: String,
    pub design: String,
}

impl DesignPath {
    pub fn new(
        connection: impl Into<String>,
        database: impl Into<String>,
        design: impl Into<String>,
    ) -> Self {
        Self {
            connection: connection.into(),
            database: database.into(),
            design: design.into(),
        }
    }

    pub fn qualified_database(&self) -> String {
        qualified_name(&self.connection, &self.database)
    }
}

impl fmt::Display for DesignPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.connection, self.database, self.design)
    }
}

impl FromStr for DesignPath {
    type Err = Error;

    /// The connection ends at the first `.` and the design starts after the
    /// last one, so database names may themselves contain dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidDesignPath {
            path: s.to_string(),
        };

        let (connection, rest) = s.split_once('.').ok_or_else(invalid)?;
        let (database, design) = rest.rsplit_once('.').ok_or_else(invalid)?;

        if connection.is_empty() || database.is_empty() || design.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(connection, database, design))
    }
}

/// Design documents keyed by qualified database name, then design name
#[derive(Debug, Clone, Default)]
pub struct DesignSet {
    databases: BTreeMap<String, BTreeMap<String, Value>>,
}

impl DesignSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: DesignPath, document: Value) {
        self.databases
            .entry(path.qualified_database())
            .or_default()
            .insert(path.design, document);
    }

    pub fn get(&self, path: &DesignPath) -> Option<&Value> {
        self.databases
            .get(&path.qualified_database())
            .and_then(|designs| designs.get(&path.design))
    }

    /// All designs of one database, keyed by design name
    pub fn for_database(&self, qualified: &str) -> Option<&BTreeMap<String, Value>> {
        self.databases.get(qualified).filter(|designs| !designs.is_empty())
    }

    /// Every known design path, sorted
    pub fn paths(&self) -> Vec<DesignPath> {
        let mut paths: Vec<DesignPath> = self
            .databases
            .iter()
            .filter_map(|(qualified, designs)| {
                let (connection, database) = qualified.split_once(':')?;
                Some(designs.keys().map(move |design| DesignPath::new(connection, database, design)))
            })
            .flatten()
            .collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.databases.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load `<root>/<connection>/<database>/<design>.json`.
    /// A missing root yields an empty set; non-`.json` files are skipped.
    pub fn load_dir(root: &Path) -> Result<Self> {
        let mut set = Self::new();

        if !root.exists() {
            tracing::debug!("Design directory {} does not exist", root.display());
            return Ok(set);
        }

        let walker = WalkDir::new(root)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name();

        for entry in walker {
            let entry =
                entry.with_context(|| format!("Failed to read directory {}", root.display()))?;
            let file = entry.path();

            if !entry.file_type().is_file() || file.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(path) = design_path_of(root, file) else {
                tracing::debug!("Skipping {}: non UTF-8 path", file.display());
                continue;
            };

            let content = fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let document: Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse design document {}", file.display()))?;

            tracing::debug!("Loaded design document {}", path);
            set.insert(path, document);
        }

        Ok(set)
    }
}

/// `<root>/<connection>/<database>/<design>.json` to its design path
fn design_path_of(root: &Path, file: &Path) -> Option<DesignPath> {
    let relative = file.strip_prefix(root).ok()?;
    let mut parts = relative.iter().map(|part| part.to_str());
    let connection = parts.next()??;
    let database = parts.next()??;
    let design = file.file_stem()?.to_str()?;
    Some(DesignPath::new(connection, database, design))
}
