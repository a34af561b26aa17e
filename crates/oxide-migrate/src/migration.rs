//! Migration file discovery.
//!
//! Migrations are plain files in the configured migration directories. Their
//! file names fix the order they run in, so names are expected to start with
//! a sortable timestamp. A `[driver]` tag anywhere in the name restricts a
//! migration to that driver.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use oxide_query::{ConnectionConfig, Driver};
use regex::Regex;

use crate::error::Result;

static DRIVER_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[a-z]{3,8}\]").expect("valid regex"));

/// How a migration file is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    /// `.sql`: executed as is.
    Sql,
    /// `.tpql`: rendered as a template, then executed as SQL.
    Template,
    /// `.rs`: runs a registered [`crate::registry::CodeMigration`].
    Code,
}

impl MigrationKind {
    /// Maps a file extension to its kind.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "sql" => Some(Self::Sql),
            "tpql" => Some(Self::Template),
            "rs" => Some(Self::Code),
            _ => None,
        }
    }
}

/// A discovered migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Full path.
    pub path: PathBuf,
    /// File name, the key stored in the tracking table.
    pub name: String,
    /// Namespace the file belongs to.
    pub namespace: String,
    /// Execution strategy.
    pub kind: MigrationKind,
}

impl MigrationFile {
    /// Describes a file, if it has a migration extension.
    #[must_use]
    pub fn from_path(namespace: &str, path: &Path) -> Option<Self> {
        let kind = MigrationKind::from_extension(path.extension()?.to_str()?)?;
        let name = path.file_name()?.to_str()?.to_string();
        Some(Self {
            path: path.to_path_buf(),
            name,
            namespace: namespace.to_string(),
            kind,
        })
    }

    /// File name without extension, the key code migrations register under.
    #[must_use]
    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map_or(self.name.as_str(), |(stem, _)| stem)
    }

    /// The driver tag in the file name, without brackets.
    #[must_use]
    pub fn driver_tag(&self) -> Option<&str> {
        DRIVER_TAG
            .find(&self.name)
            .map(|m| m.as_str().trim_matches(|c| c == '[' || c == ']'))
    }

    /// Whether the migration runs on `driver`.
    ///
    /// Untagged migrations run everywhere.
    #[must_use]
    pub fn supports(&self, driver: Driver) -> bool {
        !DRIVER_TAG.is_match(&self.name) || self.name.contains(&format!("[{}]", driver.name()))
    }
}

/// Collects the migrations of one namespace, sorted by file name.
///
/// Directory precedence does not affect the order. If two directories hold
/// a file of the same name, the one in the higher-precedence directory wins.
///
/// # Errors
///
/// Fails if a directory cannot be read.
pub fn discover(namespace: &str, dirs: &[PathBuf]) -> Result<Vec<MigrationFile>> {
    let mut found: BTreeMap<String, MigrationFile> = BTreeMap::new();
    for dir in dirs {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(file) = MigrationFile::from_path(namespace, &path) {
                found.entry(file.name.clone()).or_insert(file);
            }
        }
    }
    Ok(found.into_values().collect())
}

/// Collects the migrations of every namespace, namespace by namespace in
/// name order.
///
/// # Errors
///
/// Fails if a directory cannot be read.
pub fn discover_all(config: &ConnectionConfig) -> Result<Vec<MigrationFile>> {
    let mut all = Vec::new();
    for (namespace, dirs) in config.namespaced_migration_dirs() {
        all.extend(discover(namespace, dirs)?);
    }
    Ok(all)
}
