//! Filesystem path resolution for SQL and migration directories.
//!
//! Directory lists are ordered by precedence: the first entry is searched
//! first. Entries registered later end up in front, so a later directory
//! shadows scripts of the same name in an earlier one. Driver mappings
//! contribute their driver-specific directory ahead of the `all` catch-all.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};

/// Key of the catch-all entry in a driver mapping.
pub const ALL_DRIVERS: &str = "all";

/// Resolves `path` to an absolute, canonical path.
///
/// # Errors
///
/// Returns [`Error::PathNotFound`] if the path does not exist.
pub fn resolve(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    std::fs::canonicalize(path).map_err(|_| Error::PathNotFound(path.to_path_buf()))
}

/// Normalizes a path lexically, without touching the filesystem.
///
/// Removes `.` segments and duplicate separators and lets `..` cancel the
/// preceding segment.
#[must_use]
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Returns whether `path` lies inside `parent` after lexical normalization.
#[must_use]
pub fn is_inside(parent: impl AsRef<Path>, path: impl AsRef<Path>) -> bool {
    normalize(path).starts_with(normalize(parent))
}

/// A directory specification as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirSpec {
    /// A single directory.
    Path(PathBuf),
    /// Driver name to directory, plus an optional `all` catch-all.
    ByDriver(BTreeMap<String, PathBuf>),
    /// Several entries; later entries are searched first.
    ///
    /// Entries must be paths or driver mappings. Nested lists are rejected.
    List(Vec<DirSpec>),
}

impl DirSpec {
    /// Creates a driver mapping from `(driver, path)` pairs.
    pub fn by_driver<K, P>(entries: impl IntoIterator<Item = (K, P)>) -> Self
    where
        K: Into<String>,
        P: Into<PathBuf>,
    {
        Self::ByDriver(
            entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        )
    }

    /// Parses a specification from a configuration value.
    ///
    /// Accepts a string, an object of strings, or an array of those.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDirectorySpec`] for any other shape.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::Path(PathBuf::from(s))),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => Ok((k.clone(), PathBuf::from(s))),
                    other => Err(Error::InvalidDirectorySpec(format!(
                        "driver '{k}' must map to a path, got {other}"
                    ))),
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Self::ByDriver),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(_) | Value::Object(_) => Self::from_value(item),
                    other => Err(Error::InvalidDirectorySpec(format!(
                        "a single entry must be either a path or a driver mapping, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            other => Err(Error::InvalidDirectorySpec(format!(
                "expected a path, a driver mapping or a list, got {other}"
            ))),
        }
    }

    /// Flattens the specification into resolved directories for `driver`,
    /// highest precedence first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathNotFound`] for a missing directory and
    /// [`Error::InvalidDirectorySpec`] for nested lists.
    pub fn resolve_for(&self, driver: &str) -> Result<Vec<PathBuf>> {
        match self {
            Self::Path(path) => Ok(vec![resolve(path)?]),
            Self::ByDriver(map) => driver_block(map, driver),
            Self::List(entries) => {
                let mut dirs: Vec<PathBuf> = Vec::new();
                for entry in entries {
                    match entry {
                        Self::Path(path) => dirs.insert(0, resolve(path)?),
                        Self::ByDriver(map) => {
                            let mut block = driver_block(map, driver)?;
                            block.append(&mut dirs);
                            dirs = block;
                        }
                        Self::List(_) => {
                            return Err(Error::InvalidDirectorySpec(
                                "a single entry must be either a path or a driver mapping".into(),
                            ));
                        }
                    }
                }
                Ok(dirs)
            }
        }
    }
}

impl From<&str> for DirSpec {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for DirSpec {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for DirSpec {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// Driver-specific directory first, then the catch-all.
fn driver_block(map: &BTreeMap<String, PathBuf>, driver: &str) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::with_capacity(2);
    if let Some(path) = map.get(driver) {
        dirs.push(resolve(path)?);
    }
    if let Some(path) = map.get(ALL_DRIVERS) {
        dirs.push(resolve(path)?);
    }
    Ok(dirs)
}
