//! Code migrations.
//!
//! A `.rs` file in a migrations directory fixes where a code migration runs
//! in the order; the code itself is compiled into the binary and registered
//! under the file name without extension.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::environment::Environment;

/// A migration written in Rust.
///
/// Implement it with `#[async_trait(?Send)]`.
#[async_trait(?Send)]
pub trait CodeMigration {
    /// Applies the migration. Runs inside the batch transaction on drivers
    /// that support one.
    async fn run(&self, env: &mut Environment) -> anyhow::Result<()>;
}

/// Code migrations by file stem.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<String, Box<dyn CodeMigration>>,
}

impl MigrationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration, replacing any previous one of the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        migration: impl CodeMigration + 'static,
    ) -> &mut Self {
        self.migrations.insert(name.into(), Box::new(migration));
        self
    }

    /// Builder form of [`Self::register`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, migration: impl CodeMigration + 'static) -> Self {
        self.register(name, migration);
        self
    }

    /// Looks up a migration by file stem.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn CodeMigration> {
        self.migrations.get(name).map(AsRef::as_ref)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.migrations.keys().map(String::as_str)
    }

    /// Number of registered migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.migrations.keys()).finish()
    }
}
