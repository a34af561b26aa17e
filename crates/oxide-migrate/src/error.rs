//! Error types for the migration system.

use std::path::PathBuf;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Query layer error: configuration, binding, template or execution.
    #[error(transparent)]
    Query(#[from] oxide_query::Error),

    /// A code migration failed.
    #[error(transparent)]
    Code(#[from] anyhow::Error),

    /// IO error (reading/writing migration files, writing the report).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file could not be parsed.
    #[error("Invalid settings file '{path}': {source}")]
    Settings {
        /// Path to the settings file.
        path: PathBuf,
        /// Parser error.
        source: toml::de::Error,
    },

    /// A directory entry in the settings file could not be converted.
    #[error("Invalid directory entry in settings: {0}")]
    SettingsValue(#[from] serde_json::Error),

    /// The settings file has no connection with the requested name.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// No migration directories are configured.
    #[error("No migration directories defined in configuration")]
    NoMigrationDirs,

    /// The namespace has no migration directory.
    #[error("No migration directory defined for namespace '{0}'")]
    NamespaceNotFound(String),

    /// A migrations directory is missing on disk.
    #[error("The migrations directory does not exist: {0}")]
    MigrationsDirNotFound(PathBuf),

    /// A migrations directory lies inside a vendored or registry tree.
    #[error("The migrations directory is inside a vendored tree: {0}")]
    VendoredDirectory(PathBuf),

    /// A migrations directory cannot be written to.
    #[error("Migrations directory is not writable: {0}")]
    NotWritable(PathBuf),

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// A new migration was requested with an unknown extension.
    #[error("Wrong file extension '{0}'. Use 'sql', 'rs' or 'tpql' instead")]
    UnsupportedExtension(String),

    /// A `.rs` migration has no implementation in the registry.
    #[error("No code migration registered for '{0}'")]
    UnregisteredMigration(String),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
