//! Error types for SQL script resolution and query execution.

use std::path::PathBuf;

/// Broad classes of failure, used by callers that only need to know how
/// a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad paths, identifiers, drivers or directory specifications.
    Configuration,
    /// An argument could not be bound to the statement.
    Binding,
    /// Template evaluation failed or received the wrong kind of arguments.
    Template,
    /// The database rejected the statement.
    Execution,
    /// A namespace, script or path is absent.
    NotFound,
}

/// Errors that can occur while configuring connections or running queries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configured path does not exist on disk.
    #[error("Path does not exist: {0}")]
    PathNotFound(PathBuf),

    /// A directory specification is neither a path nor a driver mapping.
    #[error("Invalid directory specification: {0}")]
    InvalidDirectorySpec(String),

    /// A table or column name contains forbidden characters.
    #[error("Invalid migrations {kind} name: {name}")]
    InvalidIdentifier {
        /// What the identifier names ("table" or "table column").
        kind: &'static str,
        /// The rejected identifier.
        name: String,
    },

    /// The connection address names a driver that is not supported.
    #[error("Database driver not supported: {0}")]
    UnsupportedDriver(String),

    /// The connection address could not be parsed.
    #[error("Invalid connection address '{address}': {source}")]
    InvalidAddress {
        /// The address as configured.
        address: String,
        /// Parser error.
        source: url::ParseError,
    },

    /// No SQL directory contains the requested namespace.
    #[error("The SQL folder does not exist: {0}")]
    NamespaceNotFound(String),

    /// No SQL directory contains the requested script.
    #[error("SQL script does not exist: {namespace}/{script}")]
    ScriptNotFound {
        /// Namespace that was searched.
        namespace: String,
        /// Script name without extension.
        script: String,
    },

    /// An argument value has a type that cannot be bound.
    #[error("Unsupported argument type '{0}': only bool, int, string, null and array are supported")]
    UnsupportedArgumentType(String),

    /// The statement references a named placeholder without a value.
    #[error("Missing value for placeholder ':{0}'")]
    MissingArgument(String),

    /// A named value is never referenced by the statement.
    #[error("Argument '{0}' is not used in the statement")]
    UnusedArgument(String),

    /// The number of positional values does not match the placeholders.
    #[error("Statement expects {expected} positional arguments, got {got}")]
    ArgumentCount {
        /// Number of `?` placeholders in the statement.
        expected: usize,
        /// Number of values supplied.
        got: usize,
    },

    /// A template script was invoked with positional arguments.
    #[error("Template queries `*.tpql` allow named parameters only")]
    TemplateRequiresNamedArguments,

    /// Template rendering failed.
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    /// Database error during execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading script files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization of an array argument failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns the class of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PathNotFound(_)
            | Self::InvalidDirectorySpec(_)
            | Self::InvalidIdentifier { .. }
            | Self::UnsupportedDriver(_)
            | Self::InvalidAddress { .. } => ErrorCategory::Configuration,
            Self::NamespaceNotFound(_) | Self::ScriptNotFound { .. } => ErrorCategory::NotFound,
            Self::UnsupportedArgumentType(_)
            | Self::MissingArgument(_)
            | Self::UnusedArgument(_)
            | Self::ArgumentCount { .. }
            | Self::Serialization(_) => ErrorCategory::Binding,
            Self::TemplateRequiresNamedArguments | Self::Template(_) => ErrorCategory::Template,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Execution,
        }
    }
}

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, Error>;
