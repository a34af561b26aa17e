//! SQL scripts loaded from namespace directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::args::Args;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::lexer;
use crate::query::Query;
use crate::template;

/// A loaded script file, either plain SQL or a template.
#[derive(Debug, Clone)]
pub struct Script {
    namespace: String,
    name: String,
    path: PathBuf,
    source: String,
    template: bool,
}

impl Script {
    pub(crate) fn new(
        namespace: &str,
        name: &str,
        path: PathBuf,
        source: String,
        template: bool,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            path,
            source,
            template,
        }
    }

    /// The namespace the script was found in.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Script name, without extension.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the script was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file contents.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the script is rendered before execution.
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.template
    }

    /// Binds arguments and returns the query, ready to run on `db`.
    ///
    /// Templates only accept named arguments. They are rendered with the
    /// driver name and every argument in scope, and arguments the rendered
    /// SQL does not reference are dropped before binding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateRequiresNamedArguments`] for positional
    /// arguments to a template and [`Error::Template`] if rendering fails.
    pub fn invoke<'db>(&self, db: &'db mut Database, args: impl Into<Args>) -> Result<Query<'db>> {
        let args = args.into();
        if !self.template {
            return Ok(db.execute(self.source.clone(), args));
        }

        let named = match args {
            Args::Named(named) => named,
            Args::Positional(values) if values.is_empty() => BTreeMap::new(),
            Args::Positional(_) => return Err(Error::TemplateRequiresNamedArguments),
        };

        let mut context = template::context(db.driver());
        for (key, value) in &named {
            context.insert(key.as_str(), &value.to_json());
        }
        let sql = template::render(&self.source, &context)?;

        let referenced = lexer::named_placeholders(&sql);
        let pruned: BTreeMap<_, _> = named
            .into_iter()
            .filter(|(key, _)| referenced.contains(key))
            .collect();
        debug!(
            script = %format!("{}/{}", self.namespace, self.name),
            args = pruned.len(),
            "Rendered template"
        );

        Ok(db.execute(sql, Args::Named(pruned)))
    }
}
