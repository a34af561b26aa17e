//! Templated SQL.
//!
//! Template scripts are rendered by [`tera`], which runs in its own sandbox:
//! templates can branch and loop over their variables but cannot reach the
//! filesystem or the database.

use tera::{Context, Tera};

use crate::config::Driver;
use crate::error::Result;

/// Name of the template variable holding the active driver.
pub const DRIVER_VAR: &str = "driver";

/// Creates a rendering context with the driver name in scope.
#[must_use]
pub fn context(driver: Driver) -> Context {
    let mut context = Context::new();
    context.insert(DRIVER_VAR, driver.name());
    context
}

/// Renders a template source. Autoescaping is off: the output is SQL.
///
/// # Errors
///
/// Returns [`crate::Error::Template`] on syntax or evaluation errors.
pub fn render(source: &str, context: &Context) -> Result<String> {
    Ok(Tera::one_off(source, context, false)?)
}
