//! SQL identifier validation and quoting.
//!
//! Attribute names reach SQL text verbatim, so behaviors validate them once
//! at configuration time instead of escaping at every statement.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, config_error};

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$") {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(error = %e, "Identifier pattern failed to compile");
                None
            }
        })
        .as_ref()
}

/// Whether `name` is a plain identifier (letters, digits, underscore; not
/// starting with a digit).
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_some_and(|re| re.is_match(name))
}

/// Validate the identifier held by configuration option `field`.
pub fn validate_identifier(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(config_error(field, "must not be empty"));
    }
    if !is_valid_identifier(name) {
        return Err(config_error(
            field,
            format!("'{name}' is not a valid column identifier"),
        ));
    }
    Ok(())
}

/// Quote an identifier with double quotes (ANSI / Postgres / SQLite).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an identifier with backticks (MySQL).
pub fn quote_ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
