//! Error handling for metalware.
//! Defines custom error types and results used throughout the application.

use std::io;
use thiserror::Error;

/// Custom error types for metalware operations.
///
/// Data and merge errors, template syntax errors and the depth bound are fatal for the
/// render in progress. Nil values are not errors unless the answers guard runs in strict mode.
#[derive(Error, Debug)]
pub enum Error {
    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    /// A document on disk is not valid YAML
    #[error("Failed to parse '{origin}': {source}.")]
    YamlError {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A scope document is not a mapping at the top level
    #[error("Invalid data for {scope}: expected a mapping at the top level, found {found}.")]
    InvalidScopeDataError { scope: String, found: String },

    /// Merge input invariant violated
    #[error("Cannot combine hashes: {0}.")]
    CombineHashError(String),

    /// Too many nested renders, almost always a value that refers back to itself
    #[error(
        "Maximum render depth ({max_depth}) exceeded while rendering '{path}', \
         this is most likely a recursive reference in the configuration."
    )]
    RecursiveConfigDepthExceededError { max_depth: usize, path: String },

    /// Attribute access on a nil or absent value inside a template
    #[error("Attempted to access '{attribute}' on unset parameter '{path}'.")]
    UnsetParameterAccessError { attribute: String, path: String },

    /// Strict answers lookup for a question that has no answer
    #[error("Missing answer for parameter '{0}'.")]
    MissingParameterError(String),

    /// Malformed template tag
    #[error("Failed to parse template:\n{template}\n\n{message}")]
    TemplateSyntaxError { template: String, message: String },

    /// Template evaluation failed for a reason other than syntax
    #[error("Template error: {0}.")]
    TemplateError(String),

    /// An asset field points at an asset that does not exist
    #[error("Asset field '{field}' references unknown asset '{name}'.")]
    AssetReferenceError { field: String, name: String },

    /// Both a node and a group were given as the render scope
    #[error("Cannot render for node '{node}' and group '{group}' at the same time.")]
    ConflictingScopeError { node: String, group: String },

    /// Represents errors that occur during configuration parsing or processing
    #[error("Configuration error: {0}.")]
    ConfigError(String),
}

impl Error {
    /// Builds a syntax error with the template and the parser message indented for display.
    pub fn template_syntax(template: &str, message: impl AsRef<str>) -> Self {
        Self::TemplateSyntaxError {
            template: indent(template),
            message: indent(message.as_ref()),
        }
    }

    pub fn yaml<S: Into<String>>(origin: S, source: serde_yaml::Error) -> Self {
        Self::YamlError { origin: origin.into(), source }
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("    {line}")).collect::<Vec<_>>().join("\n")
}

/// Convenience type alias for Results with Error as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// # Behavior
/// Prints the error message to stderr and exits with status code 1
pub fn default_error_handler(err: Error) {
    eprintln!("{err}");
    std::process::exit(1);
}
