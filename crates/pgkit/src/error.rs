//! Error types for PostgreSQL environment discovery.
//!
//! Errors are grouped into categories so the caller can decide how to react:
//! selection problems abort the run with a message, permission problems get an
//! actionable instruction, template problems point at the offending seed file.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of errors, used to pick user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Version or cluster could not be resolved
    Selection,
    /// Operator typed something that is not a menu entry (recoverable)
    Input,
    /// Seed template could not be rendered
    Template,
    /// Access to a file was denied
    Permission,
    /// A user, group or path lookup failed
    Lookup,
    /// Other I/O failures
    Io,
}

impl ErrorCategory {
    /// Whether the operation can simply be asked again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Input)
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Selection => "Install a supported PostgreSQL server and create a cluster",
            Self::Input => "Type the number of one of the listed options",
            Self::Template => "Fix the placeholders in the seed file or add the variable",
            Self::Permission => "Log out and back in so new group memberships take effect",
            Self::Lookup => "Check that the user, group or path exists on this machine",
            Self::Io => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while probing and validating the PostgreSQL setup.
#[derive(Debug, Error)]
pub enum Error {
    /// The PostgreSQL configuration root does not exist or is not a directory
    #[error("PostgreSQL configuration root not found: {}", .0.display())]
    ConfigurationRootMissing(PathBuf),

    /// None of the installed versions satisfies the minimum
    #[error("no compatible PostgreSQL version installed (minimum {minimum}, found: {})", format_found(.found))]
    NoCompatiblePostgresVersion {
        /// Configured minimum version
        minimum: String,
        /// Versions that were discovered
        found: Vec<String>,
    },

    /// The selected version has no cluster directory
    #[error("no cluster found for PostgreSQL {version}")]
    NoClusterFound {
        /// Version whose directory was empty
        version: String,
    },

    /// Menu input was not a valid choice
    #[error("invalid selection '{input}': choose a number between 1 and {max}")]
    InvalidMenuSelection {
        /// What the operator typed
        input: String,
        /// Number of options on the menu
        max: usize,
    },

    /// A version string could not be parsed
    #[error("invalid PostgreSQL version: '{0}'")]
    InvalidVersion(String),

    /// A seed file references a variable that has no value
    #[error("missing template variable '{name}'")]
    MissingTemplateVariable {
        /// Placeholder name
        name: String,
    },

    /// Unbalanced or empty braces in a seed file
    #[error("malformed template at byte {offset}: {message}")]
    MalformedTemplate {
        /// Byte offset of the problem
        offset: usize,
        /// What is wrong
        message: String,
    },

    /// Reading a file was denied
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Path does not exist
    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// User is not present in the account database
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Group id has no name in the group database
    #[error("unknown group id: {0}")]
    UnknownGroup(u32),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_found(found: &[String]) -> String {
    if found.is_empty() {
        "none".to_string()
    } else {
        found.join(", ")
    }
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConfigurationRootMissing(_)
            | Error::NoCompatiblePostgresVersion { .. }
            | Error::NoClusterFound { .. }
            | Error::InvalidVersion(_) => ErrorCategory::Selection,
            Error::InvalidMenuSelection { .. } => ErrorCategory::Input,
            Error::MissingTemplateVariable { .. } | Error::MalformedTemplate { .. } => {
                ErrorCategory::Template
            }
            Error::PermissionDenied(_) => ErrorCategory::Permission,
            Error::PathNotFound(_) | Error::UnknownUser(_) | Error::UnknownGroup(_) => {
                ErrorCategory::Lookup
            }
            Error::Io(_) => ErrorCategory::Io,
        }
    }

    /// Map an I/O error on `path` to the matching variant.
    pub fn from_io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::PathNotFound(path.into()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.into()),
            _ => Error::Io(err),
        }
    }
}

/// Result type alias for pgkit operations.
pub type Result<T> = std::result::Result<T, Error>;
