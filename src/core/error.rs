//! Error handling for intentcode
//!
//! This module provides the error types and user-friendly error reporting for the
//! intent compiler. The error system follows two principles:
//! 1. **Strongly-typed errors** for precise handling inside the build pipeline
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`IntentError`] - Enumerated failure cases of the compiler
//! - [`ErrorContext`] - Wrapper that adds user-facing details and suggestions
//!
//! # Error Categories
//!
//! - **Invariant violations** (programming errors, never retried):
//!   [`IntentError::InvalidParentType`], [`IntentError::DuplicateKey`],
//!   [`IntentError::MissingField`], [`IntentError::PathOutsideRoot`],
//!   [`IntentError::InvalidPath`]
//! - **Generation failures**: [`IntentError::GenerationExhausted`]
//! - **Consistency failures**: [`IntentError::DependencyDivergence`]
//! - **Planning failures**: [`IntentError::ReplanLimitExceeded`]
//! - **Lookup and input failures**: [`IntentError::ProjectNotFound`],
//!   [`IntentError::ExtensionNotFound`], [`IntentError::InvalidExtension`],
//!   [`IntentError::InvalidDependency`], [`IntentError::ConfigError`]
//!
//! Lookup misses inside the graph store are not errors: they surface as `None`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use intentcode::core::{IntentError, user_friendly_error};
//!
//! let error = IntentError::ReplanLimitExceeded { limit: 5 };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for intentcode operations.
///
/// Every fatal condition of the build pipeline is one of these variants. Library
/// code propagates them inside [`anyhow::Error`]; only the binary decides to
/// print and exit.
#[derive(Error, Debug)]
pub enum IntentError {
    /// A node was placed under a parent whose type does not allow it.
    #[error("Node type '{child}' cannot be placed under a '{parent}' node")]
    InvalidParentType {
        /// Type tag of the node being written
        child: String,
        /// Type tag of the proposed parent (or "none" for a root)
        parent: String,
    },

    /// `create` was called for a unique key that already exists.
    ///
    /// Callers are expected to look the key up first; hitting this is a bug.
    #[error("Node '{name}' of type '{node_type}' already exists under the same parent in scope '{scope}'")]
    DuplicateKey {
        /// Scope of the colliding node
        scope: String,
        /// Type tag of the colliding node
        node_type: String,
        /// Name of the colliding node
        name: String,
    },

    /// A required field was missing when creating a node.
    #[error("Missing required field '{field}' for {node_type} node")]
    MissingField {
        /// Type tag of the node being created
        node_type: String,
        /// The missing field
        field: String,
    },

    /// A node id did not resolve to a node.
    #[error("Node not found: {id}")]
    NodeNotFound {
        /// The unresolved node id
        id: String,
    },

    /// A filesystem path did not live under the artifact root it was mapped against.
    #[error("Path '{path}' is outside the artifact root '{root}'")]
    PathOutsideRoot {
        /// The offending path
        path: String,
        /// The artifact root's directory
        root: String,
    },

    /// A relative artifact path was malformed.
    #[error("Invalid artifact path '{path}': {reason}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Generation never produced output that passed the call site's validator.
    #[error("Generation for '{call_site}' failed validation after {attempts} attempts")]
    GenerationExhausted {
        /// The call site that asked for generation (e.g. "compile")
        call_site: String,
        /// How many attempts were made
        attempts: usize,
        /// The validator's reason for the final rejection
        last_reason: String,
    },

    /// The on-disk dependency manifest no longer matches the graph.
    #[error("Dependency manifest {path} diverges from the build graph")]
    DependencyDivergence {
        /// Path of the manifest on disk
        path: String,
        /// The manifest as read from disk
        on_disk: String,
        /// The manifest as recorded in the graph
        in_graph: String,
    },

    /// Dependencies kept changing and the build re-planned too often.
    #[error("Build re-planned more than {limit} times because dependencies kept changing")]
    ReplanLimitExceeded {
        /// The configured re-plan cap
        limit: usize,
    },

    /// The requested project is not registered in the scope.
    #[error("Project '{name}' not found in scope '{scope}'")]
    ProjectNotFound {
        /// Scope that was searched
        scope: String,
        /// Project name that was requested
        name: String,
        /// Closest registered project name, if any
        closest: Option<String>,
    },

    /// A dependency entry was malformed.
    #[error("Invalid dependency '{name}': {reason}")]
    InvalidDependency {
        /// Package name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// No template extension satisfied a requested minimum version.
    #[error("No version of extension '{name}' satisfies {requirement}")]
    ExtensionNotFound {
        /// Extension name
        name: String,
        /// The requirement that could not be met
        requirement: String,
    },

    /// An extension package on disk could not be parsed.
    #[error("Invalid extension package at {path}: {reason}")]
    InvalidExtension {
        /// Package directory
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// The build was cancelled between stages or files.
    #[error("Build was cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Semver parsing error
    #[error("Semver parsing error: {0}")]
    SemverError(#[from] semver::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl IntentError {
    /// Whether this error signals a programming or invariant violation.
    ///
    /// These are never retried; they indicate a caller bug rather than bad input.
    #[must_use]
    pub const fn is_fatal_invariant(&self) -> bool {
        matches!(
            self,
            Self::InvalidParentType { .. }
                | Self::DuplicateKey { .. }
                | Self::MissingField { .. }
                | Self::PathOutsideRoot { .. }
                | Self::InvalidPath { .. }
        )
    }
}

impl Clone for IntentError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidParentType {
                child,
                parent,
            } => Self::InvalidParentType {
                child: child.clone(),
                parent: parent.clone(),
            },
            Self::DuplicateKey {
                scope,
                node_type,
                name,
            } => Self::DuplicateKey {
                scope: scope.clone(),
                node_type: node_type.clone(),
                name: name.clone(),
            },
            Self::MissingField {
                node_type,
                field,
            } => Self::MissingField {
                node_type: node_type.clone(),
                field: field.clone(),
            },
            Self::NodeNotFound {
                id,
            } => Self::NodeNotFound {
                id: id.clone(),
            },
            Self::PathOutsideRoot {
                path,
                root,
            } => Self::PathOutsideRoot {
                path: path.clone(),
                root: root.clone(),
            },
            Self::InvalidPath {
                path,
                reason,
            } => Self::InvalidPath {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::GenerationExhausted {
                call_site,
                attempts,
                last_reason,
            } => Self::GenerationExhausted {
                call_site: call_site.clone(),
                attempts: *attempts,
                last_reason: last_reason.clone(),
            },
            Self::DependencyDivergence {
                path,
                on_disk,
                in_graph,
            } => Self::DependencyDivergence {
                path: path.clone(),
                on_disk: on_disk.clone(),
                in_graph: in_graph.clone(),
            },
            Self::ReplanLimitExceeded {
                limit,
            } => Self::ReplanLimitExceeded {
                limit: *limit,
            },
            Self::ProjectNotFound {
                scope,
                name,
                closest,
            } => Self::ProjectNotFound {
                scope: scope.clone(),
                name: name.clone(),
                closest: closest.clone(),
            },
            Self::InvalidDependency {
                name,
                reason,
            } => Self::InvalidDependency {
                name: name.clone(),
                reason: reason.clone(),
            },
            Self::ExtensionNotFound {
                name,
                requirement,
            } => Self::ExtensionNotFound {
                name: name.clone(),
                requirement: requirement.clone(),
            },
            Self::InvalidExtension {
                path,
                reason,
            } => Self::InvalidExtension {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::Cancelled => Self::Cancelled,
            // For errors that don't implement Clone, convert to Other
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::DatabaseError(e) => Self::Other {
                message: format!("Database error: {e}"),
            },
            Self::JsonError(e) => Self::Other {
                message: format!("JSON error: {e}"),
            },
            Self::TomlError(e) => Self::Other {
                message: format!("TOML parsing error: {e}"),
            },
            Self::SemverError(e) => Self::Other {
                message: format!("Semver parsing error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information.
///
/// When displayed, errors show:
/// 1. **Error**: The main error message in red
/// 2. **Details**: Additional context in yellow (optional)
/// 3. **Suggestion**: Actionable steps in green (optional)
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: IntentError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: IntentError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions.
///
/// Recognises [`IntentError`] anywhere in the context chain, [`std::io::Error`]
/// and [`toml::de::Error`]; everything else is shown with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(intent_error) = error.downcast_ref::<IntentError>() {
        return create_error_context(intent_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(IntentError::Other {
                    message: format!("Permission denied: {io_error}"),
                })
                .with_suggestion("Check ownership and permissions of the project directory and ~/.intentcode")
                .with_details("intentcode needs to read specs/ and intent/ and write source files and .intentcode/");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(IntentError::Other {
                    message: format!("File not found: {io_error}"),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(IntentError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax in .intentcode/build.toml");
    }

    // Generic error - include the full error chain for better diagnostics
    let mut message = error.to_string();

    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(IntentError::Other {
        message,
    })
}

/// Map each [`IntentError`] variant to an [`ErrorContext`] with tailored suggestions.
fn create_error_context(error: IntentError) -> ErrorContext {
    let (details, suggestion): (Option<String>, Option<String>) = match &error {
        IntentError::GenerationExhausted {
            call_site,
            attempts,
            last_reason,
        } => (
            Some(format!(
                "The generation provider returned {attempts} outputs for '{call_site}' that did not \
                 match the expected shape. Last rejection: {last_reason}"
            )),
            Some(
                "Check the provider configuration in .intentcode/build.toml, or simplify the \
                 intent file so the model can produce a conforming answer"
                    .to_string(),
            ),
        ),
        IntentError::DependencyDivergence {
            on_disk,
            in_graph,
            ..
        } => (
            Some(format!("on disk:\n{on_disk}\nin graph:\n{in_graph}")),
            Some(
                "Do not edit .intentcode/deps.json by hand; declare dependencies in intent file \
                 front-matter and rebuild"
                    .to_string(),
            ),
        ),
        IntentError::ReplanLimitExceeded {
            ..
        } => (
            Some(
                "Each time a stage reports changed dependencies the build restarts its baseline \
                 stages; the generated output never settled"
                    .to_string(),
            ),
            Some(
                "Raise max_replans in .intentcode/build.toml or pin the dependencies the build keeps changing"
                    .to_string(),
            ),
        ),
        IntentError::ProjectNotFound {
            closest,
            ..
        } => (
            None,
            Some(match closest {
                Some(name) => format!("Did you mean '{name}'?"),
                None => "Register the project first with 'intentcode init <path> --name <name>'"
                    .to_string(),
            }),
        ),
        IntentError::ExtensionNotFound {
            name,
            ..
        } => (
            None,
            Some(format!(
                "Install a newer '{name}' package into the extensions directory or lower the \
                 requested version in the tech stack spec"
            )),
        ),
        IntentError::InvalidExtension {
            ..
        } => (
            None,
            Some(
                "Each extension needs an extension.json with id, name and a semantic version"
                    .to_string(),
            ),
        ),
        e if e.is_fatal_invariant() => (
            Some("This is an internal consistency error in the build graph".to_string()),
            Some("Please report this issue with the output of 'intentcode -v build'".to_string()),
        ),
        _ => (None, None),
    };

    let mut context = ErrorContext::new(error);
    context.details = details;
    context.suggestion = suggestion;
    context
}
