//! Error types for the analysis pipeline.
//!
//! Errors fall into three groups:
//! - [`FatalError`] aborts the run and no report is produced.
//! - [`ToolFailure`] is recorded against a single tool while the run continues.
//! - [`DegradedInput`] is logged, defaults are substituted, and the run continues.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Conditions that halt a run before a report can be built.
#[derive(Debug, Error)]
pub enum FatalError {
    /// The analysis root does not exist or is not a directory.
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// A subtree could not be traversed and permissions were not forced.
    #[error("permission denied while reading {}", .0.display())]
    PermissionDenied(PathBuf),

    /// The requested tool has no registered implementation.
    #[error("unknown tool `{name}`; available tools: {}", .available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    /// A tool was explicitly requested but nothing is left to run.
    #[error("no tools resolved for requested tool `{requested}`: {reason}")]
    NoToolsResolved { requested: String, reason: ToolFailure },

    /// The run was interrupted before it completed.
    #[error("run cancelled")]
    Cancelled,

    /// An exclusion glob could not be compiled.
    #[error(transparent)]
    InvalidExclusion(#[from] ExclusionError),

    /// Any other I/O failure while walking the tree.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure confined to one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolFailure {
    /// The invocation exceeded its configured timeout.
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The tool ran but reported an error or produced unusable output.
    #[error("execution failed: {message}")]
    ExecutionError { message: String },

    /// The tool is disabled in the resolved configuration.
    #[error("tool is not enabled")]
    NotEnabled,
}

/// Inputs that were unavailable and replaced by local defaults.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DegradedInput {
    #[error("remote project configuration unavailable: {reason}")]
    RemoteConfigUnavailable { reason: String },
}

/// Failure to obtain the remote project configuration.
#[derive(Debug, Error)]
pub enum RemoteConfigError {
    #[error("failed to read project configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse project configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("project configuration unavailable: {0}")]
    Unavailable(String),
}

/// An exclusion rule that is not a valid glob.
#[derive(Debug, Error)]
#[error("invalid exclusion pattern `{pattern}`: {source}")]
pub struct ExclusionError {
    pub pattern: String,
    #[source]
    pub source: globset::Error,
}

/// Errors raised while walking the analysis directory.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("permission denied while reading {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl From<CollectError> for FatalError {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::DirectoryNotFound(path) => FatalError::DirectoryNotFound(path),
            CollectError::PermissionDenied(path) => FatalError::PermissionDenied(path),
            CollectError::Walk { path, source } => FatalError::Io(
                source
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other(format!("walk error at {}", path.display()))),
            ),
        }
    }
}

/// Errors produced while resolving per-tool configuration.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown tool `{name}`; available tools: {}", .available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("tool `{0}` is not enabled")]
    ToolNotEnabled(String),

    #[error(transparent)]
    InvalidExclusion(#[from] ExclusionError),
}

impl From<ResolveError> for FatalError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UnknownTool { name, available } => {
                FatalError::UnknownTool { name, available }
            }
            ResolveError::ToolNotEnabled(name) => FatalError::NoToolsResolved {
                requested: name,
                reason: ToolFailure::NotEnabled,
            },
            ResolveError::InvalidExclusion(err) => FatalError::InvalidExclusion(err),
        }
    }
}
