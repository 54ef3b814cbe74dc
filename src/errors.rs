use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SynthError>;

/// Error taxonomy of the synthesis engine.
///
/// Every variant maps to a stable machine-readable kind tag via [`SynthError::kind`]
/// and to a driver exit code via [`SynthError::exit_code`].
#[derive(Error, Debug)]
pub enum SynthError {
    /// Two siblings claimed the same local id, or a local id violated the
    /// id preconditions (non-empty, no `/`).
    #[error("construct '{path}' already has a child named '{id}'")]
    DuplicateId { path: String, id: String },

    /// A local id failed its preconditions. Reported under the `DuplicateId`
    /// kind: both are construction-time identity violations.
    #[error("construct id '{id}' under '{path}' is invalid: {reason}")]
    InvalidId {
        path: String,
        id: String,
        reason: String,
    },

    /// One or more validations produced messages. All messages are collected
    /// before aborting so users see every problem at once.
    #[error("validation failed with {} error(s):\n  {}", .messages.len(), .messages.join("\n  "))]
    ValidationFailed { messages: Vec<String> },

    /// A stack dependency edge would close a cycle.
    #[error("dependency of stack '{from}' on '{to}' would create a cycle")]
    CircularDependency { from: String, to: String },

    /// A lazy producer chain never settled on a concrete value.
    #[error("unresolved token at '{path}': {reason}")]
    UnresolvedToken { path: String, reason: String },

    /// Cross-stack references cannot be served by a cloud backend that
    /// selects its workspaces by tag.
    #[error("stack '{stack}' uses a cloud backend with tagged workspaces, which cannot serve cross-stack references")]
    UnsupportedCrossStack { stack: String },

    /// Writing a synthesized file failed.
    #[error("failed to write '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SynthError {
    /// Stable kind tag, surfaced to drivers alongside the exit code.
    pub fn kind(&self) -> &'static str {
        match self {
            SynthError::DuplicateId { .. } | SynthError::InvalidId { .. } => "DuplicateId",
            SynthError::ValidationFailed { .. } => "ValidationFailed",
            SynthError::CircularDependency { .. } => "CircularDependency",
            SynthError::UnresolvedToken { .. } => "UnresolvedToken",
            SynthError::UnsupportedCrossStack { .. } => "UnsupportedCrossStack",
            SynthError::Io { .. } => "IOError",
        }
    }

    /// Driver exit code: 2 for validation failures, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            SynthError::ValidationFailed { .. } => 2,
            _ => 1,
        }
    }
}
