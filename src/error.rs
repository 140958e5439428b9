//! Error types for the colman library
//!
//! This module defines the error taxonomy used across the engine. Errors are
//! split by how a caller is expected to react to them:
//!
//! - [`NameError`]: an illegal file or directory name. Recoverable; shown
//!   inline where the name was typed so the user can correct it.
//! - [`ParseError`]: malformed manifest text. Fatal for that load attempt.
//! - [`EditError`]: a tree mutation could not be applied. Recoverable; the
//!   tree is left unchanged.
//! - [`ColmanError`]: the umbrella type returned by everything that touches
//!   versions, sessions or storage. It wraps the three above and adds the
//!   lineage and persistence failures (`StaleVersion`, `CommitInProgress`, ...).

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the colman library
pub type Result<T> = std::result::Result<T, ColmanError>;

/// Name legality failures, one per validation rule
///
/// The display strings are the messages surfaced to the user verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameError {
    /// The name is empty
    #[error("This field is required")]
    Required,

    /// The name is exactly `.` or `..`
    #[error("Name cannot be '.' or '..'")]
    ReservedName,

    /// The name starts or ends with ASCII whitespace
    #[error("Leading/trailing whitespaces not allowed")]
    Whitespace,

    /// A path contains an empty segment (e.g. `//foo` or `foo/`)
    #[error("Empty dir name not allowed")]
    EmptySegment,
}

/// Manifest text could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Line `line` (1-based) is malformed
    #[error("Malformed manifest at line {line}: {reason}")]
    Malformed {
        /// 1-based line number of the offending stream
        line: usize,
        /// Diagnostic detail
        reason: String,
    },
}

impl ParseError {
    /// Create a malformed-line error
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            line,
            reason: reason.into(),
        }
    }

    /// Line number the error refers to
    pub fn line(&self) -> usize {
        match self {
            ParseError::Malformed { line, .. } => *line,
        }
    }
}

/// A tree mutation was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// Source path does not exist
    #[error("No such file or directory: {0}")]
    NotFound(String),

    /// Target path is already occupied
    #[error("Name conflict: {0} already exists")]
    NameConflict(String),

    /// The requested name is illegal
    #[error("{0}")]
    InvalidName(#[from] NameError),

    /// A directory cannot be moved into its own subtree
    #[error("Cannot move {from} into itself ({to})")]
    InvalidMove {
        /// Source path
        from: String,
        /// Requested target path
        to: String,
    },

    /// The collection root cannot be renamed, moved or removed
    #[error("The collection root cannot be modified this way")]
    RootImmutable,
}

/// Main error type for all colman operations
#[derive(Debug, Error)]
pub enum ColmanError {
    /// Illegal name
    #[error("Invalid name: {0}")]
    Name(#[from] NameError),

    /// Manifest could not be loaded
    #[error("Cannot load collection: {0}")]
    Parse(#[from] ParseError),

    /// Tree mutation failed
    #[error("Edit failed: {0}")]
    Edit(#[from] EditError),

    /// Commit was based on a version that is no longer the head
    #[error("Stale version: edit was based on {based_on} but the head is now {head}")]
    StaleVersion {
        /// Version uuid the commit was based on
        based_on: String,
        /// Current head uuid
        head: String,
    },

    /// Version uuid is unknown
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    /// Collection (lineage) is unknown
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Edit attempted against a historical snapshot
    #[error("Version {0} is an old version and is read-only")]
    ReadOnlyVersion(String),

    /// Another commit for the same collection is still outstanding
    #[error("A commit for collection {0} is already in progress")]
    CommitInProgress(String),

    /// The host refused the commit
    #[error("Commit rejected: {0}")]
    CommitRejected(String),

    /// Store is not initialized
    #[error("Store not initialized at path: {0:?}")]
    StoreNotInitialized(PathBuf),

    /// Store already exists
    #[error("Store already exists at path: {0:?}")]
    StoreAlreadyExists(PathBuf),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O errors during store operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ColmanError {
    /// Create a commit-rejected error with a custom message
    pub fn rejected(msg: impl Into<String>) -> Self {
        ColmanError::CommitRejected(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        ColmanError::Internal(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave every persisted version untouched; the
    /// caller can correct its input, reload, or retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ColmanError::Name(_)
                | ColmanError::Edit(_)
                | ColmanError::StaleVersion { .. }
                | ColmanError::CommitInProgress(_)
                | ColmanError::CommitRejected(_)
                | ColmanError::ReadOnlyVersion(_)
        )
    }

    /// Check if this is an optimistic-concurrency conflict
    pub fn is_stale(&self) -> bool {
        matches!(self, ColmanError::StaleVersion { .. })
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            ColmanError::Name(e) | ColmanError::Edit(EditError::InvalidName(e)) => e.to_string(),
            ColmanError::StaleVersion { .. } => {
                "The collection was modified elsewhere. Reload the head version and apply your edit again.".to_string()
            }
            ColmanError::ReadOnlyVersion(uuid) => {
                format!("Version {} is an old version. Restore it to make changes.", uuid)
            }
            ColmanError::CommitInProgress(_) => {
                "Another change to this collection is still being saved. Try again when it finishes.".to_string()
            }
            ColmanError::StoreNotInitialized(path) => {
                format!("Store not initialized at {:?}. Run 'colman init' first.", path)
            }
            _ => self.to_string(),
        }
    }
}
