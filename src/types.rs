//! Core data types used throughout the colman library
//!
//! ## Overview
//!
//! - **Configuration**: `EngineConfig` and the persisted `StoreMetadata`
//! - **Edits**: `EditOp`, the structural edits a session can apply
//! - **Display**: `VersionSummary`, one row of the version browser
//!
//! ## Examples
//!
//! ```rust
//! use colman::types::{EditOp, EngineConfig};
//!
//! let config = EngineConfig {
//!     undo_depth: 8,
//!     ..Default::default()
//! };
//! assert!(!config.strict_names_on_load);
//!
//! let op = EditOp::Rename {
//!     path: "bar".to_string(),
//!     new_name: "subdir/foo".to_string(),
//! };
//! assert_eq!(op.to_string(), "rename bar -> subdir/foo");
//! ```

use crate::locator::Segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of edits a session can undo
pub const DEFAULT_UNDO_DEPTH: usize = 32;

/// Current on-disk store format
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum undo entries per session (0 disables undo)
    pub undo_depth: usize,
    /// Reject names with leading/trailing whitespace when loading manifests
    pub strict_names_on_load: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_depth: DEFAULT_UNDO_DEPTH,
            strict_names_on_load: false,
        }
    }
}

/// Metadata persisted in the store root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Version of the store format
    pub format_version: u32,
    /// colman version that created the store
    pub colman_version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last accessed timestamp
    pub last_accessed: DateTime<Utc>,
}

impl StoreMetadata {
    /// Metadata for a store created now
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            format_version: STORE_FORMAT_VERSION,
            colman_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: now,
            last_accessed: now,
        }
    }
}

impl Default for StoreMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A structural edit to a collection tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    /// Rename, with `new_name` taken as a path from the collection root
    Rename {
        /// Node to rename
        path: String,
        /// Destination name or path
        new_name: String,
    },
    /// Rename within the current parent directory
    RenameInPlace {
        /// Node to rename
        path: String,
        /// New name
        new_name: String,
    },
    /// Move a file or directory subtree
    Move {
        /// Node to move
        from: String,
        /// Destination path
        to: String,
    },
    /// Remove a file or directory subtree
    Remove {
        /// Node to remove
        path: String,
    },
    /// Remove every selected node
    RemoveSelected,
    /// Create an empty directory
    AddDirectory {
        /// Directory path
        path: String,
    },
    /// Add a file made of existing block segments
    AddFile {
        /// File path
        path: String,
        /// File content
        segments: Vec<Segment>,
    },
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOp::Rename { path, new_name } => write!(f, "rename {} -> {}", path, new_name),
            EditOp::RenameInPlace { path, new_name } => {
                write!(f, "rename {} in place -> {}", path, new_name)
            }
            EditOp::Move { from, to } => write!(f, "move {} -> {}", from, to),
            EditOp::Remove { path } => write!(f, "remove {}", path),
            EditOp::RemoveSelected => write!(f, "remove selected"),
            EditOp::AddDirectory { path } => write!(f, "mkdir {}", path),
            EditOp::AddFile { path, segments } => {
                write!(f, "add {} ({} segments)", path, segments.len())
            }
        }
    }
}

/// One row of the version browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// Version number, starting at 1
    pub version: u64,
    /// Version uuid
    pub uuid: String,
    /// Collection name at this version
    pub name: String,
    /// Number of files
    pub file_count: usize,
    /// Total size in bytes
    pub total_size_bytes: u64,
    /// When the version was last modified
    pub modified_at: DateTime<Utc>,
    /// Whether this is the head of its lineage
    pub is_head: bool,
}
