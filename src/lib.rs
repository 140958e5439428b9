//! # Colman - Versioned collection manifests as editable file trees
//!
//! A library for browsing and editing data collections whose contents are
//! described by a text manifest, while keeping a linear, append-only
//! history of every version.
//!
//! ## Overview
//!
//! A collection is a list of content-addressed blocks and, for each file,
//! the byte ranges of those blocks that make it up. Colman lets you:
//! - Parse a manifest into an in-memory file tree
//! - Rename, move and remove files and directories without touching data
//! - Serialize the edited tree back into canonical manifest text
//! - Commit edits as a new version, with stale-version detection
//! - Browse old versions read-only and restore any of them as a new head
//! - Diff two versions and verify a whole lineage
//!
//! ## Architecture
//!
//! - **Tree engine**: [`parser`], [`tree`] and [`serializer`] are pure and
//!   never perform I/O. Edits return a new tree, so a failed edit can never
//!   leave a half-applied state behind.
//! - **Lineage**: [`lineage`] holds the versions of one collection. Exactly
//!   one version is the head and only the head accepts commits.
//! - **Service boundary**: [`service::CollectionService`] is where versions
//!   are fetched and committed. [`storage::LocalStore`] is a JSON-on-disk
//!   implementation used by the CLI and the tests.
//! - **Sessions**: [`EditSession`] is a version opened for editing, with a
//!   selection and undo.
//!
//! ## Quick Start
//!
//! ```rust
//! use colman::Colman;
//! use tempfile::TempDir;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = TempDir::new()?;
//! let colman = Colman::init(dir.path().join("store"))?;
//!
//! let v1 = colman.create(
//!     ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo 0:3:bar\n",
//!     "my collection",
//! )?;
//!
//! let mut session = colman.open(&v1.uuid)?;
//! session.rename("bar", "subdir/baz")?;
//! session.remove("foo")?;
//! let v2 = session.commit()?;
//! assert_eq!(v2.manifest_text, "./subdir 37b51d194a7513e45b56f6524f2d51f2+3 0:3:baz\n");
//!
//! // Old versions stay browsable but cannot be edited
//! let old = colman.open(&v1.uuid)?;
//! assert!(old.is_read_only());
//! # Ok(())
//! # }
//! ```
//!
//! ## Working with trees directly
//!
//! ```rust
//! use colman::{parse, serialize};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tree = parse(". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo\n")?;
//! let tree = tree.move_path("foo", "a/b/foo")?;
//! assert_eq!(serialize(&tree), "./a/b 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All engine operations return `Result<T, ColmanError>`. Tree edits fail
//! with [`EditError`], manifest problems with [`ParseError`] (carrying the
//! 1-based line number) and name problems with [`NameError`].
//!
//! ## Module Organization
//!
//! - [`path`], [`escape`], [`locator`]: manifest building blocks
//! - [`parser`], [`tree`], [`serializer`]: the tree engine
//! - [`selection`], [`diff`]: working with trees
//! - [`version`], [`lineage`], [`verification`]: history
//! - [`service`], [`storage`]: persistence
//! - [`session`], [`colman`]: the engine facade
//! - [`types`]: configuration and shared data types
//! - [`error`]: error types

// Tree engine
pub mod escape;
pub mod locator;
pub mod parser;
pub mod path;
pub mod serializer;
pub mod tree;

// Working with trees
pub mod diff;
pub mod selection;

// History and persistence
pub mod lineage;
pub mod service;
pub mod storage;
pub mod verification;
pub mod version;

// Engine
pub mod colman;
pub mod error;
pub mod session;
pub mod types;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use colman::{Colman, ColmanBuilder};
pub use diff::{diff_trees, ChangeStats, TreeDiff};
pub use error::{ColmanError, EditError, NameError, ParseError, Result};
pub use lineage::Lineage;
pub use locator::{BlockLocator, Segment};
pub use parser::{parse, ManifestParser, ManifestStats};
pub use selection::Selection;
pub use serializer::serialize;
pub use service::{CollectionService, CommitRequest, CreateRequest};
pub use session::EditSession;
pub use storage::LocalStore;
pub use tree::{Directory, FileNode, TreeNode, VirtualFileTree};
pub use types::*;
pub use utils::format_bytes;
pub use verification::{LineageVerificationReport, LineageVerifier};
pub use version::{CollectionVersion, Properties, VersionMetadata};
