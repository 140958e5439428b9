//! Version lineage of one collection
//!
//! A lineage is the append-only sequence of versions sharing one
//! `collection_id`. Exactly one version is the head; every other version is
//! a historical snapshot that stays addressable by its uuid and is never
//! changed or removed.
//!
//! ## Transitions
//!
//! ```text
//! v1 ── commit ──▶ v2 ── commit ──▶ v3 ── restore(v1) ──▶ v4 (manifest of v1)
//!                                                          ▲ head
//! ```
//!
//! - **commit** is only accepted when based on the current head; otherwise
//!   it fails with [`ColmanError::StaleVersion`] and nothing changes.
//! - **restore** copies a version's manifest, name and properties into a
//!   new head. It never moves the head pointer back to an old uuid.
//!
//! ## Examples
//!
//! ```rust
//! use colman::lineage::Lineage;
//! use colman::version::VersionMetadata;
//!
//! let text = ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo 0:3:bar\n";
//! let mut lineage = Lineage::create(text.to_string(), VersionMetadata::named("c"))?;
//! let v1 = lineage.head()?.uuid.clone();
//!
//! let v2 = lineage.commit(
//!     &v1,
//!     ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo\n".to_string(),
//!     VersionMetadata::named("c"),
//! )?;
//! assert_eq!(v2.version, 2);
//! assert!(lineage.commit(&v1, text.to_string(), VersionMetadata::named("c")).is_err());
//! # Ok::<(), colman::ColmanError>(())
//! ```

use crate::error::{ColmanError, Result};
use crate::service::CommitRequest;
use crate::types::VersionSummary;
use crate::utils::short_id;
use crate::version::{CollectionVersion, VersionMetadata};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// All versions of one collection, ascending by version number
///
/// # Thread Safety
///
/// Lineage is not thread-safe. The store serializes commits with a lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    /// Stable identifier shared by every version
    pub collection_id: String,
    /// uuid of the head version
    pub current_version_uuid: String,
    /// Versions, ascending
    pub versions: Vec<CollectionVersion>,
}

impl Lineage {
    /// Start a new lineage with `manifest_text` as version 1
    pub fn create(manifest_text: String, metadata: VersionMetadata) -> Result<Self> {
        let collection_id = uuid::Uuid::new_v4().to_string();
        let first = CollectionVersion::new(collection_id.clone(), 1, manifest_text, metadata)?;
        info!(
            "Created collection {} ({} files, {} bytes)",
            short_id(&collection_id),
            first.file_count,
            first.total_size_bytes
        );
        Ok(Self {
            collection_id,
            current_version_uuid: first.uuid.clone(),
            versions: vec![first],
        })
    }

    /// The head version
    pub fn head(&self) -> Result<&CollectionVersion> {
        self.get(&self.current_version_uuid).ok_or_else(|| {
            ColmanError::internal(format!(
                "lineage {} has no head version {}",
                self.collection_id, self.current_version_uuid
            ))
        })
    }

    /// Look up a version by uuid
    pub fn get(&self, uuid: &str) -> Option<&CollectionVersion> {
        self.versions.iter().find(|v| v.uuid == uuid)
    }

    /// Look up a version by number
    pub fn by_number(&self, version: u64) -> Option<&CollectionVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.get(uuid).is_some()
    }

    /// Whether `uuid` is the head
    pub fn is_head(&self, uuid: &str) -> bool {
        self.current_version_uuid == uuid
    }

    /// Every version, ascending
    pub fn history(&self) -> &[CollectionVersion] {
        &self.versions
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Append a new head built from `manifest_text` and `metadata`
    ///
    /// # Errors
    ///
    /// - [`ColmanError::VersionNotFound`] if `based_on` is not in this lineage
    /// - [`ColmanError::StaleVersion`] if `based_on` is no longer the head
    /// - [`ColmanError::Parse`] if the manifest is malformed
    ///
    /// On error the lineage is unchanged.
    pub fn commit(
        &mut self,
        based_on: &str,
        manifest_text: String,
        metadata: VersionMetadata,
    ) -> Result<CollectionVersion> {
        if !self.contains(based_on) {
            return Err(ColmanError::VersionNotFound(based_on.to_string()));
        }
        if !self.is_head(based_on) {
            warn!(
                "Rejected commit to {} based on stale version {}",
                short_id(&self.collection_id),
                based_on
            );
            return Err(ColmanError::StaleVersion {
                based_on: based_on.to_string(),
                head: self.current_version_uuid.clone(),
            });
        }

        let number = self.head()?.version + 1;
        let next = CollectionVersion::new(self.collection_id.clone(), number, manifest_text, metadata)?;

        for version in &mut self.versions {
            version.current_version_uuid = next.uuid.clone();
        }
        self.current_version_uuid = next.uuid.clone();
        self.versions.push(next.clone());

        info!(
            "Committed version {} of {} ({} files, {} bytes)",
            next.version,
            short_id(&self.collection_id),
            next.file_count,
            next.total_size_bytes
        );
        Ok(next)
    }

    /// Make a copy of version `target_uuid` the new head
    ///
    /// Restoring the head itself is allowed and also appends a version.
    pub fn restore(&mut self, target_uuid: &str) -> Result<CollectionVersion> {
        let request = self.restore_request(target_uuid)?;
        let metadata = request.metadata();
        self.commit(&request.based_on, request.manifest_text, metadata)
    }

    /// Commit that restores version `target_uuid` on top of the current head
    ///
    /// The request carries the target's manifest, name and properties.
    pub fn restore_request(&self, target_uuid: &str) -> Result<CommitRequest> {
        let target = self
            .get(target_uuid)
            .ok_or_else(|| ColmanError::VersionNotFound(target_uuid.to_string()))?;
        debug!("Restoring version {} ({})", target.version, target_uuid);
        Ok(CommitRequest {
            based_on: self.current_version_uuid.clone(),
            manifest_text: target.manifest_text.clone(),
            name: target.name.clone(),
            properties: target.properties.clone(),
        })
    }

    /// Version browser rows, ascending
    pub fn summaries(&self) -> Vec<VersionSummary> {
        self.versions.iter().map(CollectionVersion::summary).collect()
    }

    /// Get statistics about the lineage
    pub fn stats(&self) -> LineageStats {
        LineageStats {
            total_versions: self.versions.len(),
            head_version: self.head().map(|h| h.version).unwrap_or_default(),
            head_size_bytes: self.head().map(|h| h.total_size_bytes).unwrap_or_default(),
            manifest_bytes: self.versions.iter().map(|v| v.manifest_text.len() as u64).sum(),
        }
    }

    /// Render the history newest first, marking the head with `*`
    pub fn format_history(&self) -> String {
        let mut result = String::new();
        for (i, version) in self.versions.iter().rev().enumerate() {
            let connector = if i + 1 == self.versions.len() { "└── " } else { "├── " };
            let marker = if version.is_head() { "* " } else { "" };
            result.push_str(connector);
            result.push_str(marker);
            result.push_str(&version.display_format());
            result.push('\n');
        }
        result
    }
}

/// Statistics about a lineage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageStats {
    pub total_versions: usize,
    pub head_version: u64,
    pub head_size_bytes: u64,
    /// Sum of manifest text sizes across all versions
    pub manifest_bytes: u64,
}
