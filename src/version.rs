//! Collection versions
//!
//! A [`CollectionVersion`] is one snapshot in a lineage: a manifest plus the
//! collection's name and properties at that point. Content fields never
//! change once the version exists; the only field that moves is
//! `current_version_uuid`, which every version of a lineage carries and
//! which always names the lineage head.
//!
//! ## Integrity
//!
//! Each version caches values derived from its manifest when it is created:
//!
//! 1. `file_count` and `total_size_bytes` for the version browser
//! 2. `content_hash`, the SHA-256 of the manifest text
//!
//! [`CollectionVersion::verify_integrity`] re-derives all three.
//!
//! ## Examples
//!
//! ```rust
//! use colman::version::{CollectionVersion, VersionMetadata};
//!
//! let version = CollectionVersion::new(
//!     "lineage-1",
//!     1,
//!     ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo 0:3:bar\n".to_string(),
//!     VersionMetadata::named("photos"),
//! )
//! .unwrap();
//!
//! assert!(version.is_head());
//! assert_eq!(version.total_size_bytes, 6);
//! assert!(version.verify_integrity().unwrap());
//! ```

use crate::error::Result;
use crate::parser::ManifestStats;
use crate::types::VersionSummary;
use crate::utils::{format_bytes, hash_data, short_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Opaque collection properties, passed through unchanged
pub type Properties = BTreeMap<String, Value>;

/// Name and properties of a collection at one version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// Collection name
    pub name: String,
    /// Opaque key/value properties
    #[serde(default)]
    pub properties: Properties,
}

impl VersionMetadata {
    /// Metadata with a name and no properties
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Properties::new(),
        }
    }

    /// Add a property
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// One version of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionVersion {
    /// Unique identifier of this version
    pub uuid: String,
    /// Stable identifier of the lineage
    pub collection_id: String,
    /// uuid of the lineage head
    pub current_version_uuid: String,
    /// Version number, contiguous from 1
    pub version: u64,
    /// Collection name
    pub name: String,
    /// Opaque key/value properties
    #[serde(default)]
    pub properties: Properties,
    /// Manifest text
    pub manifest_text: String,
    /// Number of files in the manifest
    pub file_count: usize,
    /// Sum of file sizes in the manifest
    pub total_size_bytes: u64,
    /// SHA-256 of `manifest_text`
    pub content_hash: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub modified_at: DateTime<Utc>,
}

impl CollectionVersion {
    /// Create a version that is the head of its lineage
    ///
    /// The manifest is parsed once to cache its stats, so a malformed
    /// manifest is rejected here with a parse error.
    pub fn new(
        collection_id: impl Into<String>,
        version: u64,
        manifest_text: String,
        metadata: VersionMetadata,
    ) -> Result<Self> {
        let stats = ManifestStats::from_text(&manifest_text)?;
        let uuid = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        Ok(Self {
            current_version_uuid: uuid.clone(),
            uuid,
            collection_id: collection_id.into(),
            version,
            name: metadata.name,
            properties: metadata.properties,
            content_hash: hash_data(manifest_text.as_bytes()),
            manifest_text,
            file_count: stats.file_count,
            total_size_bytes: stats.total_size_bytes,
            created_at: now,
            modified_at: now,
        })
    }

    /// Whether this version is its lineage's head
    pub fn is_head(&self) -> bool {
        self.uuid == self.current_version_uuid
    }

    /// Name and properties of this version
    pub fn metadata(&self) -> VersionMetadata {
        VersionMetadata {
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }

    /// Cached manifest stats
    pub fn stats(&self) -> ManifestStats {
        ManifestStats {
            file_count: self.file_count,
            total_size_bytes: self.total_size_bytes,
        }
    }

    /// Check the cached stats and hash against the manifest text
    ///
    /// Returns `Ok(false)` on a mismatch and an error if the stored
    /// manifest no longer parses.
    pub fn verify_integrity(&self) -> Result<bool> {
        if hash_data(self.manifest_text.as_bytes()) != self.content_hash {
            return Ok(false);
        }
        Ok(ManifestStats::from_text(&self.manifest_text)? == self.stats())
    }

    /// Short uuid for display
    pub fn short_id(&self) -> &str {
        short_id(&self.uuid)
    }

    /// Version browser row
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            version: self.version,
            uuid: self.uuid.clone(),
            name: self.name.clone(),
            file_count: self.file_count,
            total_size_bytes: self.total_size_bytes,
            modified_at: self.modified_at,
            is_head: self.is_head(),
        }
    }

    /// Format the version for display
    pub fn display_format(&self) -> String {
        format!(
            "[v{} {}] {} - {} files, {}{}",
            self.version,
            self.short_id(),
            self.modified_at.format("%Y-%m-%d %H:%M:%S"),
            self.file_count,
            format_bytes(self.total_size_bytes),
            if self.is_head() { "" } else { " (old version)" }
        )
    }
}
