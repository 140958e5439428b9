//! Host boundary for fetching and committing collection versions
//!
//! The engine never persists anything itself. It reads versions and submits
//! new manifests through a [`CollectionService`], the same shape as a
//! collection REST API:
//!
//! | Operation | Host equivalent |
//! |---|---|
//! | [`fetch`](CollectionService::fetch) | `GET /collections/{uuid}` |
//! | [`list_versions`](CollectionService::list_versions) | list with `include_old_versions=true` |
//! | [`create`](CollectionService::create) | `POST /collections` |
//! | [`commit`](CollectionService::commit) | `PUT /collections/{uuid}` |
//!
//! Any `Err` from `commit` means the commit did not happen; implementations
//! must not leave a partial version behind.

use crate::error::Result;
use crate::version::{CollectionVersion, Properties, VersionMetadata};
use serde::{Deserialize, Serialize};

/// Request to start a new collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub manifest_text: String,
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
}

impl CreateRequest {
    pub fn new(manifest_text: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            manifest_text: manifest_text.into(),
            name: name.into(),
            properties: Properties::new(),
        }
    }

    pub(crate) fn metadata(&self) -> VersionMetadata {
        VersionMetadata {
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// Request to append a version to a lineage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRequest {
    /// uuid of the version the edit started from; must still be the head
    pub based_on: String,
    pub manifest_text: String,
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
}

impl CommitRequest {
    pub(crate) fn metadata(&self) -> VersionMetadata {
        VersionMetadata {
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// Persistence collaborator for collection versions
pub trait CollectionService: Send + Sync {
    /// Fetch any version, head or historical
    fn fetch(&self, uuid: &str) -> Result<CollectionVersion>;

    /// Every version of the lineage `uuid` belongs to, ascending
    fn list_versions(&self, uuid: &str) -> Result<Vec<CollectionVersion>>;

    /// Start a new lineage; returns version 1
    fn create(&self, request: CreateRequest) -> Result<CollectionVersion>;

    /// Append a new head
    ///
    /// Fails with `StaleVersion` if `request.based_on` is not the head.
    fn commit(&self, request: CommitRequest) -> Result<CollectionVersion>;
}
