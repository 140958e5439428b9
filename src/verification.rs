//! Lineage verification and integrity checking
//!
//! Verification works at two levels:
//!
//! 1. **Version level**: the stored manifest still parses, and the cached
//!    `file_count`, `total_size_bytes` and `content_hash` match a fresh
//!    computation from it.
//! 2. **Lineage level**: version numbers run contiguously from 1, exactly
//!    one version is the head, and every version agrees on the head pointer
//!    and the collection id.
//!
//! Version checks are independent of each other and run in parallel.
//!
//! ## Usage
//!
//! ```rust
//! use colman::lineage::Lineage;
//! use colman::verification::LineageVerifier;
//! use colman::version::VersionMetadata;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let lineage = Lineage::create(
//!     ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo\n".to_string(),
//!     VersionMetadata::named("c"),
//! )?;
//! let report = LineageVerifier::new().verify(&lineage);
//! assert!(report.is_valid(), "{}", report.summary());
//! # Ok(())
//! # }
//! ```

use crate::lineage::Lineage;
use crate::parser::{self, ManifestStats};
use crate::utils::{hash_data, short_id};
use crate::version::CollectionVersion;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Verifies versions and lineages
#[derive(Debug, Clone, Default)]
pub struct LineageVerifier {
    strict_names: bool,
}

impl LineageVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse stored manifests with strict name rules
    pub fn strict_names(mut self, strict: bool) -> Self {
        self.strict_names = strict;
        self
    }

    /// Check one version against its own manifest
    pub fn verify_version(&self, version: &CollectionVersion) -> VersionVerification {
        let mut check = VersionVerification {
            uuid: version.uuid.clone(),
            version: version.version,
            manifest_parses: false,
            stats_match: false,
            content_hash_valid: false,
            distinct_blocks: 0,
            errors: Vec::new(),
        };

        let computed_hash = hash_data(version.manifest_text.as_bytes());
        check.content_hash_valid = computed_hash == version.content_hash;
        if !check.content_hash_valid {
            check.errors.push(format!(
                "Content hash mismatch: expected {}, got {}",
                version.content_hash, computed_hash
            ));
        }

        let tree = match parser::ManifestParser::new()
            .strict_names(self.strict_names)
            .parse(&version.manifest_text)
        {
            Ok(tree) => tree,
            Err(e) => {
                check.errors.push(format!("Manifest does not parse: {}", e));
                return check;
            }
        };
        check.manifest_parses = true;

        let stats = ManifestStats::of(&tree);
        check.stats_match = stats == version.stats();
        if !check.stats_match {
            check.errors.push(format!(
                "Cached stats {} files / {} bytes, manifest has {} files / {} bytes",
                version.file_count, version.total_size_bytes, stats.file_count, stats.total_size_bytes
            ));
        }

        if let Ok(blocks) = parser::block_locators(&version.manifest_text) {
            check.distinct_blocks = blocks
                .iter()
                .map(|b| b.hash.as_str())
                .collect::<HashSet<_>>()
                .len();
        }

        check
    }

    /// Check every version and the lineage invariants
    pub fn verify(&self, lineage: &Lineage) -> LineageVerificationReport {
        let start = Instant::now();
        debug!(
            "Verifying {} versions of {}",
            lineage.len(),
            short_id(&lineage.collection_id)
        );

        let version_reports: Vec<VersionVerification> = lineage
            .history()
            .par_iter()
            .map(|version| self.verify_version(version))
            .collect();

        let mut report = LineageVerificationReport {
            collection_id: lineage.collection_id.clone(),
            total_versions: lineage.len(),
            valid_versions: version_reports.iter().filter(|r| r.is_valid()).count(),
            numbering_contiguous: true,
            single_head: true,
            pointers_consistent: true,
            version_reports,
            errors: Vec::new(),
            verification_time_ms: 0,
        };

        if lineage.is_empty() {
            report.errors.push("Lineage has no versions".to_string());
        }

        for (idx, version) in lineage.history().iter().enumerate() {
            let expected = idx as u64 + 1;
            if version.version != expected {
                report.numbering_contiguous = false;
                report.errors.push(format!(
                    "Version at position {} is numbered {}",
                    expected, version.version
                ));
            }
            if version.collection_id != lineage.collection_id
                || version.current_version_uuid != lineage.current_version_uuid
            {
                report.pointers_consistent = false;
                report.errors.push(format!(
                    "Version {} disagrees with its lineage on collection id or head",
                    version.version
                ));
            }
        }

        let heads = lineage.history().iter().filter(|v| v.is_head()).count();
        if heads != 1 || lineage.head().is_err() {
            report.single_head = false;
            report.errors.push(format!("Expected exactly one head, found {}", heads));
        }

        report.verification_time_ms = start.elapsed().as_millis() as u64;
        if report.is_valid() {
            info!(
                "Verified {} in {}ms: {}/{} versions valid",
                short_id(&report.collection_id),
                report.verification_time_ms,
                report.valid_versions,
                report.total_versions
            );
        } else {
            warn!("Verification of {} failed: {}", short_id(&report.collection_id), report.summary());
        }
        report
    }
}

/// Result of checking one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVerification {
    pub uuid: String,
    pub version: u64,
    pub manifest_parses: bool,
    pub stats_match: bool,
    pub content_hash_valid: bool,
    /// Number of distinct blocks the manifest references
    pub distinct_blocks: usize,
    pub errors: Vec<String>,
}

impl VersionVerification {
    pub fn is_valid(&self) -> bool {
        self.manifest_parses && self.stats_match && self.content_hash_valid
    }
}

/// Result of checking a whole lineage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageVerificationReport {
    pub collection_id: String,
    pub total_versions: usize,
    pub valid_versions: usize,
    /// Version numbers are 1, 2, 3, ... in order
    pub numbering_contiguous: bool,
    /// Exactly one version is the head
    pub single_head: bool,
    /// Every version names the same collection and head
    pub pointers_consistent: bool,
    pub version_reports: Vec<VersionVerification>,
    /// Lineage-level problems
    pub errors: Vec<String>,
    pub verification_time_ms: u64,
}

impl LineageVerificationReport {
    pub fn is_valid(&self) -> bool {
        self.valid_versions == self.total_versions
            && self.numbering_contiguous
            && self.single_head
            && self.pointers_consistent
            && self.errors.is_empty()
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return format!(
                "Collection {} is valid ({} versions verified in {}ms)",
                short_id(&self.collection_id),
                self.total_versions,
                self.verification_time_ms
            );
        }

        let mut issues: Vec<String> = Vec::new();
        let invalid = self.total_versions - self.valid_versions;
        if invalid > 0 {
            issues.push(format!("{} invalid versions", invalid));
        }
        if !self.numbering_contiguous {
            issues.push("gaps in version numbers".to_string());
        }
        if !self.single_head {
            issues.push("head is ambiguous".to_string());
        }
        if !self.pointers_consistent {
            issues.push("inconsistent head pointers".to_string());
        }
        if issues.is_empty() {
            issues.push(format!("{} errors", self.errors.len()));
        }
        format!(
            "Collection {} has issues: {}",
            short_id(&self.collection_id),
            issues.join(", ")
        )
    }

    /// Every error message, lineage-level first
    pub fn all_errors(&self) -> Vec<String> {
        let mut out = self.errors.clone();
        for report in &self.version_reports {
            out.extend(report.errors.iter().map(|e| format!("v{}: {}", report.version, e)));
        }
        out
    }
}
