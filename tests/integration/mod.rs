//! Integration tests for colman
//!
//! Tests realistic editing sessions against a local store: the rename
//! chain, move-then-expand, the versioning walk-through, stale commits and
//! large generated manifests.

use ::colman::*;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::info;

/// Test harness for collection editing scenarios
pub struct ColmanTestHarness {
    pub store_dir: TempDir,
    pub colman: Colman,
    pub operation_log: Vec<TestOperation>,
}

#[derive(Debug, Clone)]
pub enum TestOperation {
    Create { uuid: String, name: String },
    Edit { op: EditOp },
    Commit { uuid: String, version: u64 },
    Restore { from: String, uuid: String },
}

impl ColmanTestHarness {
    /// Create a harness over a fresh store
    pub fn new() -> Self {
        let store_dir = TempDir::new().unwrap();
        let colman = ColmanBuilder::new()
            .undo_depth(16)
            .build_local(store_dir.path().join("store"))
            .unwrap();

        Self {
            store_dir,
            colman,
            operation_log: Vec::new(),
        }
    }

    /// Create a collection and log it
    pub fn create(&mut self, manifest_text: &str, name: &str) -> anyhow::Result<CollectionVersion> {
        let version = self.colman.create(manifest_text, name)?;
        self.operation_log.push(TestOperation::Create {
            uuid: version.uuid.clone(),
            name: name.to_string(),
        });
        Ok(version)
    }

    /// Open the head of `uuid`, apply `ops` and commit
    pub fn edit_and_commit(&mut self, uuid: &str, ops: Vec<EditOp>) -> anyhow::Result<CollectionVersion> {
        let mut session = self.colman.open(uuid)?;
        for op in ops {
            session.apply(op.clone())?;
            self.operation_log.push(TestOperation::Edit { op });
        }
        let version = session.commit()?;
        self.operation_log.push(TestOperation::Commit {
            uuid: version.uuid.clone(),
            version: version.version,
        });
        Ok(version)
    }

    /// Restore `uuid` and log it
    pub fn restore(&mut self, uuid: &str) -> anyhow::Result<CollectionVersion> {
        let version = self.colman.restore(uuid)?;
        self.operation_log.push(TestOperation::Restore {
            from: uuid.to_string(),
            uuid: version.uuid.clone(),
        });
        Ok(version)
    }

    /// Verify the lineage of `uuid`, panicking with every error on failure
    pub fn assert_valid(&self, uuid: &str) {
        let report = self.colman.verify(uuid).unwrap();
        assert!(report.is_valid(), "{:?}", report.all_errors());
    }
}

impl Default for ColmanTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic generator of large manifests
pub struct ManifestGenerator {
    seed: u64,
}

impl ManifestGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Locator of a synthetic block; the hash is derived from the seed
    pub fn locator(&self, index: u64, size: u64) -> String {
        let digest = Sha256::digest(format!("{}:{}", self.seed, index).as_bytes());
        format!("{}+{}", hex::encode(&digest[..16]), size)
    }

    /// One stream per directory, `files_per_dir` files each of `file_size`
    /// bytes, each file in its own block
    pub fn generate(&self, dirs: usize, files_per_dir: usize, file_size: u64) -> String {
        let mut out = String::new();
        let mut block = 0;
        for d in 0..dirs {
            let stream = if d == 0 { ".".to_string() } else { format!("./dir_{:03}", d) };
            let mut locators = Vec::new();
            let mut tokens = Vec::new();
            for f in 0..files_per_dir {
                locators.push(self.locator(block, file_size));
                tokens.push(format!("{}:{}:file\\040{:04}.dat", f as u64 * file_size, file_size, f));
                block += 1;
            }
            out.push_str(&format!("{} {} {}\n", stream, locators.join(" "), tokens.join(" ")));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const TWO_FILES: &str = ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo 0:3:bar\n";
    const BAR: &str = ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:bar\n";

    #[test]
    #[traced_test]
    fn test_rename_chain() {
        let mut harness = ColmanTestHarness::new();
        let v1 = harness.create(BAR, "rename chain").unwrap();

        let names = ["bar", "&", "foo", "&amp;", "I ❤️ ⛵️", "back\\slash", "bar"];
        let mut head = v1;
        for pair in names.windows(2) {
            let (old, new) = (pair[0], pair[1]);
            head = harness
                .edit_and_commit(
                    &head.uuid,
                    vec![EditOp::Rename {
                        path: old.to_string(),
                        new_name: new.to_string(),
                    }],
                )
                .unwrap();

            let tree = parse(&head.manifest_text).unwrap();
            assert!(tree.is_file(new), "{} missing after rename", new);
            assert!(!tree.contains(old), "{} still present after rename", old);
            assert_eq!(head.total_size_bytes, 3);
        }

        assert_eq!(head.version, names.len() as u64);
        assert_eq!(head.manifest_text, BAR);
        harness.assert_valid(&head.uuid);
    }

    #[test]
    #[traced_test]
    fn test_move_then_expand() {
        let mut harness = ColmanTestHarness::new();
        let v1 = harness.create(BAR, "move").unwrap();

        let v2 = harness
            .edit_and_commit(
                &v1.uuid,
                vec![EditOp::Rename {
                    path: "bar".to_string(),
                    new_name: "subdir/foo".to_string(),
                }],
            )
            .unwrap();
        let tree = parse(&v2.manifest_text).unwrap();
        assert!(tree.is_dir("subdir"));
        assert!(tree.is_file("subdir/foo"));
        assert!(!tree.contains("bar"));

        let v3 = harness
            .edit_and_commit(
                &v2.uuid,
                vec![EditOp::Rename {
                    path: "subdir/foo".to_string(),
                    new_name: "baz".to_string(),
                }],
            )
            .unwrap();
        let tree = parse(&v3.manifest_text).unwrap();
        assert!(tree.is_dir("subdir"), "emptied directory must be kept");
        assert!(tree.directory("subdir").unwrap().is_empty());
        assert!(tree.is_file("baz"));
        assert_eq!(
            v3.manifest_text,
            ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:baz\n\
             ./subdir d41d8cd98f00b204e9800998ecf8427e+0 0:0:\\056\n"
        );
    }

    #[test]
    #[traced_test]
    fn test_versioning_walkthrough() {
        let mut harness = ColmanTestHarness::new();
        let v1 = harness.create(TWO_FILES, "versions").unwrap();
        assert_eq!(v1.total_size_bytes, 6);

        let v2 = harness
            .edit_and_commit(&v1.uuid, vec![EditOp::Remove { path: "foo".to_string() }])
            .unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.total_size_bytes, 3);

        let v3 = harness.restore(&v1.uuid).unwrap();
        assert_eq!(v3.version, 3);
        assert_eq!(v3.total_size_bytes, 6);
        assert_ne!(v3.uuid, v1.uuid);
        assert_eq!(v3.current_version_uuid, v3.uuid);

        // Version 1 is still addressable and points at the new head
        let old = harness.colman.fetch(&v1.uuid).unwrap();
        assert_eq!(old.version, 1);
        assert_eq!(old.current_version_uuid, v3.uuid);

        let v4 = harness
            .edit_and_commit(
                &v3.uuid,
                vec![EditOp::AddDirectory { path: "archive".to_string() }],
            )
            .unwrap();
        assert_eq!(v4.version, 4);

        let rows = harness.colman.versions(&v1.uuid).unwrap();
        assert_eq!(
            rows.iter().map(|r| r.total_size_bytes).collect::<Vec<_>>(),
            vec![6, 3, 6, 6]
        );
        assert_eq!(rows.iter().filter(|r| r.is_head).count(), 1);
        harness.assert_valid(&v1.uuid);
    }

    #[test]
    #[traced_test]
    fn test_stale_commit_leaves_head_unchanged() {
        let mut harness = ColmanTestHarness::new();
        let v1 = harness.create(TWO_FILES, "stale").unwrap();
        let mut late = harness.colman.open(&v1.uuid).unwrap();

        let v2 = harness
            .edit_and_commit(&v1.uuid, vec![EditOp::Remove { path: "foo".to_string() }])
            .unwrap();

        late.rename("bar", "renamed").unwrap();
        let err = late.commit().unwrap_err();
        match &err {
            ColmanError::StaleVersion { based_on, head } => {
                assert_eq!(based_on, &v1.uuid);
                assert_eq!(head, &v2.uuid);
            }
            other => panic!("expected StaleVersion, got {}", other),
        }
        assert!(err.is_recoverable());

        let head = harness.colman.head(&v1.uuid).unwrap();
        assert_eq!(head.uuid, v2.uuid);
        assert_eq!(harness.colman.versions(&v1.uuid).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_edits_are_atomic() {
        let mut harness = ColmanTestHarness::new();
        let v1 = harness
            .create(
                ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo\n./dir 37b51d194a7513e45b56f6524f2d51f2+3 0:3:inner\n",
                "atomic",
            )
            .unwrap();
        let mut session = harness.colman.open(&v1.uuid).unwrap();
        let before = session.tree().clone();

        let failures = [
            (EditOp::Rename { path: "foo".into(), new_name: "dir".into() }, "NameConflict"),
            (EditOp::Rename { path: "foo".into(), new_name: "..".into() }, "InvalidName"),
            (EditOp::Rename { path: "foo".into(), new_name: " foo".into() }, "InvalidName"),
            (EditOp::Move { from: "dir".into(), to: "dir/sub/dir".into() }, "InvalidMove"),
            (EditOp::Move { from: "foo".into(), to: "//foo".into() }, "InvalidName"),
            (EditOp::Remove { path: "missing".into() }, "NotFound"),
            (EditOp::AddDirectory { path: "foo/sub".into() }, "NameConflict"),
        ];
        for (op, kind) in failures {
            let err = session.apply(op.clone()).unwrap_err();
            assert!(format!("{:?}", err).contains(kind), "{} gave {:?}", op, err);
            assert_eq!(session.tree(), &before, "{} changed the tree", op);
        }
        assert!(!session.is_dirty());
        assert_eq!(session.undo_len(), 0);
        assert_eq!(session.commit().unwrap().uuid, v1.uuid);
    }

    #[test]
    #[traced_test]
    fn test_large_generated_collection() {
        let mut harness = ColmanTestHarness::new();
        let generator = ManifestGenerator::new(42);
        let text = generator.generate(20, 25, 1024);

        let v1 = harness.create(&text, "large").unwrap();
        assert_eq!(v1.file_count, 500);
        assert_eq!(v1.total_size_bytes, 500 * 1024);
        assert_eq!(v1.manifest_text, text);
        assert_eq!(serialize(&parse(&text).unwrap()), text);

        // Remove half the directories through the selection
        let mut session = harness.colman.open(&v1.uuid).unwrap();
        for d in (2..20).step_by(2) {
            session.selection_mut().select(&format!("dir_{:03}", d));
        }
        session.remove_selected().unwrap();
        let v2 = session.commit().unwrap();
        assert_eq!(v2.file_count, 500 - 9 * 25);

        let diff = harness.colman.diff(&v1.uuid, &v2.uuid).unwrap();
        assert_eq!(diff.stats.files_removed, 9 * 25);
        assert_eq!(diff.dirs_removed.len(), 9);
        assert!(diff.added.is_empty());

        info!("Generated collection verified with {} operations", harness.operation_log.len());
        harness.assert_valid(&v2.uuid);
    }
}
