//! Main test module for colman
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end editing and history scenarios
//! - Property-based tests for the manifest round-trip laws
//! - Edge cases for names, escaping and empty structures

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::colman::*;
    use tempfile::TempDir;

    const LOCATOR: &str = "37b51d194a7513e45b56f6524f2d51f2+3";

    fn engine() -> (Colman, TempDir) {
        let dir = TempDir::new().unwrap();
        let colman = Colman::init(dir.path().join("store")).unwrap();
        (colman, dir)
    }

    #[test]
    fn test_empty_collection() {
        let (colman, _dir) = engine();
        let v1 = colman.create("", "Empty").unwrap();
        assert_eq!(v1.file_count, 0);
        assert_eq!(v1.total_size_bytes, 0);

        let mut session = colman.open(&v1.uuid).unwrap();
        assert!(session.tree().is_empty());
        session.add_directory("later").unwrap();
        let v2 = session.commit().unwrap();
        assert_eq!(
            v2.manifest_text,
            "./later d41d8cd98f00b204e9800998ecf8427e+0 0:0:\\056\n"
        );
        assert_eq!(v2.file_count, 0);
    }

    #[test]
    fn test_special_filenames() {
        let names = [
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "back\\slash",
            "файл.txt",
            "I ❤️ ⛵️",
        ];

        let mut tree = VirtualFileTree::new();
        let block = BlockLocator::parse(LOCATOR).unwrap();
        for name in &names {
            tree = tree
                .add_file(name, vec![Segment::new(block.clone(), 0, 3)])
                .unwrap();
        }

        let text = serialize(&tree);
        assert!(text.contains("file\\040with\\040spaces.txt"));
        assert!(text.contains("back\\134slash"));
        assert!(text.is_ascii());

        let reparsed = parse(&text).unwrap();
        for name in &names {
            assert!(reparsed.is_file(name), "{} lost in round trip", name);
        }
        assert_eq!(reparsed, tree);
    }

    #[test]
    fn test_whitespace_names_on_load() {
        let text = format!(". {} 0:3:\\040padded\n", LOCATOR);

        // Representable names load by default
        let tree = parse(&text).unwrap();
        assert!(tree.is_file(" padded"));

        // Strict loading rejects them with the line number
        let err = ManifestParser::new().strict_names(true).parse(&text).unwrap_err();
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn test_malformed_manifests_are_fatal() {
        let (colman, _dir) = engine();
        let cases = [
            format!(". {} 0:3:a/b\n", LOCATOR),
            format!(". {} 0:x:a\n", LOCATOR),
            format!(". {} 0:9:a\n", LOCATOR),
            ". 0:3:a\n".to_string(),
            format!(". {} 0:3:bad\\9\n", LOCATOR),
        ];
        for text in &cases {
            let err = colman.create(text, "broken").unwrap_err();
            assert!(matches!(err, ColmanError::Parse(_)), "{:?} accepted", text);
            assert!(!err.is_recoverable());
        }
    }

    #[test]
    fn test_multi_line_file_keeps_segments() {
        let text = format!(
            ". {} 0:3:big\n./sub {} 0:1:x\n. acbd18db4cc2f85cedef654fccc4a4d8+4 0:4:big\n",
            LOCATOR, LOCATOR
        );
        let tree = parse(&text).unwrap();
        assert_eq!(tree.file("big").unwrap().segments().len(), 2);
        assert_eq!(tree.file("big").unwrap().size(), 7);

        let canonical = serialize(&tree);
        assert_eq!(parse(&canonical).unwrap(), tree);
        assert_eq!(serialize(&parse(&canonical).unwrap()), canonical);
    }
}

#[cfg(test)]
mod concurrency_tests {
    use ::colman::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_parallel_sessions_commit_once() {
        let dir = TempDir::new().unwrap();
        let colman = Colman::init(dir.path().join("store")).unwrap();
        let v1 = colman
            .create(". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo 0:3:bar\n", "race")
            .unwrap();

        let num_threads = 4;
        let barrier = Arc::new(Barrier::new(num_threads));
        let handles: Vec<_> = (0..num_threads)
            .map(|i| {
                let colman = colman.clone();
                let barrier = Arc::clone(&barrier);
                let uuid = v1.uuid.clone();
                thread::spawn(move || {
                    let mut session = colman.open(&uuid).unwrap();
                    session.add_directory(&format!("thread_{}", i)).unwrap();
                    barrier.wait();
                    session.commit()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let committed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(committed, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                err.is_stale() || matches!(err, ColmanError::CommitInProgress(_)),
                "unexpected error: {}",
                err
            );
            assert!(err.is_recoverable());
        }

        let rows = colman.versions(&v1.uuid).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(colman.verify(&v1.uuid).unwrap().is_valid());
    }
}

#[cfg(test)]
mod service_tests {
    use ::colman::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Host that refuses commits while `offline` is set
    struct FlakyHost {
        inner: LocalStore,
        offline: AtomicBool,
    }

    impl CollectionService for FlakyHost {
        fn fetch(&self, uuid: &str) -> Result<CollectionVersion> {
            self.inner.fetch(uuid)
        }

        fn list_versions(&self, uuid: &str) -> Result<Vec<CollectionVersion>> {
            self.inner.list_versions(uuid)
        }

        fn create(&self, request: CreateRequest) -> Result<CollectionVersion> {
            self.inner.create(request)
        }

        fn commit(&self, request: CommitRequest) -> Result<CollectionVersion> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ColmanError::rejected("503 Service Unavailable"));
            }
            self.inner.commit(request)
        }
    }

    #[test]
    fn test_rejected_commit_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FlakyHost {
            inner: LocalStore::init(dir.path().join("store")).unwrap(),
            offline: AtomicBool::new(true),
        });
        let colman = Colman::new(host.clone());

        let v1 = colman
            .create(". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo 0:3:bar\n", "flaky")
            .unwrap();
        let mut session = colman.open(&v1.uuid).unwrap();
        session.remove("foo").unwrap();

        let err = session.commit().unwrap_err();
        assert!(matches!(err, ColmanError::CommitRejected(_)));
        assert!(err.is_recoverable());
        assert!(session.is_dirty());
        assert_eq!(session.base().uuid, v1.uuid);
        assert!(!colman.commit_in_progress(&v1.collection_id));
        assert_eq!(colman.versions(&v1.uuid).unwrap().len(), 1);

        host.offline.store(false, Ordering::SeqCst);
        let v2 = session.commit().unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.total_size_bytes, 3);
    }
}

// Re-export test utilities for use in other suites
pub use integration::{ColmanTestHarness, ManifestGenerator};
