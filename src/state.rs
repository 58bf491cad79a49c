//! Live backend state with atomic replacement.
//!
//! The snapshot triple {stories, css, project root} is the only mutable
//! state the preview backend reads. It is published as an immutable value
//! behind `arc-swap`: the orchestrator replaces the whole triple in one
//! atomic store, and request handlers load a consistent `Arc` without
//! locks. A reader always observes either the fully-old or fully-new
//! triple, never a mix.

use crate::{css::CompiledCss, story::StoryDescriptor};
use arc_swap::ArcSwap;
use std::{collections::HashMap, path::PathBuf, sync::Arc};

/// The immutable triple served by the backend.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Current stories, keyed by stable id.
    pub stories: HashMap<String, StoryDescriptor>,
    /// Compiled CSS in cascade order.
    pub css: Vec<CompiledCss>,
    /// Active project root.
    pub project_root: PathBuf,
}

/// Single-writer, multi-reader store for the current [`Snapshot`].
pub struct SnapshotStore {
    inner: ArcSwap<Snapshot>,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            inner: ArcSwap::from_pointee(initial),
        }
    }

    /// Current snapshot. Lock-free; the returned `Arc` stays valid and
    /// internally consistent even if a replacement lands mid-request.
    #[inline]
    pub fn current(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }

    /// Replace the whole triple in one step. The only mutation path after
    /// startup; no partial write is ever observable.
    pub fn replace(&self, snapshot: Snapshot) {
        self.inner.store(Arc::new(snapshot));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::story_id;

    fn descriptor(name: &str) -> StoryDescriptor {
        StoryDescriptor {
            id: story_id(name),
            name: name.to_owned(),
            source_path: None,
            controls: None,
        }
    }

    fn snapshot(names: &[&str], css: &str) -> Snapshot {
        Snapshot {
            stories: names
                .iter()
                .map(|n| (story_id(n), descriptor(n)))
                .collect(),
            css: vec![CompiledCss {
                paths: vec![],
                output: css.to_owned(),
            }],
            project_root: PathBuf::from("/project"),
        }
    }

    #[test]
    fn test_replace_swaps_whole_triple() {
        let store = SnapshotStore::new(snapshot(&["UI/Button"], "old"));

        store.replace(snapshot(&["UI/Alert"], "new"));

        let current = store.current();
        assert!(current.stories.contains_key("ui/alert"));
        assert!(!current.stories.contains_key("ui/button"));
        assert_eq!(current.css[0].output, "new");
    }

    #[test]
    fn test_reader_holds_consistent_old_snapshot() {
        let store = SnapshotStore::new(snapshot(&["UI/Button"], "old"));

        let held = store.current();
        store.replace(snapshot(&["UI/Alert"], "new"));

        // The pre-replacement reader still sees old stories WITH old css
        assert!(held.stories.contains_key("ui/button"));
        assert_eq!(held.css[0].output, "old");

        let fresh = store.current();
        assert!(fresh.stories.contains_key("ui/alert"));
        assert_eq!(fresh.css[0].output, "new");
    }

    #[test]
    fn test_concurrent_readers_see_full_triples() {
        use std::thread;

        let store = std::sync::Arc::new(SnapshotStore::new(snapshot(&["UI/A"], "a")));
        let writer = std::sync::Arc::clone(&store);

        let handle = thread::spawn(move || {
            for i in 0..100 {
                let css = format!("css-{i}");
                let mut snap = snapshot(&["UI/A"], &css);
                snap.project_root = PathBuf::from(format!("/root-{i}"));
                writer.replace(snap);
            }
        });

        for _ in 0..100 {
            let snap = store.current();
            // Triple fields always belong to the same publication
            let suffix = snap.css[0].output.strip_prefix("css-");
            let root = snap.project_root.to_string_lossy();
            if let Some(suffix) = suffix {
                assert!(root.ends_with(suffix) || root == "/project");
            } else {
                assert_eq!(snap.css[0].output, "a");
            }
        }

        handle.join().unwrap();
    }
}
