//! File system watcher and HMR orchestration.
//!
//! Monitors the project tree and turns bursts of filesystem events into
//! single reload cycles:
//!
//! ```text
//! notify events ──▶ filter ──▶ Debouncer (100ms) ──▶ reload cycle
//!                                                      │
//!                               ┌──────────────────────┴───────┐
//!                               │ discover stories ∥ compile   │
//!                               │        (rayon::join)         │
//!                               └──────────────┬───────────────┘
//!                             both ok: swap snapshot, broadcast
//!                             either fails: log, keep old state
//! ```
//!
//! Cycles are serialized by construction: the watcher loop runs each cycle
//! inline, and qualifying events that arrive mid-cycle sit in the channel
//! and coalesce into at most one follow-up cycle.

use crate::{
    css::{self, CompiledCss, tailwind::TailwindWatcher},
    log,
    server::HmrClients,
    state::{Snapshot, SnapshotStore},
    story,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 100;

/// Extensions that qualify as source or style changes.
const WATCHED_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mts", "cts", "css"];

// =============================================================================
// Path Filtering
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// A path qualifies when it names a file with a watched extension outside
/// the installed-packages tree and outside hidden directories. The bundle
/// cache lives in a hidden directory (`.vignette-cache` when there is no
/// `node_modules`), and the tool's own writes there must never feed back
/// into the watcher.
fn is_relevant_path(path: &Path) -> bool {
    let excluded = path.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name == "node_modules" || (name.len() > 1 && name != ".." && name.starts_with('.'))
    });
    if excluded {
        return false;
    }
    if path.file_name().is_none() || is_temp_file(path) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| WATCHED_EXTENSIONS.contains(&ext))
}

const fn is_relevant_kind(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events: the window restarts on every qualifying
/// event, so a burst of saves collapses into one reload cycle.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if is_relevant_path(&path) {
                self.pending.insert(path);
                self.last_event = Some(Instant::now());
            }
        }
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Reload Cycle
// =============================================================================

/// Everything one reload cycle needs, owned by the orchestrator thread.
pub struct HmrContext {
    pub project_root: PathBuf,
    pub store: Arc<SnapshotStore>,
    pub clients: Arc<HmrClients>,
    /// Persistent Tailwind watch process, when the strategy is active.
    pub tailwind: Option<Arc<TailwindWatcher>>,
}

impl HmrContext {
    /// Compile CSS for a cycle: the watch-mode fast path when a watcher is
    /// running, the one-shot strategy compile otherwise.
    fn compile_css(&self) -> Result<Vec<CompiledCss>> {
        match &self.tailwind {
            Some(watcher) => Ok(vec![watcher.css()]),
            None => css::load_css(&self.project_root),
        }
    }
}

/// Run one reload cycle: re-discover stories and re-compile CSS in
/// parallel; on joint success swap the snapshot and notify clients. On
/// failure the previously served state stays authoritative.
fn run_cycle(ctx: &HmrContext, changed: &[PathBuf]) {
    let started = Instant::now();
    if let Some(first) = changed.first() {
        let shown = first.strip_prefix(&ctx.project_root).unwrap_or(first);
        match changed.len() {
            1 => log!("watch"; "{} changed, reloading...", shown.display()),
            n => log!("watch"; "{} (+{} more) changed, reloading...", shown.display(), n - 1),
        }
    }

    let (report, css) = rayon::join(
        || story::discover_stories(&ctx.project_root),
        || ctx.compile_css(),
    );

    // Per-file failures are isolated; surface them without dropping the
    // stories that did load
    for failure in &report.failures {
        log!("error"; "{}:\n{:#}", failure.path.display(), failure.error);
    }

    let css = match css {
        Ok(css) => css,
        Err(e) => {
            log!("error"; "CSS reload failed, keeping previous state: {e:#}");
            return;
        }
    };

    let story_count = report.stories.len();
    ctx.store.replace(Snapshot {
        stories: report.stories,
        css,
        project_root: ctx.project_root.clone(),
    });
    ctx.clients.notify_reload();

    log!("hmr"; "reloaded {story_count} stories in {:.0?}", started.elapsed());
}

// =============================================================================
// Public API
// =============================================================================

/// Start the blocking file watcher with debouncing and live reload.
///
/// Runs until the event channel disconnects (process shutdown).
///
/// # Errors
/// Fails when the watcher cannot be created or the project root cannot be
/// watched; callers treat that as unrecoverable.
pub fn watch_for_changes_blocking(ctx: &HmrContext) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    watcher
        .watch(&ctx.project_root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", ctx.project_root.display()))?;

    log!("watch"; "watching {} for changes", ctx.project_root.display());

    let mut debouncer = Debouncer::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant_kind(&event) => debouncer.add(event),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                run_cycle(ctx, &debouncer.take());
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn modify_event(paths: &[&str]) -> Event {
        let mut event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any));
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn test_relevant_path_accepts_source_and_style() {
        assert!(is_relevant_path(Path::new("/p/src/button.tsx")));
        assert!(is_relevant_path(Path::new("/p/app.css")));
        assert!(is_relevant_path(Path::new("/p/a.stories.mts")));
    }

    #[test]
    fn test_relevant_path_rejects_node_modules() {
        assert!(!is_relevant_path(Path::new("/p/node_modules/react/index.js")));
    }

    #[test]
    fn test_relevant_path_rejects_other_extensions() {
        assert!(!is_relevant_path(Path::new("/p/readme.md")));
        assert!(!is_relevant_path(Path::new("/p/photo.png")));
        assert!(!is_relevant_path(Path::new("/p/noextension")));
    }

    #[test]
    fn test_relevant_path_rejects_own_cache_writes() {
        // Fallback cache dir when the project has no node_modules; entry
        // files and the Tailwind output land there with watched extensions
        assert!(!is_relevant_path(Path::new(
            "/p/.vignette-cache/render-ui_button.tsx"
        )));
        assert!(!is_relevant_path(Path::new("/p/.vignette-cache/tailwind.css")));
        assert!(!is_relevant_path(Path::new(
            "/p/node_modules/.cache/vignette/tailwind.css"
        )));
    }

    #[test]
    fn test_relevant_path_rejects_hidden_directories() {
        assert!(!is_relevant_path(Path::new("/p/.git/index.ts")));
        assert!(is_relevant_path(Path::new("/p/src/button.tsx")));
    }

    #[test]
    fn test_relevant_path_rejects_editor_artifacts() {
        assert!(!is_relevant_path(Path::new("/p/.button.tsx")));
        assert!(!is_relevant_path(Path::new("/p/button.tsx~")));
    }

    #[test]
    fn test_debouncer_collapses_burst_into_one_batch() {
        let mut debouncer = Debouncer::new();
        debouncer.add(modify_event(&["/p/a.tsx"]));
        debouncer.add(modify_event(&["/p/a.tsx", "/p/b.tsx"]));
        debouncer.add(modify_event(&["/p/b.tsx"]));

        assert!(!debouncer.ready()); // window still open
        std::thread::sleep(Duration::from_millis(DEBOUNCE_MS + 20));
        assert!(debouncer.ready());

        let batch = debouncer.take();
        assert_eq!(batch.len(), 2); // deduplicated
        assert!(!debouncer.ready()); // consumed
    }

    #[test]
    fn test_debouncer_ignores_irrelevant_paths() {
        let mut debouncer = Debouncer::new();
        debouncer.add(modify_event(&["/p/node_modules/x.js", "/p/readme.md"]));
        assert!(debouncer.pending.is_empty());
        assert!(debouncer.last_event.is_none());
    }

    #[test]
    fn test_debouncer_idle_timeout_is_long() {
        let debouncer = Debouncer::new();
        assert_eq!(debouncer.timeout(), Duration::from_secs(60));
    }
}
