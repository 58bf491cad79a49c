//! Tailwind CSS compilation through the external `@tailwindcss/cli`.
//!
//! Two modes: a one-shot compile used at startup and during HMR cycles when
//! no watcher is running, and a persistent watch mode where the CLI keeps a
//! cache file updated and readers poll it with a last-known-good fallback.
//! The watcher is an explicit resource with a start/stop lifecycle owned by
//! the orchestrator, not a module-level singleton.

use super::CompiledCss;
use crate::{exec, log, resolver};
use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process::Child,
    thread,
    time::Duration,
};
use walkdir::WalkDir;

/// Poll attempts while waiting for the watch-mode output file to fill.
const STARTUP_POLL_ATTEMPTS: u32 = 20;
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Retry attempts when reading the watch-mode output mid-rewrite.
const READ_RETRY_ATTEMPTS: u32 = 10;
const READ_RETRY_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// Entrypoint Discovery
// ============================================================================

/// All stylesheet files under the project root, lexicographically sorted by
/// full path. node_modules and hidden directories are excluded.
///
/// The first entry is the compile entrypoint; sorting makes the choice
/// deterministic across platforms instead of depending on enumeration
/// order.
fn stylesheet_files(project_root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(project_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            name != "node_modules" && !(e.depth() > 0 && name.starts_with('.'))
        })
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_type().is_file()
                && e.path().extension().and_then(|x| x.to_str()) == Some("css")
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

fn entrypoint(project_root: &Path) -> Result<(PathBuf, Vec<PathBuf>)> {
    let files = stylesheet_files(project_root);
    let Some(entry) = files.first().cloned() else {
        bail!(
            "No CSS files found under {} for Tailwind CSS",
            project_root.display()
        );
    };
    Ok((entry, files))
}

// ============================================================================
// One-Shot Compile
// ============================================================================

/// Compile the project's stylesheet entrypoint once, minified.
///
/// # Errors
/// Fails when no stylesheet exists or the compiler exits non-zero; the
/// error carries the compiler's stderr (stdout fallback).
pub fn compile_once(project_root: &Path) -> Result<CompiledCss> {
    let (entry, paths) = entrypoint(project_root)?;

    let args: Vec<OsString> = vec![
        "@tailwindcss/cli".into(),
        "-i".into(),
        entry.into(),
        "--minify".into(),
    ];
    let output = exec::run_captured(project_root, "bunx", args)?;

    if !output.success() {
        bail!("Tailwind CSS compilation failed:\n{}", output.detail());
    }

    Ok(CompiledCss {
        paths,
        output: output.stdout,
    })
}

// ============================================================================
// Watch Mode
// ============================================================================

/// A running Tailwind watch process writing to a cache file.
///
/// `css()` reads the cache file with a short retry (the compiler may be
/// mid-write) and falls back to the last-known-good text so readers never
/// block indefinitely. Dropping the watcher kills the child process.
pub struct TailwindWatcher {
    child: Mutex<Option<Child>>,
    output_file: PathBuf,
    paths: Vec<PathBuf>,
    cached: Mutex<String>,
}

impl TailwindWatcher {
    /// Start the compiler in watch mode and wait briefly for the first
    /// compilation to land. An empty output after the startup polls is not
    /// an error, just "no content yet".
    ///
    /// # Errors
    /// Fails when no stylesheet exists or the process cannot be spawned.
    pub fn start(project_root: &Path) -> Result<Self> {
        let (entry, paths) = entrypoint(project_root)?;
        let cache_dir = resolver::cache_dir(project_root)?;
        let output_file = cache_dir.join("tailwind.css");
        fs::write(&output_file, "").context("Failed to create Tailwind output file")?;

        let args: Vec<OsString> = vec![
            "@tailwindcss/cli".into(),
            "-i".into(),
            entry.into(),
            "-o".into(),
            output_file.as_os_str().into(),
            "--minify".into(),
            "--watch".into(),
        ];
        let child = exec::spawn_watcher(project_root, "bunx", args)?;

        let watcher = Self {
            child: Mutex::new(Some(child)),
            output_file,
            paths,
            cached: Mutex::new(String::new()),
        };

        for _ in 0..STARTUP_POLL_ATTEMPTS {
            thread::sleep(STARTUP_POLL_INTERVAL);
            if let Ok(content) = fs::read_to_string(&watcher.output_file)
                && !content.is_empty()
            {
                log!("css"; "initial Tailwind compilation: {} bytes", content.len());
                *watcher.cached.lock() = content;
                break;
            }
        }

        Ok(watcher)
    }

    /// Latest compiled output, retrying briefly before falling back to the
    /// last-known-good cache.
    pub fn css(&self) -> CompiledCss {
        for _ in 0..READ_RETRY_ATTEMPTS {
            if let Ok(content) = fs::read_to_string(&self.output_file)
                && !content.is_empty()
            {
                *self.cached.lock() = content.clone();
                return CompiledCss {
                    paths: self.paths.clone(),
                    output: content,
                };
            }
            thread::sleep(READ_RETRY_INTERVAL);
        }

        CompiledCss {
            paths: self.paths.clone(),
            output: self.cached.lock().clone(),
        }
    }

    /// Kill the watch process. Idempotent; also runs on drop.
    pub fn stop(&self) {
        if let Some(mut child) = self.child.lock().take() {
            child.kill().ok();
            child.wait().ok();
        }
    }
}

impl Drop for TailwindWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entrypoint_is_lexicographically_first() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("styles")).unwrap();
        fs::write(tmp.path().join("styles/z.css"), "").unwrap();
        fs::write(tmp.path().join("app.css"), "").unwrap();

        let (entry, all) = entrypoint(tmp.path()).unwrap();
        assert_eq!(entry, tmp.path().join("app.css"));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_entrypoint_skips_node_modules() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("node_modules/pkg")).unwrap();
        fs::write(tmp.path().join("node_modules/pkg/dist.css"), "").unwrap();
        fs::write(tmp.path().join("main.css"), "").unwrap();

        let (entry, all) = entrypoint(tmp.path()).unwrap();
        assert_eq!(entry, tmp.path().join("main.css"));
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_no_stylesheet_is_descriptive_error() {
        let tmp = TempDir::new().unwrap();
        let err = entrypoint(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("No CSS files found"));
    }
}
