//! Story discovery: find story files, evaluate them, decode the exports.
//!
//! A story file is any `*.stories.{ts,tsx,js,jsx,mts,cts}` under the
//! project root. Each one is bundled and evaluated through the bundler, and
//! every export is decoded against the tagged [`PreviewUnit`] shape; exports
//! that do not carry the `~type: "ReactStory"` discriminator simply fail to
//! decode and are discarded. No duck-typing survives past this boundary.
//!
//! Discovery is a pure function of the filesystem at call time: it returns
//! a fresh result set each run and never patches a previous one. One file
//! failing to bundle or evaluate is isolated; its error is carried in the
//! report while sibling files' stories still land.

use crate::{bundler, control::ControlSet};
use anyhow::anyhow;
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Extensions a story file may carry, after the `.stories.` infix.
const STORY_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mts", "cts"];

// ============================================================================
// Descriptor
// ============================================================================

/// One exported preview unit.
///
/// Superseded wholesale on every reload cycle; descriptors are never
/// patched in place.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryDescriptor {
    /// Display name, conventionally `"Category/Name"`.
    pub name: String,
    /// Stable identifier derived from the name.
    pub id: String,
    /// Absolute path of the originating story file. Required for browser
    /// bundling; attached during discovery.
    pub source_path: Option<PathBuf>,
    /// Ordered controls, when the story declares any.
    pub controls: Option<ControlSet>,
}

/// Derive the stable identifier for a display name: lowercased, runs of
/// whitespace collapsed to single hyphens.
///
/// `"UI/Button"` → `"ui/button"`, `"My  Cool Story"` → `"my-cool-story"`.
pub fn story_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                id.push('-');
                in_whitespace = true;
            }
        } else {
            id.extend(c.to_lowercase());
            in_whitespace = false;
        }
    }
    id
}

// ============================================================================
// Export Decoding
// ============================================================================

/// Closed decode target for module exports, keyed by the `~type`
/// discriminator. Unknown tags and untagged exports fail to decode.
#[derive(Debug, Deserialize)]
#[serde(tag = "~type")]
enum PreviewUnit {
    ReactStory(StoryExport),
}

#[derive(Debug, Deserialize)]
struct StoryExport {
    name: String,
    #[serde(default)]
    controls: Option<Vec<crate::control::Control>>,
}

/// Decode one probed export into a descriptor, or `None` when it is not a
/// story. A story with duplicate control names is a malformed story, not a
/// non-story, so that surfaces as an error.
fn decode_export(value: Value, source_path: &Path) -> anyhow::Result<Option<StoryDescriptor>> {
    let Ok(unit) = serde_json::from_value::<PreviewUnit>(value) else {
        return Ok(None);
    };

    let PreviewUnit::ReactStory(export) = unit;
    let controls = export
        .controls
        .map(ControlSet::from_controls)
        .transpose()
        .map_err(|e| anyhow!("{}: {e}", export.name))?;

    Ok(Some(StoryDescriptor {
        id: story_id(&export.name),
        name: export.name,
        source_path: Some(source_path.to_path_buf()),
        controls,
    }))
}

// ============================================================================
// Discovery
// ============================================================================

/// Outcome of one discovery pass: accepted stories keyed by id, plus the
/// per-file failures that did not abort the batch.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub stories: HashMap<String, StoryDescriptor>,
    pub failures: Vec<DiscoveryFailure>,
}

#[derive(Debug)]
pub struct DiscoveryFailure {
    pub path: PathBuf,
    pub error: anyhow::Error,
}

/// True for files matching the story naming convention.
fn is_story_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    STORY_EXTENSIONS
        .iter()
        .any(|ext| name.ends_with(&format!(".stories.{ext}")))
}

/// Collect story file paths under the project root, node_modules and
/// hidden directories skipped, in deterministic lexicographic order.
pub fn find_story_files(project_root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(project_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            name != "node_modules" && !(e.depth() > 0 && name.starts_with('.'))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && is_story_file(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Discover all stories under a project root.
///
/// Files are bundled and evaluated with full fan-out; failures are
/// aggregated per file rather than aborting the batch. Returns the full
/// report; ids are deterministic so reruns on unchanged input are
/// identical.
pub fn discover_stories(project_root: &Path) -> DiscoveryReport {
    let files = find_story_files(project_root);

    let results: Vec<(PathBuf, anyhow::Result<Vec<StoryDescriptor>>)> = files
        .into_par_iter()
        .map(|file| {
            let result = load_story_file(&file, project_root);
            (file, result)
        })
        .collect();

    let mut report = DiscoveryReport::default();
    for (path, result) in results {
        match result {
            Ok(stories) => {
                for story in stories {
                    report.stories.insert(story.id.clone(), story);
                }
            }
            Err(error) => report.failures.push(DiscoveryFailure { path, error }),
        }
    }
    report
}

/// Evaluate one story file and decode its story exports.
fn load_story_file(file: &Path, project_root: &Path) -> anyhow::Result<Vec<StoryDescriptor>> {
    let exports = bundler::evaluate_module(file, project_root)?;

    let mut stories = Vec::new();
    for value in exports.into_values() {
        if let Some(story) = decode_export(value, file)? {
            stories.push(story);
        }
    }
    Ok(stories)
}

// ============================================================================
// Tests
// ============================================================================
