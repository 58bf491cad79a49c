//! Project manifest and tsconfig resolution.
//!
//! Everything here walks ancestor directories upward from a starting point,
//! the way JS tooling resolves `package.json` and `tsconfig.json`. The
//! results feed the bundler: declared dependencies become `--external`
//! flags, the nearest `node_modules` decides where temp files go, and a
//! tsconfig with path aliases is forwarded so alias imports resolve.

use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// tsconfig file names probed per directory, most specific first.
const TSCONFIG_CANDIDATES: &[&str] = &["tsconfig.app.json", "tsconfig.base.json", "tsconfig.json"];

/// Subdirectory of `node_modules` (or the project root) used for temp
/// bundles and entry files. Living inside `node_modules` keeps these files
/// out of the watched source tree.
const CACHE_SUBDIR: &str = ".cache/vignette";

// ============================================================================
// Errors
// ============================================================================

/// Resolution errors.
///
/// A missing manifest is a valid empty result, never an error; a manifest
/// that exists but cannot be parsed must surface as `Parse` so broken
/// project configuration is not mistaken for "no dependencies".
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse `{0}`")]
    Parse(PathBuf, #[source] serde_json::Error),
}

// ============================================================================
// Manifest Schema
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    peer_dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct Tsconfig {
    #[serde(default, rename = "compilerOptions")]
    compiler_options: TsconfigCompilerOptions,
}

#[derive(Debug, Default, Deserialize)]
struct TsconfigCompilerOptions {
    #[serde(default)]
    paths: Option<BTreeMap<String, Vec<String>>>,
}

// ============================================================================
// Upward Walk
// ============================================================================

/// Visit `start` and each ancestor directory until `visit` yields a result
/// or the filesystem root repeats.
fn walk_ancestors<T>(start: &Path, mut visit: impl FnMut(&Path) -> Option<T>) -> Option<T> {
    let mut current = start.to_path_buf();
    loop {
        if let Some(found) = visit(&current) {
            return Some(found);
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return None,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Dependency names declared by the nearest `package.json`.
///
/// Union of runtime, dev and peer dependency keys, in manifest order of
/// section (runtime first). No manifest anywhere up the tree is an empty
/// list.
///
/// # Errors
/// Returns [`ManifestError`] if the nearest manifest exists but is
/// unreadable or malformed.
pub fn project_dependencies(start: &Path) -> Result<Vec<String>, ManifestError> {
    let manifest = walk_ancestors(start, |dir| {
        let candidate = dir.join("package.json");
        candidate.exists().then_some(candidate)
    });

    let Some(path) = manifest else {
        return Ok(Vec::new());
    };

    let content = fs::read_to_string(&path).map_err(|e| ManifestError::Io(path.clone(), e))?;
    let parsed: PackageManifest =
        serde_json::from_str(&content).map_err(|e| ManifestError::Parse(path, e))?;

    let mut deps: Vec<String> = Vec::new();
    let names = parsed
        .dependencies
        .into_keys()
        .chain(parsed.dev_dependencies.into_keys())
        .chain(parsed.peer_dependencies.into_keys());
    for name in names {
        // A package may appear in several sections; keep the first
        if !deps.contains(&name) {
            deps.push(name);
        }
    }
    Ok(deps)
}

/// Nearest existing `node_modules` directory, walking upward from `start`.
pub fn nearest_node_modules(start: &Path) -> Option<PathBuf> {
    walk_ancestors(start, |dir| {
        let candidate = dir.join("node_modules");
        candidate.is_dir().then_some(candidate)
    })
}

/// Directory for temporary bundles and synthesized entry files.
///
/// Prefers `<node_modules>/.cache/vignette` so temp files live inside the
/// installed-packages tree (naturally excluded from source watching), and
/// falls back to a project-local `.vignette-cache`. Created on demand.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn cache_dir(project_root: &Path) -> anyhow::Result<PathBuf> {
    let dir = match nearest_node_modules(project_root) {
        Some(node_modules) => node_modules.join(CACHE_SUBDIR),
        None => project_root.join(".vignette-cache"),
    };
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Nearest tsconfig declaring path aliases, walking upward from `start`.
///
/// Per directory, candidates are probed most specific first
/// (`tsconfig.app.json`, `tsconfig.base.json`, `tsconfig.json`). A file only
/// counts when it parses and `compilerOptions.paths` is present; a config
/// without aliases keeps the walk going.
///
/// # Errors
/// Returns [`ManifestError::Parse`] if a candidate exists but is malformed.
pub fn nearest_tsconfig(start: &Path) -> Result<Option<PathBuf>, ManifestError> {
    let result = walk_ancestors(start, |dir| {
        for candidate in TSCONFIG_CANDIDATES {
            let path = dir.join(candidate);
            if !path.exists() {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| ManifestError::Io(path.clone(), e))
                .and_then(|content| {
                    serde_json::from_str::<Tsconfig>(&content)
                        .map_err(|e| ManifestError::Parse(path.clone(), e))
                });
            match parsed {
                Ok(config) if config.compiler_options.paths.is_some() => {
                    return Some(Ok(path));
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        None
    });

    result.transpose()
}

// ============================================================================
// Tests
// ============================================================================
