//! Story bundling via the external `bun` bundler.
//!
//! Every build runs `bun build` as a subprocess, never in-process: a bundler
//! crash cannot take the preview server down, and the implementation can be
//! swapped as long as the argument conventions below are preserved.
//!
//! Two build modes exist:
//!
//! - **Module bundle** (`--target bun --format esm`): importable by a JS
//!   runtime on the host side. Project dependencies and the common implicit
//!   peers stay external so the host's installed copies are reused.
//! - **Browser bundle** (`--target browser --format esm`): fully
//!   self-contained, nothing external. Runs inside an isolated preview
//!   iframe with no access to the host's module graph.
//!
//! Bun may exit non-zero for internal warnings while still emitting a valid
//! bundle on stdout, so validity is sniffed structurally instead of trusting
//! the exit code.

use crate::{
    exec::{self, CommandOutput},
    log, resolver,
};
use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use tempfile::Builder as TempBuilder;

/// Packages kept external in module bundles even when the project manifest
/// does not declare them directly (the render library and its peers).
const COMMON_EXTERNALS: &[&str] = &[
    "react",
    "react-dom",
    "react/jsx-runtime",
    "react/jsx-dev-runtime",
    "@weaverclub/render",
];

/// Probe script that imports a module bundle and prints its export shapes.
const PROBE_SCRIPT: &str = include_str!("embed/probe.mjs");

/// Entry template for browser bundles, `{story_path}` substituted.
const BROWSER_ENTRY_TEMPLATE: &str = include_str!("embed/browser_entry.tsx");

// ============================================================================
// Output Validation
// ============================================================================

/// Structural sniff for a valid bundle on stdout: bun's leading comment
/// marker, or an ES module export statement.
fn has_valid_output(stdout: &str) -> bool {
    stdout.starts_with("// @bun") || stdout.contains("export {")
}

/// Apply the shared success rule: non-zero exit alone is not a failure,
/// only {non-zero exit AND no recognizable output} is.
fn check_bundle_output(output: CommandOutput, what: &str) -> Result<String> {
    if !output.success() && !has_valid_output(&output.stdout) {
        bail!("{what} failed:\n{}", output.detail());
    }
    Ok(output.stdout)
}

// ============================================================================
// Module Bundle
// ============================================================================

/// Bundle a story file for host-side import, project dependencies external.
///
/// # Errors
/// Fails on unresolvable project configuration (malformed manifest or
/// tsconfig) or on a bundler failure without valid output.
pub fn bundle_module(story_path: &Path, project_root: &Path) -> Result<String> {
    let tsconfig = resolver::nearest_tsconfig(project_root)?;
    let deps = resolver::project_dependencies(project_root)?;

    let mut args: Vec<OsString> = vec![
        "build".into(),
        story_path.into(),
        "--target".into(),
        "bun".into(),
        "--format".into(),
        "esm".into(),
    ];
    for dep in &deps {
        args.push("--external".into());
        args.push(dep.into());
    }
    for ext in COMMON_EXTERNALS {
        if !deps.iter().any(|d| d == ext) {
            args.push("--external".into());
            args.push((*ext).into());
        }
    }
    if let Some(tsconfig) = &tsconfig {
        args.push("--tsconfig-override".into());
        args.push(tsconfig.into());
    }

    let output = exec::run_captured(project_root, "bun", args)?;
    check_bundle_output(output, "Bundle")
}

// ============================================================================
// Browser Bundle
// ============================================================================

/// Removes a synthesized file when the bundling scope ends, success or not.
struct ScopedFile(PathBuf);

impl Drop for ScopedFile {
    fn drop(&mut self) {
        fs::remove_file(&self.0).ok();
    }
}

/// Bundle a single story's rendering entry point for the browser.
///
/// Synthesizes a temporary entry file in the cache directory that imports
/// the story module and mounts the tagged export into `#root`, then builds
/// it fully self-contained.
///
/// # Errors
/// Fails when the entry file cannot be written or the bundler produces no
/// valid output.
pub fn bundle_for_browser(story_path: &Path, project_root: &Path, story_id: &str) -> Result<String> {
    let tsconfig = resolver::nearest_tsconfig(project_root)?;
    let cache_dir = resolver::cache_dir(project_root)?;

    let sanitized: String = story_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let entry_path = cache_dir.join(format!("render-{sanitized}.tsx"));

    // Import specifiers use forward slashes, including on Windows
    let import_path = story_path.to_string_lossy().replace('\\', "/");
    let entry_code = BROWSER_ENTRY_TEMPLATE.replace("{story_path}", &import_path);

    fs::write(&entry_path, entry_code)
        .with_context(|| format!("Failed to write entry file {}", entry_path.display()))?;
    let _entry_guard = ScopedFile(entry_path.clone());

    let mut args: Vec<OsString> = vec![
        "build".into(),
        entry_path.as_os_str().into(),
        "--target".into(),
        "browser".into(),
        "--format".into(),
        "esm".into(),
    ];
    if let Some(tsconfig) = &tsconfig {
        args.push("--tsconfig-override".into());
        args.push(tsconfig.into());
    }

    let output = exec::run_captured(project_root, "bun", args)?;
    check_bundle_output(output, "Browser bundle")
}

// ============================================================================
// Module Evaluation
// ============================================================================

/// Bundle a story file and evaluate it, returning the probed export map.
///
/// The bundle text and the probe script are written to scoped temp files
/// under the cache-preferring location; both are removed when this function
/// returns, regardless of outcome. The probe's stdout must decode as a
/// string-keyed JSON mapping of export name to projected shape.
///
/// # Errors
/// Fails on bundling failure, probe subprocess failure, or output that is
/// not a string-keyed mapping.
pub fn evaluate_module(
    story_path: &Path,
    project_root: &Path,
) -> Result<BTreeMap<String, Value>> {
    let bundled = bundle_module(story_path, project_root)?;
    let cache_dir = resolver::cache_dir(project_root)?;

    let bundle_file = TempBuilder::new()
        .prefix("vignette-")
        .suffix(".mjs")
        .tempfile_in(&cache_dir)
        .context("Failed to create temp bundle file")?;
    fs::write(bundle_file.path(), &bundled)
        .context("Failed to write temp bundle file")?;

    let probe_file = TempBuilder::new()
        .prefix("probe-")
        .suffix(".mjs")
        .tempfile_in(&cache_dir)
        .context("Failed to create probe file")?;
    fs::write(probe_file.path(), PROBE_SCRIPT).context("Failed to write probe file")?;

    let output = exec::run_captured(
        project_root,
        "bun",
        [probe_file.path().as_os_str(), bundle_file.path().as_os_str()],
    )?;

    if !output.success() {
        bail!(
            "Evaluating {} failed:\n{}",
            story_path.display(),
            output.detail()
        );
    }

    let exports: BTreeMap<String, Value> = serde_json::from_str(&output.stdout)
        .with_context(|| format!("Probe output for {} is not an export map", story_path.display()))?;

    if exports.is_empty() {
        log!("bundle"; "{} has no exports", story_path.display());
    }

    Ok(exports)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_output_bun_marker() {
        assert!(has_valid_output("// @bun\nvar x = 1;"));
    }

    #[test]
    fn test_valid_output_export_statement() {
        assert!(has_valid_output("var Button = () => null;\nexport {\n  Button\n};"));
    }

    #[test]
    fn test_invalid_output_empty() {
        assert!(!has_valid_output(""));
        assert!(!has_valid_output("error: could not resolve import"));
    }

    #[test]
    fn test_nonzero_exit_with_valid_output_is_success() {
        let output = CommandOutput {
            exit_code: Some(1),
            stdout: "// @bun\nexport {};".into(),
            stderr: "warning: something internal".into(),
        };
        assert!(check_bundle_output(output, "Bundle").is_ok());
    }

    #[test]
    fn test_nonzero_exit_without_output_carries_stderr() {
        let output = CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "resolve error: ./missing".into(),
        };
        let err = check_bundle_output(output, "Bundle").unwrap_err();
        assert!(err.to_string().contains("resolve error"));
    }

    #[test]
    fn test_scoped_file_removes_on_drop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("entry.tsx");
        fs::write(&path, "x").unwrap();
        {
            let _guard = ScopedFile(path.clone());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_entry_template_has_placeholder() {
        assert!(BROWSER_ENTRY_TEMPLATE.contains("{story_path}"));
        assert!(BROWSER_ENTRY_TEMPLATE.contains("ReactStory"));
    }
}
