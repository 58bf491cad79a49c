//! CSS strategy detection and compilation.
//!
//! A project's dependency list decides which CSS build strategies apply.
//! Only the Tailwind strategy exists today, but detection returns a list so
//! further strategies slot into the dispatch below without touching
//! callers. Each active strategy contributes one [`CompiledCss`]; the
//! aggregate keeps strategy order because stylesheet concatenation order is
//! cascade-relevant.

pub mod tailwind;

use crate::resolver;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Result of one strategy compilation: the stylesheet sources considered
/// and the compiled output text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCss {
    pub paths: Vec<PathBuf>,
    pub output: String,
}

/// Known CSS build strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssStrategy {
    Tailwind,
}

/// Package names whose presence marks the Tailwind strategy active.
const TAILWIND_PACKAGES: &[&str] = &["tailwindcss", "@tailwindcss/vite", "@tailwindcss/cli"];

/// Detect active strategies from the resolved dependency list.
///
/// # Errors
/// Propagates manifest resolution errors (a malformed manifest must not
/// read as "no strategies").
pub fn detect_strategies(project_root: &Path) -> Result<Vec<CssStrategy>> {
    let deps = resolver::project_dependencies(project_root)?;

    let mut strategies = Vec::new();
    if TAILWIND_PACKAGES.iter().any(|p| deps.iter().any(|d| d == p)) {
        strategies.push(CssStrategy::Tailwind);
    }
    Ok(strategies)
}

/// Run every active strategy's one-shot compile.
///
/// No active strategy is a valid empty result; a failing strategy fails the
/// whole load.
///
/// # Errors
/// Propagates detection and per-strategy compilation errors.
pub fn load_css(project_root: &Path) -> Result<Vec<CompiledCss>> {
    detect_strategies(project_root)?
        .into_iter()
        .map(|strategy| match strategy {
            CssStrategy::Tailwind => tailwind::compile_once(project_root),
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detect_tailwind_from_dev_dependencies() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("package.json"),
            r#"{"devDependencies": {"@tailwindcss/cli": "^4.0.0"}}"#,
        )
        .unwrap();

        let strategies = detect_strategies(tmp.path()).unwrap();
        assert_eq!(strategies, vec![CssStrategy::Tailwind]);
    }

    #[test]
    fn test_detect_nothing_without_tailwind() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("package.json"),
            r#"{"dependencies": {"react": "*"}}"#,
        )
        .unwrap();

        assert!(detect_strategies(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_load_css_without_strategy_is_empty_success() {
        let tmp = TempDir::new().unwrap();
        let css = load_css(tmp.path()).unwrap();
        assert!(css.is_empty());
    }

    #[test]
    fn test_detect_propagates_malformed_manifest() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("package.json"), "{broken").unwrap();
        assert!(detect_strategies(tmp.path()).is_err());
    }
}
