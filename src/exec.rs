//! External command execution utilities.
//!
//! Thin wrappers over `std::process::Command` for the two shapes of
//! subprocess this tool runs: short-lived invocations whose output we
//! capture (the bundler, one-shot CSS compiles, export probing) and
//! long-lived children we keep a handle to (the CSS watch process).

use anyhow::{Context, Result, bail};
use std::{
    ffi::OsStr,
    path::Path,
    process::{Child, Command, Stdio},
};

/// Captured result of a finished subprocess.
///
/// stdout and stderr are decoded lossily; bundler output is UTF-8 in
/// practice and diagnostics only need to be readable, not exact.
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Diagnostic text for error reporting: stderr, falling back to stdout
    /// when stderr is empty.
    pub fn detail(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Run a command to completion, capturing stdout and stderr.
///
/// Both streams are collected jointly by `Command::output`; a non-zero exit
/// code is not an error here, callers decide what failure means (the bundler
/// treats non-zero exits with valid output as success).
///
/// # Errors
/// Returns an error only when the process cannot be spawned at all.
pub fn run_captured<I, S>(root: &Path, program: &str, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute `{program}`"))?;

    Ok(CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Spawn a long-lived child process.
///
/// stdout is discarded, stderr is inherited so the child's own diagnostics
/// reach the terminal. The caller owns the returned handle and is
/// responsible for killing it on shutdown.
pub fn spawn_watcher<I, S>(root: &Path, program: &str, args: I) -> Result<Child>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(program)
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("Failed to spawn `{program}`"))
}

/// Verify that an external tool is available on PATH.
///
/// # Errors
/// Returns a descriptive error naming the missing tool.
pub fn require_tool(program: &str) -> Result<()> {
    if which::which(program).is_err() {
        bail!("`{program}` not found on PATH; it is required to bundle stories");
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn cwd() -> PathBuf {
        std::env::current_dir().unwrap()
    }

    #[test]
    fn test_run_captured_success() {
        let out = run_captured(&cwd(), "sh", ["-c", "printf hello"]).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn test_run_captured_nonzero_is_not_error() {
        let out = run_captured(&cwd(), "sh", ["-c", "echo oops >&2; exit 3"]).unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.detail(), "oops");
    }

    #[test]
    fn test_detail_falls_back_to_stdout() {
        let out = CommandOutput {
            exit_code: Some(1),
            stdout: "from stdout\n".into(),
            stderr: "   ".into(),
        };
        assert_eq!(out.detail(), "from stdout");
    }

    #[test]
    fn test_run_captured_missing_binary() {
        let err = run_captured(&cwd(), "definitely-not-a-real-binary", [""; 0]);
        assert!(err.is_err());
    }
}
