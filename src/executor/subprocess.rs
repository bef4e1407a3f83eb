//! Child-process execution strategy.

use std::path::Path;
use std::process::{Command, Stdio};

use super::{ExecuteResult, ExecutionMode};
use crate::prompt::NO_INTERACTIVE_ENV;

/// Spawn `program` with `argv`, wait for it and collect both streams.
pub(crate) fn run(program: &Path, argv: &[String], limit: usize) -> ExecuteResult {
    tracing::debug!(program = %program.display(), ?argv, "spawning child");
    let output = Command::new(program)
        .args(argv)
        .env(NO_INTERACTIVE_ENV, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    match output {
        Ok(output) => {
            let truncated = output.stdout.len() > limit;
            let stdout = &output.stdout[..output.stdout.len().min(limit)];
            ExecuteResult {
                stdout: String::from_utf8_lossy(stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                // Killed by a signal: no code.
                exit_code: output.status.code().unwrap_or(1),
                error: None,
                mode: ExecutionMode::SubProcess,
                truncated,
            }
        }
        Err(e) => ExecuteResult::failed(
            ExecutionMode::SubProcess,
            format!("failed to spawn '{}': {e}", program.display()),
        ),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn exit_status_and_streams() {
        let argv = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let r = run(Path::new("/bin/sh"), &argv, 1024);
        assert_eq!(r.exit_code, 3);
        assert_eq!(r.stdout, "out\n");
        assert_eq!(r.stderr, "err\n");
        assert!(r.error.is_none());
    }

    #[test]
    fn child_sees_no_interactive_marker() {
        let argv = vec!["-c".to_string(), format!("printf %s \"${NO_INTERACTIVE_ENV}\"")];
        let r = run(Path::new("/bin/sh"), &argv, 1024);
        assert_eq!(r.stdout, "1");
    }

    #[test]
    fn spawn_failure_sets_error() {
        let r = run(Path::new("/definitely/not/here"), &[], 1024);
        assert_eq!(r.exit_code, 1);
        assert!(r.error.is_some());
        assert!(!r.stderr.is_empty());
    }
}
