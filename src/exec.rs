// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Subprocess invocation helpers.
//!
//! Every external program the charm touches goes through here: the package
//! manager, the web server helper scripts, the host runtime's hook tools,
//! and the application's own administration CLI. Handlers run to completion
//! before the next event is delivered, so all calls block the current
//! process until the child exits. No timeouts are set on child processes.

use std::{ffi::OsStr, path::Path, process::Command};
use tracing::debug;

/// Run command with inherited stdio, checking exit status only.
///
/// # Errors
///
/// - Return [`ExecError::Spawn`] if the child cannot be spawned.
/// - Return [`ExecError::Failed`] if the child exits non-zero.
pub fn syscall_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<()> {
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<_>>();
    debug!("syscall: {:?} {:?}", cmd.as_ref(), args);

    let status = Command::new(cmd.as_ref()).args(args).spawn()?.wait()?;
    if !status.success() {
        return Err(ExecError::Failed {
            program: cmd.as_ref().to_string_lossy().into_owned(),
            message: format!("exit status {status}"),
        });
    }

    Ok(())
}

/// Run command with captured output.
///
/// Returns stdout and stderr combined as one [`String`] with trailing
/// newlines chomped.
///
/// # Errors
///
/// - Return [`ExecError::Spawn`] if the child cannot be spawned.
/// - Return [`ExecError::Failed`] if the child exits non-zero. The captured
///   output is carried inside the error message.
pub fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    syscall_captured(cmd, args, None::<&Path>)
}

/// Run command with captured output from a working directory.
///
/// Same capture semantics as [`syscall_non_interactive`], with the child's
/// working directory under caller control. The administration CLI insists on
/// being run from the application root, so most callers live in [`occ`].
///
/// # Errors
///
/// - Return [`ExecError::Spawn`] if the child cannot be spawned.
/// - Return [`ExecError::Failed`] if the child exits non-zero.
///
/// # See Also
///
/// - [`occ`](crate::occ)
pub fn syscall_captured(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    cwd: Option<impl AsRef<Path>>,
) -> Result<String> {
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<_>>();
    debug!("syscall: {:?} {:?}", cmd.as_ref(), args);

    let mut command = Command::new(cmd.as_ref());
    command.args(args);
    if let Some(cwd) = &cwd {
        command.current_dir(cwd.as_ref());
    }
    let output = command.output()?;

    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(stdout.as_str());
    }

    if !stderr.is_empty() {
        message.push_str(stderr.as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(ExecError::Failed {
            program: cmd.as_ref().to_string_lossy().into_owned(),
            message,
        });
    }

    Ok(message)
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Child process cannot be spawned.
    #[error(transparent)]
    Spawn(#[from] std::io::Error),

    /// Child process exited non-zero.
    #[error("command {program:?} failed:\n{message}")]
    Failed { program: String, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = ExecError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn captured_output_chomps_trailing_newline() -> anyhow::Result<()> {
        let output = syscall_non_interactive("echo", ["hello"])?;
        assert_eq!(output, "hello");
        Ok(())
    }

    #[test]
    fn captured_failure_carries_message() {
        let result = syscall_non_interactive("sh", ["-c", "echo oops >&2; exit 3"]);
        match result {
            Err(ExecError::Failed { program, message }) => {
                assert_eq!(program, "sh");
                assert_eq!(message, "oops");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn captured_respects_working_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let output = syscall_captured("pwd", Vec::<String>::new(), Some(dir.path()))?;
        assert_eq!(
            std::fs::canonicalize(output)?,
            std::fs::canonicalize(dir.path())?
        );
        Ok(())
    }
}
