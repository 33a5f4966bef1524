//! Child-process invocation helpers.
//!
//! External tools (djvused, ddjvu, OCR engines) are invoked as blocking
//! subprocesses. Exit statuses are mapped to explicit error variants so a
//! child killed by a signal is reported differently from one that exited
//! with a nonzero code.

use std::io;
use std::process::{Command, ExitStatus, Output};

use thiserror::Error;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("{command} not found (is it installed?)")]
    NotFound { command: String },

    #[error("{command} exited with status {code}")]
    NonZeroExit { command: String, code: i32 },

    #[error("{command} was interrupted by signal {signal}")]
    Interrupted { command: String, signal: String },

    #[error("{command}: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
}

fn command_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Run a command to completion, capturing stdout and stderr.
///
/// Returns the raw [`Output`] on zero exit; any other disposition becomes
/// an [`IpcError`].
pub fn run_output(cmd: &mut Command) -> Result<Output, IpcError> {
    let name = command_name(cmd);
    match cmd.output() {
        Ok(output) => {
            check_status(&name, output.status)?;
            Ok(output)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(IpcError::NotFound { command: name }),
        Err(e) => Err(IpcError::Io {
            command: name,
            source: e,
        }),
    }
}

/// Run a command to completion, inheriting stdio.
pub fn run_status(cmd: &mut Command) -> Result<(), IpcError> {
    let name = command_name(cmd);
    match cmd.status() {
        Ok(status) => check_status(&name, status),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(IpcError::NotFound { command: name }),
        Err(e) => Err(IpcError::Io {
            command: name,
            source: e,
        }),
    }
}

/// Map an exit status to `Ok`, `NonZeroExit`, or `Interrupted`.
pub fn check_status(command: &str, status: ExitStatus) -> Result<(), IpcError> {
    if status.success() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(IpcError::Interrupted {
                command: command.to_string(),
                signal: signal_name(signal),
            });
        }
    }
    Err(IpcError::NonZeroExit {
        command: command.to_string(),
        code: status.code().unwrap_or(-1),
    })
}

/// Human-readable name for a POSIX signal number.
fn signal_name(signal: i32) -> String {
    match signal {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        3 => "SIGQUIT".to_string(),
        4 => "SIGILL".to_string(),
        6 => "SIGABRT".to_string(),
        8 => "SIGFPE".to_string(),
        9 => "SIGKILL".to_string(),
        11 => "SIGSEGV".to_string(),
        13 => "SIGPIPE".to_string(),
        15 => "SIGTERM".to_string(),
        n => format!("signal {n}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_exit() {
        run_output(&mut Command::new("true")).unwrap();
    }

    #[test]
    fn test_nonzero_exit() {
        match run_output(&mut Command::new("false")) {
            Err(IpcError::NonZeroExit { command, code }) => {
                assert_eq!(command, "false");
                assert_eq!(code, 1);
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_command() {
        match run_output(&mut Command::new("djvuocr-no-such-tool")) {
            Err(IpcError::NotFound { .. }) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_killed_by_signal() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        child.kill().unwrap();
        let status = child.wait().unwrap();
        match check_status("sleep", status) {
            Err(IpcError::Interrupted { signal, .. }) => assert_eq!(signal, "SIGKILL"),
            other => panic!("expected Interrupted, got {other:?}"),
        }
    }
}
