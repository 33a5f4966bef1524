//! djvused edit-script emission and output targets.
//!
//! The run's whole product is a djvused script: one `select`/`set-txt`
//! record per page, each body terminated by a lone `.` line. The script
//! is written incrementally by the assembler and applied (or copied) by a
//! [`Saver`] once the run succeeds.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::info;

use crate::ipc::{self, IpcError};
use crate::zones::Zone;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Quote a component file id for a `select` line. djvused single-quoted
/// strings escape only backslash and the quote itself.
fn quote_file_id(file_id: &str) -> String {
    let mut quoted = String::with_capacity(file_id.len() + 2);
    quoted.push('\'');
    for c in file_id.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Emit a directive stripping all existing hidden text from the document.
pub fn write_remove_text(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "remove-txt")
}

/// Emit the `select`/`set-txt` preamble for one page.
pub fn write_page_header(out: &mut dyn Write, file_id: &str) -> io::Result<()> {
    writeln!(out, "select {}", quote_file_id(file_id))?;
    writeln!(out, "set-txt")
}

/// Emit a page's text body and the `.` terminator. `None` clears the
/// page's text.
pub fn write_page_body(out: &mut dyn Write, zone: Option<&Zone>) -> io::Result<()> {
    if let Some(zone) = zone {
        writeln!(out, "{zone}")?;
    }
    writeln!(out, ".")?;
    writeln!(out)
}

/// Where the finished script ends up.
#[derive(Debug, Clone)]
pub enum Saver {
    /// Copy the document to a new bundled file and apply the script to it.
    Bundled(PathBuf),
    /// Convert the document to indirect form at the given index file and
    /// apply the script to that.
    Indirect(PathBuf),
    /// Copy the raw script to the given path; the document is untouched.
    Script(PathBuf),
    /// Apply the script to the original document.
    InPlace,
    /// Run everything but change nothing.
    DryRun,
}

impl Saver {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Saver::DryRun)
    }

    /// Apply the finished script. `document` is the input document,
    /// `script` the assembled edit script.
    pub fn apply(&self, document: &Path, script: &Path) -> Result<(), SaveError> {
        match self {
            Saver::Bundled(target) => {
                fs::copy(document, target)?;
                apply_script(target, script)?;
                info!(target = %target.display(), "saved bundled document");
            }
            Saver::Indirect(index) => {
                let dir = index.parent().unwrap_or_else(|| Path::new("."));
                let name = index
                    .file_name()
                    .ok_or_else(|| io::Error::other("indirect target has no file name"))?;
                fs::create_dir_all(dir)?;
                let mut cmd = Command::new("djvmcvt");
                cmd.arg("-i").arg(document).arg(dir).arg(name);
                ipc::run_status(&mut cmd)?;
                apply_script(index, script)?;
                info!(target = %index.display(), "saved indirect document");
            }
            Saver::Script(target) => {
                fs::copy(script, target)?;
                info!(target = %target.display(), "saved edit script");
            }
            Saver::InPlace => {
                apply_script(document, script)?;
                info!(target = %document.display(), "updated document in place");
            }
            Saver::DryRun => {
                info!("dry run, discarding results");
            }
        }
        Ok(())
    }
}

fn apply_script(document: &Path, script: &Path) -> Result<(), IpcError> {
    let mut cmd = Command::new("djvused");
    cmd.arg(document).arg("-f").arg(script).arg("-s");
    ipc::run_status(&mut cmd)?;
    Ok(())
}
