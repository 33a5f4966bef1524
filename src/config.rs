//! Run configuration and the temporary workspace.
//!
//! All per-run settings live in an explicit [`RunConfig`] built by the CLI
//! layer and passed down; nothing is ambient process state.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::djvu::RenderLayers;
use crate::pages::PageId;
use crate::zones::{TextDetails, WordSegmentation};

/// Settings for one OCR run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Recognition language, in the engine's own naming.
    pub language: String,
    pub details: TextDetails,
    pub segmentation: WordSegmentation,
    pub render_layers: RenderLayers,
    /// Number of concurrent page workers, at least 1.
    pub workers: usize,
    /// Prepend a directive removing existing hidden text.
    pub clear_text: bool,
    /// Keep every intermediate file for inspection.
    pub debug: bool,
}

/// Temporary directory holding rendered page images and the edit script.
///
/// Removed on drop unless [`Workspace::retain`] was called; retention is
/// used both for debug runs and to preserve diagnostic state after a
/// failure.
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("djvuocr.").tempdir()?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path for a page's rendered image or raw engine output.
    pub fn page_file(&self, page: PageId, extension: &str) -> PathBuf {
        self.path.join(format!("{page:06}.{extension}"))
    }

    /// Path for the edit script.
    pub fn script_path(&self) -> PathBuf {
        self.path.join("djvuocr.dsed")
    }

    /// Keep the directory on disk and return its path.
    pub fn retain(&mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            #[allow(deprecated)]
            dir.into_path();
        }
        self.path.clone()
    }
}
