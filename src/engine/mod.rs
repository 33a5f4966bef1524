//! OCR engine abstraction.
//!
//! Engines are external programs invoked per page. Each engine declares the
//! image format it consumes, can list its installed language packs, and
//! turns its raw output into a text-zone tree.

mod cuneiform;
mod hocr;
mod tesseract;

pub use cuneiform::CuneiformEngine;
pub use tesseract::TesseractEngine;

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::djvu::Rotation;
use crate::image::OutputFormat;
use crate::ipc::IpcError;
use crate::zones::{TextDetails, TextResult, WordSegmentation};

/// Errors from locating or running an OCR engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("OCR engine not available: {0}")]
    EngineNotFound(String),

    #[error("unknown OCR engine: {0}")]
    UnknownEngine(String),

    #[error("cannot determine list of available languages: {0}")]
    UnknownLanguageList(String),

    #[error("invalid language identifier: {0}")]
    InvalidLanguageId(String),

    #[error("language pack for {0} is not available")]
    MissingLanguagePack(String),

    #[error("malformed engine output: {0}")]
    MalformedOutput(String),

    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Raw per-page output of an engine run, kept around for debug dumps.
#[derive(Debug)]
pub struct RawOutput {
    /// File extension describing the payload (`html`, `txt`).
    pub format: &'static str,
    pub data: String,
}

/// Context needed to map engine output into document coordinates.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext {
    pub rotation: Rotation,
    pub details: TextDetails,
    pub segmentation: WordSegmentation,
    /// Rendered image size in pixels.
    pub page_size: (u32, u32),
}

/// An external OCR engine.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Image format this engine consumes.
    fn image_format(&self) -> OutputFormat;

    fn default_language(&self) -> String;

    /// Installed language packs.
    fn list_languages(&self) -> Result<Vec<String>, EngineError>;

    /// Check that a requested language can be used with this engine.
    fn check_language(&self, language: &str) -> Result<(), EngineError>;

    /// Run recognition on a rendered page image.
    fn recognize(
        &self,
        image: &Path,
        language: &str,
        details: TextDetails,
    ) -> Result<RawOutput, EngineError>;

    /// Parse raw engine output into a text-zone tree in document
    /// coordinates.
    fn extract_text(
        &self,
        raw: &RawOutput,
        ctx: &ExtractContext,
    ) -> Result<TextResult, EngineError>;
}

/// Names of all known engines, in preference order.
pub const ENGINE_NAMES: &[&str] = &["tesseract", "cuneiform"];

pub const DEFAULT_ENGINE: &str = "tesseract";

/// Instantiate an engine by name, probing that it is actually installed.
pub fn create(name: &str) -> Result<Box<dyn OcrEngine>, EngineError> {
    match name {
        "tesseract" => Ok(Box::new(TesseractEngine::probe()?)),
        "cuneiform" => Ok(Box::new(CuneiformEngine::probe()?)),
        other => Err(EngineError::UnknownEngine(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_engine_name() {
        match create("abbyy") {
            Err(EngineError::UnknownEngine(name)) => assert_eq!(name, "abbyy"),
            other => panic!("expected UnknownEngine, got {:?}", other.map(|e| e.name())),
        }
    }

    #[test]
    fn test_default_engine_is_known() {
        assert!(ENGINE_NAMES.contains(&DEFAULT_ENGINE));
    }
}
