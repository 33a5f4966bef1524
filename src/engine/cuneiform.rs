//! Cuneiform OCR engine.
//!
//! Cuneiform consumes uncompressed BMP images and can emit hOCR directly.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use super::{hocr, EngineError, ExtractContext, OcrEngine, RawOutput};
use crate::image::OutputFormat;
use crate::ipc::{self, IpcError};
use crate::zones::{TextDetails, TextResult};

pub struct CuneiformEngine {
    languages: Vec<String>,
}

impl CuneiformEngine {
    /// Locate cuneiform and read its supported languages.
    pub fn probe() -> Result<Self, EngineError> {
        let output = match Command::new("cuneiform").arg("-l").output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::EngineNotFound(
                    "cuneiform not found (install cuneiform)".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let languages = parse_language_list(&text);
        if languages.is_empty() {
            return Err(EngineError::UnknownLanguageList(
                "cuneiform -l produced no languages".to_string(),
            ));
        }
        Ok(Self { languages })
    }
}

/// Parse the `Supported languages: eng ger ... .` listing.
fn parse_language_list(text: &str) -> Vec<String> {
    for line in text.lines() {
        if let Some(rest) = line.trim().strip_prefix("Supported languages:") {
            let mut languages: Vec<String> = rest
                .split_whitespace()
                .map(|w| w.trim_end_matches('.').to_string())
                .filter(|w| !w.is_empty())
                .collect();
            languages.sort();
            return languages;
        }
    }
    Vec::new()
}

impl OcrEngine for CuneiformEngine {
    fn name(&self) -> &'static str {
        "cuneiform"
    }

    fn image_format(&self) -> OutputFormat {
        OutputFormat::Bmp
    }

    fn default_language(&self) -> String {
        "eng".to_string()
    }

    fn list_languages(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.languages.clone())
    }

    fn check_language(&self, language: &str) -> Result<(), EngineError> {
        if !self.languages.iter().any(|l| l == language) {
            return Err(EngineError::MissingLanguagePack(language.to_string()));
        }
        Ok(())
    }

    fn recognize(
        &self,
        image: &Path,
        language: &str,
        _details: TextDetails,
    ) -> Result<RawOutput, EngineError> {
        let output_dir = TempDir::new().map_err(EngineError::Io)?;
        let out_path = output_dir.path().join("out.html");
        let output = match Command::new("cuneiform")
            .args(["-l", language, "-f", "hocr", "-o"])
            .arg(&out_path)
            .arg(image)
            .output()
        {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::EngineNotFound("cuneiform".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            if !line.trim().is_empty() {
                tracing::warn!("cuneiform: {line}");
            }
        }
        ipc::check_status("cuneiform", output.status).map_err(|e| match e {
            IpcError::NotFound { .. } => EngineError::EngineNotFound("cuneiform".to_string()),
            other => other.into(),
        })?;
        let data = fs::read_to_string(&out_path)?;
        Ok(RawOutput {
            format: "html",
            data,
        })
    }

    fn extract_text(
        &self,
        raw: &RawOutput,
        ctx: &ExtractContext,
    ) -> Result<TextResult, EngineError> {
        hocr::extract_zones(&raw.data, ctx)
    }
}
