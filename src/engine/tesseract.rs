//! Tesseract OCR engine.
//!
//! Invoked via the `tesseract` command line with hOCR output enabled.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use tempfile::TempDir;

use super::{hocr, EngineError, ExtractContext, OcrEngine, RawOutput};
use crate::image::OutputFormat;
use crate::ipc::{self, IpcError};
use crate::zones::{TextDetails, TextResult};

fn language_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{3}(?:[-_][a-zA-Z]+)?$").unwrap())
}

/// Stderr lines tesseract prints even on success.
fn is_stderr_boring(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("Tesseract Open Source OCR Engine")
        || line.starts_with("Page ")
        || line.starts_with("Estimating resolution")
}

pub struct TesseractEngine {
    languages: Vec<String>,
}

impl TesseractEngine {
    /// Locate tesseract and read its installed language packs.
    pub fn probe() -> Result<Self, EngineError> {
        let output = match Command::new("tesseract").arg("--list-langs").output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::EngineNotFound(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        // Older releases print the list to stderr, newer ones to stdout.
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let mut languages = Vec::new();
        let mut in_list = false;
        for line in text.lines() {
            let line = line.trim();
            if line.starts_with("List of available languages") {
                in_list = true;
                continue;
            }
            if in_list && !line.is_empty() && line != "osd" && language_re().is_match(line) {
                languages.push(line.to_string());
            }
        }
        if languages.is_empty() {
            return Err(EngineError::UnknownLanguageList(
                "tesseract --list-langs produced no languages".to_string(),
            ));
        }
        languages.sort();
        Ok(Self { languages })
    }

    fn forward_stderr(stderr: &[u8]) {
        for line in String::from_utf8_lossy(stderr).lines() {
            if !is_stderr_boring(line) {
                tracing::warn!("tesseract: {line}");
            }
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn image_format(&self) -> OutputFormat {
        OutputFormat::Pnm
    }

    fn default_language(&self) -> String {
        std::env::var("TESSERACT_LANGUAGE").unwrap_or_else(|_| "eng".to_string())
    }

    fn list_languages(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.languages.clone())
    }

    fn check_language(&self, language: &str) -> Result<(), EngineError> {
        for sublang in language.split('+') {
            if !language_re().is_match(sublang) {
                return Err(EngineError::InvalidLanguageId(sublang.to_string()));
            }
            if !self.languages.iter().any(|l| l == sublang) {
                return Err(EngineError::MissingLanguagePack(sublang.to_string()));
            }
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
        let base = output_dir.path().join("out");
        let output = match Command::new("tesseract")
            .arg(image)
            .arg(&base)
            .args(["-l", language, "hocr"])
            .output()
        {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::EngineNotFound("tesseract".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::forward_stderr(&output.stderr);
        ipc::check_status("tesseract", output.status).map_err(|e| match e {
            IpcError::NotFound { .. } => EngineError::EngineNotFound("tesseract".to_string()),
            other => other.into(),
        })?;
        // Tesseract 3.x wrote out.html, 4+ writes out.hocr.
        let hocr_path = base.with_extension("hocr");
        let data = if hocr_path.exists() {
            fs::read_to_string(&hocr_path)?
        } else {
            fs::read_to_string(base.with_extension("html"))?
        };
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boring_stderr() {
        assert!(is_stderr_boring("Tesseract Open Source OCR Engine v5.3.0"));
        assert!(is_stderr_boring("Page 1"));
        assert!(is_stderr_boring(""));
        assert!(!is_stderr_boring("Error in pixReadStream: unknown format"));
    }

    #[test]
    fn test_language_pattern() {
        assert!(language_re().is_match("eng"));
        assert!(language_re().is_match("chi_sim"));
        assert!(!language_re().is_match("en"));
        assert!(!language_re().is_match("english!"));
    }
}
