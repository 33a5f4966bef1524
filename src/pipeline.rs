//! Per-page processing pipeline: decode, render, recognize, extract.
//!
//! Each invocation is independent of every other page; all intermediate
//! resources are released on every exit path (rendered images are removed
//! unless debug mode keeps them).

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};

use thiserror::Error;

use crate::config::{RunConfig, Workspace};
use crate::djvu::{DecodeError, DocumentSource};
use crate::engine::{EngineError, ExtractContext, OcrEngine};
use crate::image::{self, OutputFormat};
use crate::pages::PageId;
use crate::zones::TextResult;

/// Errors from processing one page.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The page has no image suitable for recognition. Absorbed by the
    /// worker as a textless result; never fatal.
    #[error("no image suitable for OCR")]
    NoImage,

    #[error(transparent)]
    Decode(DecodeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    pub fn is_no_image(&self) -> bool {
        matches!(self, PipelineError::NoImage)
    }
}

impl From<DecodeError> for PipelineError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::NotAvailable => PipelineError::NoImage,
            other => PipelineError::Decode(other),
        }
    }
}

/// The per-page work a worker runs. Object-safe so the scheduler can be
/// driven by test doubles.
pub trait PagePipeline: Sync {
    fn process(&self, page: PageId) -> Result<TextResult, PipelineError>;
}

/// Production pipeline wiring the decoder, image encoder, and OCR engine
/// together.
pub struct OcrPipeline<'a> {
    pub document: &'a dyn DocumentSource,
    pub engine: &'a dyn OcrEngine,
    pub config: &'a RunConfig,
    pub workspace: &'a Workspace,
}

impl OcrPipeline<'_> {
    fn recognize_image(
        &self,
        page: PageId,
        image_path: &std::path::Path,
        ctx: &ExtractContext,
    ) -> Result<TextResult, PipelineError> {
        let raw = self
            .engine
            .recognize(image_path, &self.config.language, self.config.details)?;
        if self.config.debug {
            fs::write(self.workspace.page_file(page, raw.format), &raw.data)?;
        }
        Ok(self.engine.extract_text(&raw, ctx)?)
    }
}

impl PagePipeline for OcrPipeline<'_> {
    fn process(&self, page: PageId) -> Result<TextResult, PipelineError> {
        let job = self.document.decode_page(page)?;
        let size = job.size();
        let layout = self.config.render_layers.pixel_layout();
        let format = self.engine.image_format();

        let data = job.render(
            self.config.render_layers,
            layout,
            format.row_order(),
            format.row_alignment(),
        )?;

        let image_path = self.workspace.page_file(page, format.extension(layout));
        {
            let mut file = BufWriter::new(File::create(&image_path)?);
            match format {
                OutputFormat::Pnm => image::write_pnm(&mut file, layout, size, &data)?,
                OutputFormat::Bmp => image::write_bmp(&mut file, layout, size, job.dpi(), &data)?,
            }
            file.flush()?;
        }

        let ctx = ExtractContext {
            rotation: job.rotation(),
            details: self.config.details,
            segmentation: self.config.segmentation,
            page_size: size,
        };
        let result = self.recognize_image(page, &image_path, &ctx);

        if !self.config.debug {
            // Best effort; a leftover file inside the workspace is removed
            // with it anyway.
            let _ = fs::remove_file(&image_path);
        }
        result
    }
}
