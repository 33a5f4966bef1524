//! Interface to the DjVu document decoder.
//!
//! The decoder itself is external (DjVuLibre); this module defines the
//! trait boundary the page pipeline works against, so the scheduler and
//! pipeline can be exercised with test doubles.

mod decode;

pub use decode::DjvuDocument;

use std::io;

use thiserror::Error;

use crate::ipc::IpcError;
use crate::pages::PageId;

/// Errors from decoding or rendering a page.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The page has no layer suitable for the requested rendering.
    /// Downstream treats the page as textless rather than failing the run.
    #[error("no image suitable for OCR")]
    NotAvailable,

    #[error("page {0} is out of range")]
    PageOutOfRange(PageId),

    #[error("cannot parse {tool} output: {detail}")]
    MalformedOutput { tool: String, detail: String },

    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Page rotation, in counterclockwise quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    /// Rotation from a quarter-turn count (any integer, taken mod 4).
    pub fn from_quarter_turns(turns: u32) -> Self {
        match turns % 4 {
            0 => Rotation::R0,
            1 => Rotation::R90,
            2 => Rotation::R180,
            _ => Rotation::R270,
        }
    }

    /// Whether this rotation swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

/// Which document layers to render for OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderLayers {
    /// Bitonal stencil only. Renders to 1-bit images.
    Mask,
    /// Foreground layer. Renders to 24-bit RGB.
    Foreground,
    /// All layers. Renders to 24-bit RGB.
    Color,
}

impl RenderLayers {
    pub fn pixel_layout(self) -> PixelLayout {
        match self {
            RenderLayers::Mask => PixelLayout::PackedBits,
            RenderLayers::Foreground | RenderLayers::Color => PixelLayout::Rgb24,
        }
    }
}

/// Raw pixel layout produced by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 1 bit per pixel, MSB first, 1 = black.
    PackedBits,
    /// 8-bit RGB triplets.
    Rgb24,
}

impl PixelLayout {
    pub fn bits_per_pixel(self) -> u16 {
        match self {
            PixelLayout::PackedBits => 1,
            PixelLayout::Rgb24 => 24,
        }
    }

    /// Unpadded bytes per row for a given pixel width.
    pub fn row_bytes(self, width: u32) -> usize {
        match self {
            PixelLayout::PackedBits => (width as usize + 7) / 8,
            PixelLayout::Rgb24 => width as usize * 3,
        }
    }
}

/// Vertical order of rows in rendered pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// First row is the top of the page (PNM convention).
    TopDown,
    /// First row is the bottom of the page (BMP convention).
    BottomUp,
}

/// An ordered multi-page document open for decoding.
pub trait DocumentSource: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Component file identifier for a page, as used by the edit script's
    /// `select` directive.
    fn page_file_id(&self, page: PageId) -> Result<String, DecodeError>;

    /// Decode one page, blocking until its geometry is known.
    fn decode_page(&self, page: PageId) -> Result<Box<dyn PageJob>, DecodeError>;
}

/// A decoded page ready for rendering. Owned by one page pipeline; never
/// shared across pages.
pub trait PageJob: Send {
    /// Page size in pixels, after rotation.
    fn size(&self) -> (u32, u32);

    /// Page resolution in dots per inch.
    fn dpi(&self) -> u32;

    /// Initial page rotation.
    fn rotation(&self) -> Rotation;

    /// Render the page into raw pixel rows.
    ///
    /// `row_alignment` pads each row to a multiple of that many bytes.
    /// Returns [`DecodeError::NotAvailable`] when the page has no layer
    /// suitable for the requested rendering.
    fn render(
        &self,
        layers: RenderLayers,
        layout: PixelLayout,
        order: RowOrder,
        row_alignment: usize,
    ) -> Result<Vec<u8>, DecodeError>;
}
