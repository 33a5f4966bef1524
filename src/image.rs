//! Intermediate image encoders.
//!
//! Each OCR engine consumes one of two formats. The header byte layout is
//! a compatibility contract with the engine and must be reproduced exactly.

use std::io::{self, Write};

use crate::djvu::{PixelLayout, RowOrder};

/// Image file format expected by an OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Binary PBM (1-bit) or PPM (24-bit).
    Pnm,
    /// Uncompressed Windows BMP.
    Bmp,
}

impl OutputFormat {
    pub fn extension(self, layout: PixelLayout) -> &'static str {
        match (self, layout) {
            (OutputFormat::Pnm, PixelLayout::PackedBits) => "pbm",
            (OutputFormat::Pnm, PixelLayout::Rgb24) => "ppm",
            (OutputFormat::Bmp, _) => "bmp",
        }
    }

    /// Row order the renderer must produce for this format.
    pub fn row_order(self) -> RowOrder {
        match self {
            OutputFormat::Pnm => RowOrder::TopDown,
            OutputFormat::Bmp => RowOrder::BottomUp,
        }
    }

    /// Row alignment in bytes the renderer must produce for this format.
    pub fn row_alignment(self) -> usize {
        match self {
            OutputFormat::Pnm => 1,
            OutputFormat::Bmp => 4,
        }
    }
}

/// Write a binary PBM (`P4`) or PPM (`P6`) image.
///
/// `data` holds top-down rows, unpadded.
pub fn write_pnm(
    out: &mut dyn Write,
    layout: PixelLayout,
    size: (u32, u32),
    data: &[u8],
) -> io::Result<()> {
    match layout {
        PixelLayout::PackedBits => writeln!(out, "P4 {} {}", size.0, size.1)?,
        PixelLayout::Rgb24 => writeln!(out, "P6 {} {} 255", size.0, size.1)?,
    }
    out.write_all(data)
}

/// Write an uncompressed little-endian BMP image.
///
/// `data` holds bottom-up rows, each padded to 4 bytes. 1-bit images get a
/// two-entry white-then-black palette.
pub fn write_bmp(
    out: &mut dyn Write,
    layout: PixelLayout,
    size: (u32, u32),
    dpi: u32,
    data: &[u8],
) -> io::Result<()> {
    let dots_per_meter = (dpi as f64 * 39.37 + 0.5) as u32;
    let palette_len: u32 = if layout == PixelLayout::PackedBits { 2 } else { 0 };
    let headers_size = 54 + 4 * palette_len;

    // File header.
    out.write_all(b"BM")?;
    out.write_all(&(data.len() as u32 + headers_size).to_le_bytes())?;
    out.write_all(&0u16.to_le_bytes())?;
    out.write_all(&0u16.to_le_bytes())?;
    out.write_all(&headers_size.to_le_bytes())?;

    // DIB header.
    out.write_all(&40u32.to_le_bytes())?;
    out.write_all(&size.0.to_le_bytes())?;
    out.write_all(&size.1.to_le_bytes())?;
    out.write_all(&1u16.to_le_bytes())?;
    out.write_all(&layout.bits_per_pixel().to_le_bytes())?;
    out.write_all(&0u32.to_le_bytes())?; // no compression
    out.write_all(&(data.len() as u32).to_le_bytes())?;
    out.write_all(&dots_per_meter.to_le_bytes())?;
    out.write_all(&dots_per_meter.to_le_bytes())?;
    out.write_all(&palette_len.to_le_bytes())?;
    out.write_all(&palette_len.to_le_bytes())?;

    if palette_len > 0 {
        out.write_all(&[0xff, 0xff, 0xff, 0x00])?; // white
        out.write_all(&[0x00, 0x00, 0x00, 0x00])?; // black
    }
    out.write_all(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le32(buf: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
    }

    fn le16(buf: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(buf[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn test_pbm_header() {
        let mut buf = Vec::new();
        write_pnm(&mut buf, PixelLayout::PackedBits, (10, 2), &[0, 1, 2, 3]).unwrap();
        assert_eq!(&buf[..8], b"P4 10 2\n");
        assert_eq!(&buf[8..], &[0, 1, 2, 3]);
    }

    #[test]
    fn test_ppm_header() {
        let mut buf = Vec::new();
        write_pnm(&mut buf, PixelLayout::Rgb24, (2, 1), &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(&buf[..10], b"P6 2 1 255");
        assert_eq!(buf[10], b'\n');
        assert_eq!(buf.len(), 11 + 6);
    }

    #[test]
    fn test_bmp_bitonal_1x1_reference() {
        // One row: a single bit, padded to a 4-byte row.
        let data = [0x80, 0, 0, 0];
        let mut buf = Vec::new();
        write_bmp(&mut buf, PixelLayout::PackedBits, (1, 1), 300, &data).unwrap();

        assert_eq!(&buf[0..2], b"BM");
        assert_eq!(le32(&buf, 2), 62 + 4); // file size: headers + palette + data
        assert_eq!(le32(&buf, 10), 62); // pixel data offset
        assert_eq!(le32(&buf, 14), 40); // DIB header size
        assert_eq!(le32(&buf, 18), 1); // width
        assert_eq!(le32(&buf, 22), 1); // height
        assert_eq!(le16(&buf, 26), 1); // planes
        assert_eq!(le16(&buf, 28), 1); // bits per pixel
        assert_eq!(le32(&buf, 30), 0); // compression
        assert_eq!(le32(&buf, 34), 4); // pixel data size
        assert_eq!(le32(&buf, 38), 11811); // round(300 * 39.37)
        assert_eq!(le32(&buf, 42), 11811);
        assert_eq!(le32(&buf, 46), 2); // palette entries
        assert_eq!(le32(&buf, 50), 2); // important colors
        assert_eq!(&buf[54..58], &[0xff, 0xff, 0xff, 0x00]);
        assert_eq!(&buf[58..62], &[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&buf[62..], &data);
        assert_eq!(buf.len(), 66);
    }

    #[test]
    fn test_bmp_rgb_2x2_no_palette() {
        // Two rows of 2 RGB pixels, each row padded from 6 to 8 bytes.
        let data: Vec<u8> = (0..16).collect();
        let mut buf = Vec::new();
        write_bmp(&mut buf, PixelLayout::Rgb24, (2, 2), 72, &data).unwrap();

        assert_eq!(le32(&buf, 10), 54); // no palette before pixel data
        assert_eq!(le16(&buf, 28), 24);
        assert_eq!(le32(&buf, 46), 0);
        assert_eq!(le32(&buf, 34) as usize, data.len());
        assert_eq!(&buf[54..], &data[..]);
    }

    #[test]
    fn test_extension() {
        assert_eq!(OutputFormat::Pnm.extension(PixelLayout::PackedBits), "pbm");
        assert_eq!(OutputFormat::Pnm.extension(PixelLayout::Rgb24), "ppm");
        assert_eq!(OutputFormat::Bmp.extension(PixelLayout::PackedBits), "bmp");
    }
}
