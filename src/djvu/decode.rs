//! DjVuLibre-backed document decoding.
//!
//! Metadata comes from `djvused` (component listing, per-page geometry) and
//! pixel data from `ddjvu` (rendered to PNM on stdout, then reparsed into
//! raw rows). Both are blocking subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::OnceLock;

use regex::Regex;

use super::{
    DecodeError, DocumentSource, PageJob, PixelLayout, RenderLayers, Rotation, RowOrder,
};
use crate::ipc::{self, IpcError};
use crate::pages::PageId;

fn ls_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(\d+)\s+P\s+\d+\s+(\S.*?)\s*$").unwrap())
}

fn dump_info_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"DjVu (\d+)x(\d+).*?(\d+) dpi").unwrap())
}

fn dump_rotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"orientation[= ](\d+)").unwrap())
}

/// A DjVu document opened through DjVuLibre's command-line tools.
pub struct DjvuDocument {
    path: PathBuf,
    /// Component file id per page, in page order.
    page_ids: Vec<String>,
}

impl DjvuDocument {
    /// Open a document and read its page directory.
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let output =
            ipc::run_output(Command::new("djvused").arg(path).args(["-u", "-e", "ls"]))?;
        let listing = String::from_utf8_lossy(&output.stdout);
        let mut page_ids: Vec<String> = ls_line_re()
            .captures_iter(&listing)
            .map(|c| c[2].to_string())
            .collect();
        if page_ids.is_empty() {
            // Single-page documents have no directory; the page's file id is
            // the document itself.
            let count = Self::page_count_of(path)?;
            if count == 1 {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                page_ids.push(name);
            } else {
                return Err(DecodeError::MalformedOutput {
                    tool: "djvused".to_string(),
                    detail: format!("no page listing for a {count}-page document"),
                });
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            page_ids,
        })
    }

    fn page_count_of(path: &Path) -> Result<usize, DecodeError> {
        let output = ipc::run_output(Command::new("djvused").arg(path).args(["-e", "n"]))?;
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse()
            .map_err(|_| DecodeError::MalformedOutput {
                tool: "djvused".to_string(),
                detail: format!("unexpected page count: {:?}", text.trim()),
            })
    }

    fn check_page(&self, page: PageId) -> Result<(), DecodeError> {
        if page == 0 || page as usize > self.page_ids.len() {
            return Err(DecodeError::PageOutOfRange(page));
        }
        Ok(())
    }
}

impl DocumentSource for DjvuDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_file_id(&self, page: PageId) -> Result<String, DecodeError> {
        self.check_page(page)?;
        Ok(self.page_ids[page as usize - 1].clone())
    }

    fn decode_page(&self, page: PageId) -> Result<Box<dyn PageJob>, DecodeError> {
        self.check_page(page)?;
        let output = ipc::run_output(Command::new("djvused").arg(&self.path).args([
            "-e",
            &format!("select {page}; dump"),
        ]))?;
        let dump = String::from_utf8_lossy(&output.stdout);
        let info = dump_info_re()
            .captures(&dump)
            .ok_or_else(|| DecodeError::MalformedOutput {
                tool: "djvused".to_string(),
                detail: format!("no INFO record in dump of page {page}"),
            })?;
        let width: u32 = info[1].parse().unwrap_or(0);
        let height: u32 = info[2].parse().unwrap_or(0);
        let dpi: u32 = info[3].parse().unwrap_or(300);
        if width == 0 || height == 0 {
            return Err(DecodeError::NotAvailable);
        }
        let rotation = dump_rotation_re()
            .captures(&dump)
            .and_then(|c| c[1].parse::<u32>().ok())
            .map(Rotation::from_quarter_turns)
            .unwrap_or_default();
        Ok(Box::new(DjvuPageJob {
            path: self.path.clone(),
            page,
            size: (width, height),
            dpi,
            rotation,
        }))
    }
}

struct DjvuPageJob {
    path: PathBuf,
    page: PageId,
    size: (u32, u32),
    dpi: u32,
    rotation: Rotation,
}

impl PageJob for DjvuPageJob {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn dpi(&self) -> u32 {
        self.dpi
    }

    fn rotation(&self) -> Rotation {
        self.rotation
    }

    fn render(
        &self,
        layers: RenderLayers,
        layout: PixelLayout,
        order: RowOrder,
        row_alignment: usize,
    ) -> Result<Vec<u8>, DecodeError> {
        let (format, mode) = match layers {
            RenderLayers::Mask => ("pbm", "mask"),
            RenderLayers::Foreground => ("ppm", "foreground"),
            RenderLayers::Color => ("ppm", "color"),
        };
        let mut cmd = Command::new("ddjvu");
        cmd.arg(format!("-format={format}"))
            .arg(format!("-mode={mode}"))
            .arg(format!("-page={}", self.page))
            .arg(&self.path);
        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IpcError::NotFound {
                    command: "ddjvu".to_string(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };
        check_render_output(&output)?;
        let (width, height, data) = parse_pnm(&output.stdout, layout)?;
        if (width, height) != self.size {
            return Err(DecodeError::MalformedOutput {
                tool: "ddjvu".to_string(),
                detail: format!(
                    "rendered {width}x{height}, expected {}x{}",
                    self.size.0, self.size.1
                ),
            });
        }
        Ok(repack_rows(
            data,
            layout.row_bytes(width),
            height as usize,
            row_alignment,
            order,
        ))
    }
}

/// Map a ddjvu run to `Ok` (pixel data present), [`DecodeError::NotAvailable`]
/// (the requested layer does not exist for this page), or a fatal error.
///
/// Only a missing layer is non-fatal: a clean exit with no pixel data, or a
/// nonzero exit whose diagnostic names the layer. A renderer killed by a
/// signal or failing for any other reason aborts the run.
fn check_render_output(output: &Output) -> Result<(), DecodeError> {
    match ipc::check_status("ddjvu", output.status) {
        Ok(()) => {
            if output.stdout.is_empty() {
                return Err(DecodeError::NotAvailable);
            }
            Ok(())
        }
        Err(IpcError::NonZeroExit { .. })
            if output.stdout.is_empty() && missing_layer_diagnostic(&output.stderr) =>
        {
            Err(DecodeError::NotAvailable)
        }
        Err(e) => Err(e.into()),
    }
}

fn missing_layer_diagnostic(stderr: &[u8]) -> bool {
    let text = String::from_utf8_lossy(stderr).to_lowercase();
    text.contains("layer") || text.contains("cannot render")
}

/// Parse a binary PBM (`P4`) or PPM (`P6`) image, returning its dimensions
/// and raw pixel rows (top-down, byte-packed per row).
fn parse_pnm(bytes: &[u8], layout: PixelLayout) -> Result<(u32, u32, &[u8]), DecodeError> {
    let expected_magic: &[u8] = match layout {
        PixelLayout::PackedBits => b"P4",
        PixelLayout::Rgb24 => b"P6",
    };
    let malformed = |detail: String| DecodeError::MalformedOutput {
        tool: "ddjvu".to_string(),
        detail,
    };
    if bytes.len() < 2 || &bytes[..2] != expected_magic {
        return Err(malformed(format!(
            "expected {} image",
            String::from_utf8_lossy(expected_magic)
        )));
    }
    let mut pos = 2;
    let field_count = match layout {
        PixelLayout::PackedBits => 2, // width, height
        PixelLayout::Rgb24 => 3,      // width, height, maxval
    };
    let mut fields = [0u32; 3];
    for field in fields.iter_mut().take(field_count) {
        // Skip whitespace and comment lines between header fields.
        loop {
            match bytes.get(pos) {
                Some(b) if b.is_ascii_whitespace() => pos += 1,
                Some(b'#') => {
                    while pos < bytes.len() && bytes[pos] != b'\n' {
                        pos += 1;
                    }
                }
                Some(_) => break,
                None => return Err(malformed("truncated header".to_string())),
            }
        }
        let start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        let text = std::str::from_utf8(&bytes[start..pos]).unwrap_or("");
        *field = text
            .parse()
            .map_err(|_| malformed("bad header field".to_string()))?;
    }
    // Exactly one whitespace byte separates the header from pixel data.
    match bytes.get(pos) {
        Some(b) if b.is_ascii_whitespace() => pos += 1,
        _ => return Err(malformed("missing header terminator".to_string())),
    }
    let (width, height) = (fields[0], fields[1]);
    let expected = layout.row_bytes(width) * height as usize;
    let data = &bytes[pos..];
    if data.len() < expected {
        return Err(malformed(format!(
            "short pixel data: {} < {expected}",
            data.len()
        )));
    }
    Ok((width, height, &data[..expected]))
}

/// Re-stride rows to the requested alignment and vertical order.
fn repack_rows(
    data: &[u8],
    src_stride: usize,
    rows: usize,
    row_alignment: usize,
    order: RowOrder,
) -> Vec<u8> {
    let alignment = row_alignment.max(1);
    let dst_stride = (src_stride + alignment - 1) / alignment * alignment;
    if dst_stride == src_stride && order == RowOrder::TopDown {
        return data.to_vec();
    }
    let mut out = vec![0u8; dst_stride * rows];
    for row in 0..rows {
        let src_row = match order {
            RowOrder::TopDown => row,
            RowOrder::BottomUp => rows - 1 - row,
        };
        let src = &data[src_row * src_stride..src_row * src_stride + src_stride];
        out[row * dst_stride..row * dst_stride + src_stride].copy_from_slice(src);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pbm() {
        let bytes = b"P4\n# comment\n10 2\n\x01\x02\x03\x04";
        let (w, h, data) = parse_pnm(bytes, PixelLayout::PackedBits).unwrap();
        assert_eq!((w, h), (10, 2));
        assert_eq!(data, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_ppm() {
        let mut bytes = b"P6 2 1 255\n".to_vec();
        bytes.extend_from_slice(&[10, 20, 30, 40, 50, 60]);
        let (w, h, data) = parse_pnm(&bytes, PixelLayout::Rgb24).unwrap();
        assert_eq!((w, h), (2, 1));
        assert_eq!(data.len(), 6);
    }

    #[test]
    fn test_parse_pnm_wrong_magic() {
        assert!(parse_pnm(b"P6 1 1 255\nxxx", PixelLayout::PackedBits).is_err());
    }

    #[test]
    fn test_parse_pnm_short_data() {
        assert!(parse_pnm(b"P4\n16 2\n\x00", PixelLayout::PackedBits).is_err());
    }

    #[test]
    fn test_repack_identity() {
        let data = [1u8, 2, 3, 4];
        assert_eq!(repack_rows(&data, 2, 2, 1, RowOrder::TopDown), data);
    }

    #[test]
    fn test_repack_aligned_bottom_up() {
        let data = [1u8, 2, 3, 4];
        let out = repack_rows(&data, 2, 2, 4, RowOrder::BottomUp);
        assert_eq!(out, vec![3, 4, 0, 0, 1, 2, 0, 0]);
    }

    #[cfg(unix)]
    fn render_output(raw_status: i32, stdout: &[u8], stderr: &[u8]) -> Output {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: std::process::ExitStatus::from_raw(raw_status),
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_render_clean_exit_with_data() {
        let out = render_output(0, b"P4\n1 1\n\x80", b"");
        assert!(check_render_output(&out).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_render_clean_exit_without_data_is_not_available() {
        let out = render_output(0, b"", b"");
        assert!(matches!(
            check_render_output(&out),
            Err(DecodeError::NotAvailable)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_render_missing_layer_diagnostic_is_not_available() {
        // Exit code 10 is raw status 10 << 8.
        let out = render_output(10 << 8, b"", b"ddjvu: cannot render foreground layer\n");
        assert!(matches!(
            check_render_output(&out),
            Err(DecodeError::NotAvailable)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_render_unrelated_exit_is_fatal() {
        let out = render_output(10 << 8, b"", b"ddjvu: out of memory\n");
        match check_render_output(&out) {
            Err(DecodeError::Ipc(IpcError::NonZeroExit { code, .. })) => assert_eq!(code, 10),
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_render_killed_by_signal_is_fatal() {
        // A raw wait status equal to the signal number means the child was
        // killed, no matter what made it onto stdout or stderr first.
        let out = render_output(9, b"", b"");
        match check_render_output(&out) {
            Err(DecodeError::Ipc(IpcError::Interrupted { signal, .. })) => {
                assert_eq!(signal, "SIGKILL");
            }
            other => panic!("expected Interrupted, got {other:?}"),
        }
    }

    #[test]
    fn test_ls_listing_parse() {
        let listing = "     1 P    23478  p0001.djvu\n     2 P     9031  p0002.djvu\n       A       53  shared_anno.iff\n";
        let ids: Vec<_> = ls_line_re()
            .captures_iter(listing)
            .map(|c| c[2].to_string())
            .collect();
        assert_eq!(ids, vec!["p0001.djvu", "p0002.djvu"]);
    }

    #[test]
    fn test_dump_info_parse() {
        let dump = "  FORM:DJVU [25871] \n    INFO [10]         DjVu 2550x3300, v24, 300 dpi, gamma=2.2\n";
        let c = dump_info_re().captures(dump).unwrap();
        assert_eq!(&c[1], "2550");
        assert_eq!(&c[2], "3300");
        assert_eq!(&c[3], "300");
    }
}
