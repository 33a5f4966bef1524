//! Text zones: recognized text with positional geometry.
//!
//! Zones form a tree (page > line > word > char) with bounding boxes in
//! document coordinates: origin at the bottom-left corner, y growing
//! upward. Engine output arrives in image coordinates (top-left origin)
//! and possibly rotated; this module maps it back and serializes the tree
//! into the edit-script body grammar.

use std::fmt;

use unicode_segmentation::UnicodeSegmentation;

use crate::djvu::Rotation;

/// Granularity of positional text zones requested from OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDetails {
    Lines,
    Words,
    Chars,
}

impl TextDetails {
    pub fn wants_words(self) -> bool {
        matches!(self, TextDetails::Words | TextDetails::Chars)
    }

    pub fn wants_chars(self) -> bool {
        matches!(self, TextDetails::Chars)
    }
}

/// Word segmentation policy applied when the engine's own segmentation is
/// insufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSegmentation {
    /// Split on whitespace.
    Simple,
    /// Unicode word boundaries (UAX #29).
    Uax29,
}

/// Axis-aligned bounding box, bottom-left origin, y up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BBox {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    /// Flip a top-left-origin box (hOCR convention) into bottom-left origin
    /// given the image height.
    pub fn flip_vertical(top_down: BBox, image_height: u32) -> Self {
        let h = image_height as i32;
        Self {
            x0: top_down.x0,
            y0: h - top_down.y1,
            x1: top_down.x1,
            y1: h - top_down.y0,
        }
    }

    /// Map a box in rendered-image coordinates into document coordinates,
    /// undoing the page rotation. `image_size` is the rendered size.
    pub fn unrotate(self, rotation: Rotation, image_size: (u32, u32)) -> Self {
        let (iw, ih) = (image_size.0 as i32, image_size.1 as i32);
        match rotation {
            Rotation::R0 => self,
            Rotation::R90 => Self {
                x0: self.y0,
                y0: iw - self.x1,
                x1: self.y1,
                y1: iw - self.x0,
            },
            Rotation::R180 => Self {
                x0: iw - self.x1,
                y0: ih - self.y1,
                x1: iw - self.x0,
                y1: ih - self.y0,
            },
            Rotation::R270 => Self {
                x0: ih - self.y1,
                y0: self.x0,
                x1: ih - self.y0,
                y1: self.x1,
            },
        }
    }
}

/// Kind of a text zone, page-outward to char-inward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Page,
    Column,
    Region,
    Para,
    Line,
    Word,
    Char,
}

impl ZoneKind {
    fn keyword(self) -> &'static str {
        match self {
            ZoneKind::Page => "page",
            ZoneKind::Column => "column",
            ZoneKind::Region => "region",
            ZoneKind::Para => "para",
            ZoneKind::Line => "line",
            ZoneKind::Word => "word",
            ZoneKind::Char => "char",
        }
    }
}

/// One node of the recognized-text tree. Leaves carry text; interior nodes
/// carry children.
#[derive(Debug, Clone)]
pub struct Zone {
    pub kind: ZoneKind,
    pub bbox: BBox,
    pub children: Vec<Zone>,
    pub text: Option<String>,
}

/// Recognized text for one page: a zone tree rooted at a page zone.
pub type TextResult = Zone;

impl Zone {
    pub fn branch(kind: ZoneKind, bbox: BBox, children: Vec<Zone>) -> Self {
        Self {
            kind,
            bbox,
            children,
            text: None,
        }
    }

    pub fn leaf(kind: ZoneKind, bbox: BBox, text: impl Into<String>) -> Self {
        Self {
            kind,
            bbox,
            children: Vec::new(),
            text: Some(text.into()),
        }
    }

    /// Map the whole tree from rendered-image coordinates into document
    /// coordinates.
    pub fn unrotate(&mut self, rotation: Rotation, image_size: (u32, u32)) {
        self.bbox = self.bbox.unrotate(rotation, image_size);
        for child in &mut self.children {
            child.unrotate(rotation, image_size);
        }
    }

    fn write_sexpr(&self, out: &mut String) {
        out.push('(');
        out.push_str(self.kind.keyword());
        let b = &self.bbox;
        out.push_str(&format!(" {} {} {} {}", b.x0, b.y0, b.x1, b.y1));
        if self.children.is_empty() {
            out.push(' ');
            write_sexpr_string(self.text.as_deref().unwrap_or(""), out);
        } else {
            for child in &self.children {
                out.push('\n');
                out.push(' ');
                child.write_sexpr(out);
            }
        }
        out.push(')');
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_sexpr(&mut out);
        f.write_str(&out)
    }
}

/// Quote a string for the s-expression grammar: backslash and double quote
/// are backslash-escaped, control bytes become octal escapes.
fn write_sexpr_string(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Split a line of text into word zones, distributing the line box
/// horizontally in proportion to character position.
pub fn segment_words(text: &str, line_box: BBox, policy: WordSegmentation) -> Vec<Zone> {
    let spans: Vec<(usize, &str)> = match policy {
        WordSegmentation::Simple => simple_word_indices(text),
        WordSegmentation::Uax29 => text
            .split_word_bound_indices()
            .filter(|(_, s)| !s.trim().is_empty())
            .collect(),
    };
    let total_chars = text.chars().count().max(1);
    let char_offset = |byte: usize| text[..byte].chars().count();
    spans
        .into_iter()
        .map(|(start, word)| {
            let begin = char_offset(start);
            let end = begin + word.chars().count();
            let bbox = BBox {
                x0: line_box.x0 + line_box.width() * begin as i32 / total_chars as i32,
                y0: line_box.y0,
                x1: line_box.x0 + line_box.width() * end as i32 / total_chars as i32,
                y1: line_box.y1,
            };
            Zone::leaf(ZoneKind::Word, bbox, word)
        })
        .collect()
}

/// Split a word zone into per-grapheme char zones, interpolating the word
/// box evenly. Used when the engine provides no character geometry.
pub fn segment_chars(text: &str, word_box: BBox) -> Vec<Zone> {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    let count = graphemes.len().max(1) as i32;
    graphemes
        .iter()
        .enumerate()
        .map(|(i, g)| {
            let bbox = BBox {
                x0: word_box.x0 + word_box.width() * i as i32 / count,
                y0: word_box.y0,
                x1: word_box.x0 + word_box.width() * (i as i32 + 1) / count,
                y1: word_box.y1,
            };
            Zone::leaf(ZoneKind::Char, bbox, *g)
        })
        .collect()
}

fn simple_word_indices(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                out.push((s, &text[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push((s, &text[s..]));
    }
    out
}
