//! hOCR output parsing, shared by engines that emit it.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{EngineError, ExtractContext};
use crate::zones::{segment_chars, segment_words, BBox, TextResult, Zone, ZoneKind};

fn bbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"bbox (\d+) (\d+) (\d+) (\d+)").unwrap())
}

fn selector(css: &str) -> Selector {
    // The selectors below are string literals and always parse.
    Selector::parse(css).expect("valid selector")
}

fn element_bbox(el: ElementRef<'_>) -> Option<BBox> {
    let title = el.value().attr("title")?;
    let caps = bbox_re().captures(title)?;
    Some(BBox::new(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
    ))
}

fn element_text(el: ElementRef<'_>) -> String {
    let raw: String = el.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an hOCR document into a page zone tree in document coordinates.
///
/// hOCR boxes use a top-left origin in rendered-image space; they are
/// flipped against the image height and then unrotated into document
/// coordinates.
pub fn extract_zones(html: &str, ctx: &ExtractContext) -> Result<TextResult, EngineError> {
    let document = Html::parse_document(html);
    let (iw, ih) = ctx.page_size;

    let line_sel = selector(".ocr_line, .ocr_header, .ocr_caption, .ocr_textfloat");
    let word_sel = selector(".ocrx_word, .ocr_word");

    let flip = |b: BBox| BBox::flip_vertical(b, ih);
    let mut lines = Vec::new();
    for line_el in document.select(&line_sel) {
        let Some(line_box) = element_bbox(line_el).map(flip) else {
            continue;
        };
        let line_text = element_text(line_el);
        if line_text.is_empty() {
            continue;
        }

        if !ctx.details.wants_words() {
            lines.push(Zone::leaf(ZoneKind::Line, line_box, line_text));
            continue;
        }

        let mut words: Vec<Zone> = line_el
            .select(&word_sel)
            .filter_map(|word_el| {
                let text = element_text(word_el);
                if text.is_empty() {
                    return None;
                }
                let bbox = element_bbox(word_el).map(flip)?;
                Some(Zone::leaf(ZoneKind::Word, bbox, text))
            })
            .collect();
        if words.is_empty() {
            // Engine gave no word geometry; fall back to the configured
            // segmentation policy over the line text.
            words = segment_words(&line_text, line_box, ctx.segmentation);
        }
        if ctx.details.wants_chars() {
            for word in &mut words {
                let text = word.text.take().unwrap_or_default();
                word.children = segment_chars(&text, word.bbox);
            }
        }
        if !words.is_empty() {
            lines.push(Zone::branch(ZoneKind::Line, line_box, words));
        }
    }

    let page_box = BBox::new(0, 0, iw as i32, ih as i32);
    let mut page = Zone::branch(ZoneKind::Page, page_box, lines);
    page.unrotate(ctx.rotation, ctx.page_size);
    Ok(page)
}
