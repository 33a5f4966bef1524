//! Page identifiers and page-range parsing.

use thiserror::Error;

/// 1-based page number within the source document.
pub type PageId = u32;

/// Errors from parsing a `--pages` specification.
#[derive(Debug, Error)]
pub enum PageRangeError {
    #[error("invalid page number: {0:?}")]
    InvalidNumber(String),
    #[error("page numbers start at 1")]
    Zero,
}

/// Parse a page-range specification like `17`, `37-42`, or `17,37-42`.
///
/// A reversed range (`42-37`) yields no pages rather than an error, and
/// `17-17` yields a single page. Order and duplicates are preserved; the
/// caller decides whether to sort.
pub fn parse_page_numbers(spec: &str) -> Result<Vec<PageId>, PageRangeError> {
    let mut pages = Vec::new();
    for part in spec.split(',') {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_page(lo)?;
                let hi = parse_page(hi)?;
                pages.extend(lo..=hi);
            }
            None => pages.push(parse_page(part)?),
        }
    }
    Ok(pages)
}

fn parse_page(text: &str) -> Result<PageId, PageRangeError> {
    let n: PageId = text
        .trim()
        .parse()
        .map_err(|_| PageRangeError::InvalidNumber(text.to_string()))?;
    if n == 0 {
        return Err(PageRangeError::Zero);
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_page() {
        assert_eq!(parse_page_numbers("17").unwrap(), vec![17]);
    }

    #[test]
    fn test_range() {
        assert_eq!(
            parse_page_numbers("37-42").unwrap(),
            vec![37, 38, 39, 40, 41, 42]
        );
    }

    #[test]
    fn test_mixed() {
        assert_eq!(
            parse_page_numbers("17,37-42").unwrap(),
            vec![17, 37, 38, 39, 40, 41, 42]
        );
    }

    #[test]
    fn test_reversed_range_is_empty() {
        assert_eq!(parse_page_numbers("42-37").unwrap(), Vec::<PageId>::new());
    }

    #[test]
    fn test_degenerate_range() {
        assert_eq!(parse_page_numbers("17-17").unwrap(), vec![17]);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_page_numbers("seventeen").is_err());
        assert!(parse_page_numbers("1,,3").is_err());
        assert!(parse_page_numbers("0").is_err());
    }
}
