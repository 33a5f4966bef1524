//! Scheduler behavior against a scripted page pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use djvuocr::engine::EngineError;
use djvuocr::pages::PageId;
use djvuocr::pipeline::{PagePipeline, PipelineError};
use djvuocr::scheduler::{self, SchedulerError};
use djvuocr::zones::{BBox, TextResult, Zone, ZoneKind};

/// Test double that produces canned results with configurable latency and
/// failures, recording every call.
#[derive(Default)]
struct FakePipeline {
    latency: HashMap<PageId, Duration>,
    fail_on: Option<PageId>,
    no_image: HashSet<PageId>,
    calls: Mutex<Vec<PageId>>,
}

impl PagePipeline for FakePipeline {
    fn process(&self, page: PageId) -> Result<TextResult, PipelineError> {
        self.calls.lock().unwrap().push(page);
        if let Some(d) = self.latency.get(&page) {
            thread::sleep(*d);
        }
        if self.fail_on == Some(page) {
            return Err(PipelineError::Engine(EngineError::MalformedOutput(
                format!("canned failure on page {page}"),
            )));
        }
        if self.no_image.contains(&page) {
            return Err(PipelineError::NoImage);
        }
        Ok(Zone::branch(
            ZoneKind::Page,
            BBox::new(0, 0, 100, 100),
            vec![Zone::leaf(
                ZoneKind::Word,
                BBox::new(0, 0, 10, 10),
                format!("p{page}"),
            )],
        ))
    }
}

fn page_list(pages: &[PageId]) -> Vec<(PageId, String)> {
    pages
        .iter()
        .map(|&p| (p, format!("p{p:04}.djvu")))
        .collect()
}

fn selected_ids(script: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(script)
        .lines()
        .filter_map(|l| l.strip_prefix("select "))
        .map(|l| l.trim_matches('\'').to_string())
        .collect()
}

#[test]
fn test_script_is_in_page_order_despite_latency() {
    // Early pages are the slowest, so later pages finish first.
    let pipeline = FakePipeline {
        latency: (1..=6)
            .map(|p| (p, Duration::from_millis(60 / p as u64)))
            .collect(),
        ..Default::default()
    };
    let pages = page_list(&[1, 2, 3, 4, 5, 6]);
    let mut script = Vec::new();
    scheduler::run(&pipeline, &pages, 3, false, &mut script).unwrap();

    let ids = selected_ids(&script);
    assert_eq!(
        ids,
        vec![
            "p0001.djvu",
            "p0002.djvu",
            "p0003.djvu",
            "p0004.djvu",
            "p0005.djvu",
            "p0006.djvu"
        ]
    );
}

#[test]
fn test_each_page_processed_exactly_once() {
    let pipeline = FakePipeline::default();
    let pages = page_list(&[1, 2, 3, 4, 5, 6, 7, 8]);
    let mut script = Vec::new();
    scheduler::run(&pipeline, &pages, 4, false, &mut script).unwrap();

    let mut calls = pipeline.calls.lock().unwrap().clone();
    calls.sort_unstable();
    assert_eq!(calls, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_failure_stops_run_and_is_reported() {
    // One worker makes the processing order deterministic: pages 1 and 2
    // succeed, page 3 fails, pages 4 and 5 are never claimed.
    let pipeline = FakePipeline {
        fail_on: Some(3),
        ..Default::default()
    };
    let pages = page_list(&[1, 2, 3, 4, 5]);
    let mut script = Vec::new();
    let err = scheduler::run(&pipeline, &pages, 1, false, &mut script).unwrap_err();

    match err {
        SchedulerError::Page { page, .. } => assert_eq!(page, 3),
        other => panic!("expected page failure, got {other}"),
    }
    assert_eq!(*pipeline.calls.lock().unwrap(), vec![1, 2, 3]);

    // The partial script holds the completed pages plus the failed page's
    // header, and nothing for the abandoned tail.
    let text = String::from_utf8(script).unwrap();
    let ids = selected_ids(text.as_bytes());
    assert_eq!(ids, vec!["p0001.djvu", "p0002.djvu", "p0003.djvu"]);
    assert!(text.contains("\"p1\""));
    assert!(text.contains("\"p2\""));
    assert!(!text.contains("\"p3\""));
}

#[test]
fn test_immediate_failure_claims_nothing_else() {
    let pipeline = FakePipeline {
        fail_on: Some(1),
        ..Default::default()
    };
    let pages = page_list(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    let mut script = Vec::new();
    scheduler::run(&pipeline, &pages, 1, false, &mut script).unwrap_err();
    assert_eq!(*pipeline.calls.lock().unwrap(), vec![1]);
}

#[test]
fn test_page_without_image_yields_empty_record() {
    let pipeline = FakePipeline {
        no_image: [2].into_iter().collect(),
        ..Default::default()
    };
    let pages = page_list(&[1, 2, 3]);
    let mut script = Vec::new();
    scheduler::run(&pipeline, &pages, 2, false, &mut script).unwrap();

    let text = String::from_utf8(script).unwrap();
    assert_eq!(
        selected_ids(text.as_bytes()),
        vec!["p0001.djvu", "p0002.djvu", "p0003.djvu"]
    );
    // Page 2's record has no body, just the terminator.
    assert!(text.contains("select 'p0002.djvu'\nset-txt\n.\n"));
    assert!(text.contains("\"p1\""));
    assert!(text.contains("\"p3\""));
}

#[test]
fn test_no_pages_is_a_no_op() {
    let pipeline = FakePipeline::default();
    let mut script = Vec::new();
    scheduler::run(&pipeline, &[], 4, false, &mut script).unwrap();
    assert!(script.is_empty());
    assert!(pipeline.calls.lock().unwrap().is_empty());
}

#[test]
fn test_clear_text_prepends_removal() {
    let pipeline = FakePipeline::default();
    let pages = page_list(&[1]);
    let mut script = Vec::new();
    scheduler::run(&pipeline, &pages, 1, true, &mut script).unwrap();
    let text = String::from_utf8(script).unwrap();
    assert!(text.starts_with("remove-txt\n"));
}

#[test]
fn test_sparse_page_selection() {
    let pipeline = FakePipeline::default();
    let pages = page_list(&[2, 5, 9]);
    let mut script = Vec::new();
    scheduler::run(&pipeline, &pages, 2, false, &mut script).unwrap();
    assert_eq!(
        selected_ids(&script),
        vec!["p0002.djvu", "p0005.djvu", "p0009.djvu"]
    );
}
