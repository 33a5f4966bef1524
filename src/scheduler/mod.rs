//! Concurrent page scheduling.
//!
//! A fixed pool of worker threads claims pages from the shared
//! [`ResultTable`] and runs the per-page pipeline, while the calling
//! thread plays assembler: it walks the pages in ascending order, writes
//! each page's script record as soon as that page's result is available,
//! and never reorders or buffers whole-document state. The first page
//! failure cancels the run; in-flight pages finish, unclaimed pages are
//! never started.

mod table;

pub use table::{Outcome, PageStatus, ResultTable};

use std::io::{self, Write};
use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pages::PageId;
use crate::pipeline::{PagePipeline, PipelineError};
use crate::script;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("page {page}: {source}")]
    Page {
        page: PageId,
        source: PipelineError,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why the assembler stopped before finishing all pages.
enum Stop {
    /// Some page failed; the error is in the table.
    Failure(PageId),
    Io(io::Error),
}

fn worker_loop(
    pipeline: &dyn PagePipeline,
    table: &ResultTable,
    pages: &[PageId],
) -> Result<(), PageId> {
    for &page in pages {
        if table.is_cancelled() {
            return Ok(());
        }
        if !table.claim(page) {
            continue;
        }
        info!(page, "processing page");
        match pipeline.process(page) {
            Ok(text) => table.resolve(page, Outcome::Text(text)),
            Err(e) if e.is_no_image() => {
                warn!(page, "no image suitable for OCR, page left textless");
                table.resolve(page, Outcome::NoImage);
            }
            Err(e) => {
                table.fail(page, e);
                return Err(page);
            }
        }
    }
    Ok(())
}

/// Write the edit script incrementally as results arrive, in page order.
fn assemble(
    table: &ResultTable,
    pages: &[(PageId, String)],
    clear_text: bool,
    out: &mut dyn Write,
) -> Result<(), Stop> {
    if clear_text {
        script::write_remove_text(out).map_err(Stop::Io)?;
    }
    for (page, file_id) in pages {
        // The header goes out before the result is known; a failed run
        // leaves a truncated script, kept for recovery but never applied.
        script::write_page_header(out, file_id).map_err(Stop::Io)?;
        match table.await_page(*page) {
            PageStatus::Done(Outcome::Text(zone)) => {
                script::write_page_body(out, Some(&zone)).map_err(Stop::Io)?;
            }
            PageStatus::Done(Outcome::NoImage) => {
                script::write_page_body(out, None).map_err(Stop::Io)?;
            }
            PageStatus::Failed | PageStatus::Abandoned => return Err(Stop::Failure(*page)),
        }
        debug!(page, "script record written");
    }
    Ok(())
}

/// Run OCR over `pages` with `workers` concurrent page workers, writing
/// the djvused edit script to `out`.
///
/// `pages` must be sorted ascending and free of duplicates; each entry
/// pairs a page number with its document file id. Returns after all
/// workers have stopped; on failure the first page error is surfaced.
/// Script output written up to that point stays intact, since re-running
/// recognition is expensive.
pub fn run(
    pipeline: &dyn PagePipeline,
    pages: &[(PageId, String)],
    workers: usize,
    clear_text: bool,
    out: &mut dyn Write,
) -> Result<(), SchedulerError> {
    debug_assert!(pages.windows(2).all(|w| w[0].0 < w[1].0));
    let workers = workers.max(1);
    let page_ids: Vec<PageId> = pages.iter().map(|(p, _)| *p).collect();
    let table = ResultTable::new(&page_ids);

    let assembled = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for n in 0..workers {
            let builder = thread::Builder::new().name(format!("ocr-worker-{n}"));
            let handle = builder
                .spawn_scoped(scope, || worker_loop(pipeline, &table, &page_ids))
                .map_err(|e| {
                    table.cancel();
                    Stop::Io(e)
                })?;
            handles.push(handle);
        }

        let assembled = assemble(&table, pages, clear_text, out);
        if assembled.is_err() {
            // Covers the io::Error path; page failures have already
            // cancelled the table themselves.
            table.cancel();
        }
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(page)) => debug!(page, "worker stopped after page failure"),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        assembled
    });

    match assembled {
        Ok(()) => Ok(()),
        Err(Stop::Io(e)) => Err(SchedulerError::Io(e)),
        Err(Stop::Failure(awaited)) => match table.take_failure() {
            Some((page, source)) => Err(SchedulerError::Page { page, source }),
            // Unreachable in practice: a page only ends up failed or
            // abandoned once a failure was recorded.
            None => Err(SchedulerError::Io(io::Error::other(format!(
                "page {awaited} produced no result"
            )))),
        },
    }
}
