//! The shared page-result table.
//!
//! The single piece of shared mutable state in a run: a map from page id
//! to its processing state, guarded by one table-wide lock with a
//! condition variable for completion signaling. Page counts are modest,
//! so one lock for the whole table is preferred over per-entry locking;
//! contention is dominated by condition waits, not critical sections.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use crate::pages::PageId;
use crate::pipeline::PipelineError;
use crate::zones::TextResult;

/// Terminal result of one page.
#[derive(Debug, Clone)]
pub enum Outcome {
    Text(TextResult),
    /// The page had no image suitable for recognition; emitted as an empty
    /// text body.
    NoImage,
}

#[derive(Debug)]
enum Entry {
    Unclaimed,
    Claimed,
    Done(Outcome),
    Failed,
}

/// What the assembler observes when waiting on a page.
#[derive(Debug)]
pub enum PageStatus {
    Done(Outcome),
    /// The page's worker failed; the error is held by the table.
    Failed,
    /// The page was never claimed and the run was cancelled, so no result
    /// will ever arrive.
    Abandoned,
}

struct TableState {
    entries: BTreeMap<PageId, Entry>,
    first_failure: Option<(PageId, PipelineError)>,
}

/// Result table shared between workers and the assembler.
pub struct ResultTable {
    state: Mutex<TableState>,
    completed: Condvar,
    cancelled: AtomicBool,
}

impl ResultTable {
    pub fn new(pages: &[PageId]) -> Self {
        Self {
            state: Mutex::new(TableState {
                entries: pages.iter().map(|&p| (p, Entry::Unclaimed)).collect(),
                first_failure: None,
            }),
            completed: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Atomically take ownership of a page. Returns false when another
    /// worker already owns or finished it.
    pub fn claim(&self, page: PageId) -> bool {
        let mut state = self.state.lock().expect("result table poisoned");
        match state.entries.get_mut(&page) {
            Some(entry @ Entry::Unclaimed) => {
                *entry = Entry::Claimed;
                true
            }
            _ => false,
        }
    }

    /// Record a page's terminal outcome and wake all waiters. Must only be
    /// called by the worker that claimed the page.
    pub fn resolve(&self, page: PageId, outcome: Outcome) {
        let mut state = self.state.lock().expect("result table poisoned");
        debug_assert!(matches!(state.entries.get(&page), Some(Entry::Claimed)));
        state.entries.insert(page, Entry::Done(outcome));
        self.completed.notify_all();
    }

    /// Record a page failure, remember the first one, cancel the run, and
    /// wake all waiters.
    pub fn fail(&self, page: PageId, error: PipelineError) {
        let mut state = self.state.lock().expect("result table poisoned");
        state.entries.insert(page, Entry::Failed);
        if state.first_failure.is_none() {
            state.first_failure = Some((page, error));
        }
        self.cancelled.store(true, Ordering::SeqCst);
        self.completed.notify_all();
    }

    /// Block until the page reaches a terminal state, re-checking under the
    /// lock on every wake.
    pub fn await_page(&self, page: PageId) -> PageStatus {
        let mut state = self.state.lock().expect("result table poisoned");
        loop {
            match state.entries.get(&page) {
                Some(Entry::Done(outcome)) => return PageStatus::Done(outcome.clone()),
                Some(Entry::Failed) => return PageStatus::Failed,
                Some(Entry::Unclaimed) if self.is_cancelled() => return PageStatus::Abandoned,
                Some(Entry::Unclaimed) | Some(Entry::Claimed) => {
                    state = self
                        .completed
                        .wait(state)
                        .expect("result table poisoned");
                }
                None => return PageStatus::Abandoned,
            }
        }
    }

    /// Take the first recorded failure, if any. Yields once.
    pub fn take_failure(&self) -> Option<(PageId, PipelineError)> {
        self.state
            .lock()
            .expect("result table poisoned")
            .first_failure
            .take()
    }

    /// Stop workers from claiming further pages. In-flight pages finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.completed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Number of pages in a terminal state. Test and diagnostics helper.
    pub fn terminal_count(&self) -> usize {
        let state = self.state.lock().expect("result table poisoned");
        state
            .entries
            .values()
            .filter(|e| matches!(e, Entry::Done(_) | Entry::Failed))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::engine::EngineError;
    use crate::zones::{BBox, Zone, ZoneKind};

    fn failure() -> PipelineError {
        PipelineError::Engine(EngineError::MalformedOutput("boom".to_string()))
    }

    #[test]
    fn test_claim_is_exclusive() {
        let table = Arc::new(ResultTable::new(&[1]));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || table.claim(1)));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_claim_unknown_page() {
        let table = ResultTable::new(&[1, 2]);
        assert!(!table.claim(3));
    }

    #[test]
    fn test_await_blocks_until_resolve() {
        let table = Arc::new(ResultTable::new(&[7]));
        assert!(table.claim(7));
        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.await_page(7))
        };
        thread::sleep(Duration::from_millis(20));
        table.resolve(
            7,
            Outcome::Text(Zone::branch(ZoneKind::Page, BBox::new(0, 0, 1, 1), vec![])),
        );
        match waiter.join().unwrap() {
            PageStatus::Done(Outcome::Text(_)) => {}
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_cancels_and_is_taken_once() {
        let table = ResultTable::new(&[1, 2]);
        assert!(table.claim(1));
        table.fail(1, failure());
        assert!(table.is_cancelled());
        match table.await_page(1) {
            PageStatus::Failed => {}
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(table.take_failure().is_some());
        assert!(table.take_failure().is_none());
    }

    #[test]
    fn test_unclaimed_page_abandoned_after_cancel() {
        let table = ResultTable::new(&[1, 2]);
        table.cancel();
        match table.await_page(2) {
            PageStatus::Abandoned => {}
            other => panic!("expected Abandoned, got {other:?}"),
        }
    }

    #[test]
    fn test_terminal_count() {
        let table = ResultTable::new(&[1, 2, 3]);
        assert_eq!(table.terminal_count(), 0);
        assert!(table.claim(2));
        table.resolve(2, Outcome::NoImage);
        assert_eq!(table.terminal_count(), 1);
    }
}
