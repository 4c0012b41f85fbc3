//! Cursor instrumentation for tests.
//!
//! [`InstrumentedCursor`] wraps any [`SegmentCursor`] and counts rescans and
//! fetches, so tests can assert that a code path hit (or avoided) the index.
//! What makes the forward-probe heuristic worth having is how few rescans it
//! performs, not just what it returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lode_result::Result;

use crate::traits::SegmentCursor;
use crate::types::{ScanDirection, SeekBound, Segment};

#[derive(Default)]
pub struct CursorStats {
    rescans: AtomicU64,
    fetches: AtomicU64,
}

impl CursorStats {
    pub fn rescans(&self) -> u64 {
        self.rescans.load(Ordering::Relaxed)
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

pub struct InstrumentedCursor {
    inner: Box<dyn SegmentCursor>,
    stats: Arc<CursorStats>,
}

impl InstrumentedCursor {
    pub fn new(inner: Box<dyn SegmentCursor>) -> (Self, Arc<CursorStats>) {
        let stats = Arc::new(CursorStats::default());
        (
            Self {
                inner,
                stats: Arc::clone(&stats),
            },
            stats,
        )
    }
}

impl SegmentCursor for InstrumentedCursor {
    fn rescan(&mut self, bound: SeekBound) -> Result<()> {
        self.stats.rescans.fetch_add(1, Ordering::Relaxed);
        self.inner.rescan(bound)
    }

    fn next(&mut self, direction: ScanDirection) -> Result<Option<Segment>> {
        self.stats.fetches.fetch_add(1, Ordering::Relaxed);
        self.inner.next(direction)
    }
}
