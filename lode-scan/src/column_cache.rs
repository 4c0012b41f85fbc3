//! Row-id → value lookups for lazily-read columns.
//!
//! Forward iteration produces mostly-increasing row ids with occasional
//! multi-chunk jumps, so each column keeps one cached segment and an index
//! cursor positioned just past it. A lookup inside the cached run is free;
//! a lookup slightly ahead probes the cursor forward a bounded number of
//! steps before giving up and paying a full index seek. The heuristic is a
//! pure optimization: both paths must produce identical values.

use arrow::array::ArrayRef;
use lode_result::Result;
use lode_storage::{ColumnIndex, ScanDirection, SeekBound, Segment, SegmentCursor};
use lode_types::{CellValue, RowId, cell_at};

/// Cursor steps a forward probe may take before falling back to a seek.
const FORWARD_PROBE_STEPS: usize = 2;

/// The currently cached run of one column.
///
/// `max` is `min + len`: one *past* the last stored slot, yet the hit test
/// treats it as inside the run. The one-off inclusivity is deliberate: a
/// row id landing exactly on the boundary must be served from this run (as
/// a null) rather than trigger a reseek.
struct CachedRun {
    values: ArrayRef,
    min: RowId,
    max: RowId,
}

impl CachedRun {
    fn new(segment: Segment) -> Self {
        let min = segment.start;
        let max = segment.end();
        Self {
            values: segment.values,
            min,
            max,
        }
    }

    #[inline]
    fn contains(&self, rowid: RowId) -> bool {
        self.min <= rowid && rowid <= self.max
    }

    fn cell(&self, rowid: RowId) -> Option<CellValue> {
        cell_at(&self.values, (rowid - self.min) as usize)
    }
}

/// Per-column lookup state: one cached run plus its index cursor.
pub struct ColumnReader {
    cursor: Box<dyn SegmentCursor>,
    cache: Option<CachedRun>,
}

impl ColumnReader {
    pub fn new(index: &dyn ColumnIndex) -> Result<Self> {
        Ok(Self {
            cursor: index.begin_scan()?,
            cache: None,
        })
    }

    /// Wrap an existing cursor; lets tests observe seek traffic.
    pub fn with_cursor(cursor: Box<dyn SegmentCursor>) -> Self {
        Self {
            cursor,
            cache: None,
        }
    }

    /// Resolve one row id to its stored value, `None` for nulls and for row
    /// ids no segment covers.
    pub fn lookup(&mut self, rowid: RowId) -> Result<Option<CellValue>> {
        if let Some(run) = &self.cache {
            if run.contains(rowid) {
                return Ok(run.cell(rowid));
            }
        }

        // The supplied row id is near enough ahead of the cached run that
        // stepping the index forward is likely cheaper than a fresh seek:
        // the threshold is twice the cached run's width past its end.
        if let Some(run) = &self.cache {
            if rowid > run.max && rowid < run.max + 2 * (run.max - run.min) {
                for _ in 0..FORWARD_PROBE_STEPS {
                    let Some(segment) = self.cursor.next(ScanDirection::Forward)? else {
                        break;
                    };
                    if segment.start <= rowid && rowid <= segment.end() {
                        let run = CachedRun::new(segment);
                        let cell = run.cell(rowid);
                        self.cache = Some(run);
                        return Ok(cell);
                    }
                }
            }
        }

        // Full seek: fetch the last segment at or before the row id, then
        // park the cursor just past the new run so the next sequential miss
        // resumes as a pure forward read.
        self.cache = None;
        self.cursor.rescan(SeekBound::UpperInclusive(rowid))?;
        let Some(segment) = self.cursor.next(ScanDirection::Backward)? else {
            // Nothing stored at or before this row id.
            return Ok(None);
        };
        let run = CachedRun::new(segment);
        let cell = run.cell(rowid);
        self.cursor.rescan(SeekBound::LowerExclusive(run.max))?;
        self.cache = Some(run);
        Ok(cell)
    }

    /// Row-id interval of the cached run, if any. Test observability.
    pub fn cached_range(&self) -> Option<(RowId, RowId)> {
        self.cache.as_ref().map(|run| (run.min, run.max))
    }

    /// Discard the cache and reposition the cursor; used by rescan.
    pub fn reset(&mut self) -> Result<()> {
        self.cache = None;
        self.cursor.rescan(SeekBound::Unbounded)
    }
}
