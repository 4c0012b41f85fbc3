use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};

use lode_scan::ColumnReader;
use lode_storage::mem::MemCatalog;
use lode_storage::{ColumnIndex, CursorStats, InstrumentedCursor, Segment};
use lode_types::{CellValue, RowId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Segment whose value at covered row id `r` is `r as i64`.
fn ident_segment(start: RowId, len: usize) -> Segment {
    let values: ArrayRef = Arc::new(Int64Array::from(
        (start..start + len as RowId).map(|v| v as i64).collect::<Vec<_>>(),
    ));
    Segment { start, values }
}

fn instrumented_reader(segments: Vec<Segment>) -> (ColumnReader, Arc<CursorStats>) {
    let catalog = MemCatalog::new();
    let index = catalog.install_column_index("c.idx", segments);
    let (cursor, stats) = InstrumentedCursor::new(index.begin_scan().unwrap());
    (ColumnReader::with_cursor(Box::new(cursor)), stats)
}

#[test]
fn boundary_rowid_hits_the_cached_run_without_reseeking() {
    // Run covering [100, 110), queried at exactly 110: the inclusive upper
    // bound serves it from the cache (as a null), not via a new seek.
    let (mut reader, stats) = instrumented_reader(vec![ident_segment(100, 10)]);

    assert_eq!(reader.lookup(105).unwrap(), Some(CellValue::Int64(105)));
    assert_eq!(reader.cached_range(), Some((100, 110)));
    let rescans_after_install = stats.rescans();

    assert_eq!(reader.lookup(110).unwrap(), None);
    assert_eq!(stats.rescans(), rescans_after_install, "no reseek at the boundary");
    assert_eq!(reader.cached_range(), Some((100, 110)), "run still cached");
}

#[test]
fn monotone_iteration_needs_only_the_initial_seek() {
    // Gapped runs of 8 rows every 16. After the first full seek the cursor
    // sits just past the cached run, so each later segment arrives through
    // the forward probe.
    let segments: Vec<Segment> = (0..32).map(|i| ident_segment(i * 16, 8)).collect();
    let (mut reader, stats) = instrumented_reader(segments);

    assert_eq!(reader.lookup(1).unwrap(), Some(CellValue::Int64(1)));
    let baseline = stats.rescans();

    for i in 1..32u64 {
        let rowid = i * 16 + 3;
        assert_eq!(reader.lookup(rowid).unwrap(), Some(CellValue::Int64(rowid as i64)));
    }
    assert_eq!(stats.rescans(), baseline, "forward probes replaced every seek");
}

#[test]
fn far_jump_falls_back_to_a_full_seek() {
    let segments: Vec<Segment> = (0..32).map(|i| ident_segment(i * 16, 8)).collect();
    let (mut reader, stats) = instrumented_reader(segments);

    assert_eq!(reader.lookup(3).unwrap(), Some(CellValue::Int64(3)));
    let baseline = stats.rescans();

    // 400 is far outside the probe window of run [0, 8].
    assert_eq!(reader.lookup(400).unwrap(), Some(CellValue::Int64(400)));
    assert!(stats.rescans() > baseline, "jump must reseek");
    assert_eq!(reader.cached_range(), Some((400, 408)));
}

#[test]
fn uncovered_rowids_come_back_null() {
    let (mut reader, _) = instrumented_reader(vec![ident_segment(64, 8)]);

    // Before any stored segment: the upper-inclusive seek finds nothing.
    assert_eq!(reader.lookup(10).unwrap(), None);
    assert_eq!(reader.cached_range(), None);

    // In the gap after a stored segment: the seek lands on a run that does
    // not reach the row id.
    assert_eq!(reader.lookup(200).unwrap(), None);
}

#[test]
fn probe_and_full_seek_agree_everywhere() {
    // The heuristic is an optimization, never an approximation: a persistent
    // reader (which probes) and a fresh reader per query (which always pays
    // the full seek) must agree on every lookup of a randomized workload.
    let mut rng = StdRng::seed_from_u64(0x10DE_5CA1);

    // Runs stay gapped (segment ends never touch the next start) so the
    // inclusive-boundary rule resolves identically on both paths.
    let mut segments = Vec::new();
    let mut start: RowId = 0;
    for _ in 0..64 {
        start += (1 + rng.gen_range(0..4)) * 8;
        let len = 8 * rng.gen_range(1..5) as usize;
        segments.push(ident_segment(start, len));
        start += len as RowId;
    }
    let last_end = start;

    let catalog = MemCatalog::new();
    let index = catalog.install_column_index("c.idx", segments);

    let mut persistent = ColumnReader::with_cursor(index.begin_scan().unwrap());

    // Mostly-monotone row ids with occasional jumps, like chunk iteration
    // with multi-chunk skips.
    let mut rowid: RowId = 0;
    for _ in 0..512 {
        rowid = if rng.gen_bool(0.15) {
            rng.gen_range(0..last_end + 16)
        } else {
            (rowid + rng.gen_range(1..12)).min(last_end + 16)
        };
        let probed = persistent.lookup(rowid).unwrap();
        let mut fresh = ColumnReader::with_cursor(index.begin_scan().unwrap());
        let sought = fresh.lookup(rowid).unwrap();
        assert_eq!(probed, sought, "divergence at rowid {rowid}");
    }
}

#[test]
fn reset_discards_the_cache() {
    let (mut reader, _) = instrumented_reader(vec![ident_segment(0, 8)]);
    assert_eq!(reader.lookup(2).unwrap(), Some(CellValue::Int64(2)));
    assert!(reader.cached_range().is_some());
    reader.reset().unwrap();
    assert_eq!(reader.cached_range(), None);
    assert_eq!(reader.lookup(2).unwrap(), Some(CellValue::Int64(2)));
}
