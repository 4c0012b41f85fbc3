use std::sync::Arc;
use std::time::Duration;

use arrow::array::{ArrayRef, Int64Array};
use arrow::buffer::BooleanBuffer;
use arrow::datatypes::DataType;

use lode_device::HostDevice;
use lode_result::Error;
use lode_scan::{ScanConfig, ScanDescriptor, ScanRow, ScanSession};
use lode_storage::mem::{MemCatalog, TableBuilder};
use lode_types::{CellValue, ColumnOrdinal, Predictability, RowId};
use rustc_hash::FxHashSet;

fn all_live(n: usize) -> BooleanBuffer {
    BooleanBuffer::collect_bool(n, |_| true)
}

fn ident_array(start: RowId, len: usize) -> ArrayRef {
    Arc::new(Int64Array::from(
        (start..start + len as RowId).map(|v| v as i64).collect::<Vec<_>>(),
    ))
}

fn config(chunk_size: usize, max_async: usize) -> ScanConfig {
    ScanConfig {
        chunk_size,
        max_async_chunks: max_async,
        work_group_size: 32,
    }
}

fn ordinals(list: &[ColumnOrdinal]) -> FxHashSet<ColumnOrdinal> {
    list.iter().copied().collect()
}

fn drain(session: &mut ScanSession<HostDevice>) -> Vec<ScanRow> {
    let mut rows = Vec::new();
    while let Some(row) = session.next().unwrap() {
        rows.push(row);
    }
    rows
}

/// Two chunks of 1024 rows: the first fully live, the second live in bits
/// 0–511 only. The column's runs stay clear of chunk boundaries so lazy
/// reads resolve every covered row.
fn two_chunk_table(catalog: &MemCatalog) {
    TableBuilder::new("t")
        .column("v", DataType::Int64)
        .rowmap_entry(0, all_live(1024))
        .rowmap_entry(1024, BooleanBuffer::collect_bool(1024, |i| i < 512))
        .segment(0, 0, ident_array(0, 1016))
        .segment(0, 1024, ident_array(1024, 512))
        .install(catalog);
}

#[test]
fn scenario_a_bitmap_walk_yields_live_rows_in_order() {
    let catalog = MemCatalog::new();
    two_chunk_table(&catalog);
    let device = HostDevice::new(1);

    let mut session = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor::full("t", [0]),
        config(1024, 3),
    )
    .unwrap();

    let rows = drain(&mut session);
    assert_eq!(rows.len(), 1024 + 512);

    let expected_ids: Vec<RowId> = (0..1024).chain(1024..1536).collect();
    let got_ids: Vec<RowId> = rows.iter().map(|r| r.row_id).collect();
    assert_eq!(got_ids, expected_ids);

    for row in &rows {
        assert_eq!(row.cells.len(), 1);
        let expected = if row.row_id < 1016 || row.row_id >= 1024 {
            Some(CellValue::Int64(row.row_id as i64))
        } else {
            None // the gap before the chunk boundary
        };
        assert_eq!(row.cells[0], expected, "rowid {}", row.row_id);
    }

    assert!(session.next().unwrap().is_none(), "end-of-scan is sticky");
}

#[test]
fn scenario_b_column_with_no_rows_reports_null_everywhere() {
    let catalog = MemCatalog::new();
    TableBuilder::new("t")
        .column("v", DataType::Int64)
        .rowmap_entry(0, all_live(1024))
        .install(&catalog);
    let device = HostDevice::new(1);

    let mut session = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor::full("t", [0]),
        config(1024, 3),
    )
    .unwrap();

    let rows = drain(&mut session);
    assert_eq!(rows.len(), 1024);
    assert!(rows.iter().all(|r| r.cells[0].is_none()));
}

#[test]
fn scenario_c_predictably_empty_scans_touch_no_storage() {
    let catalog = MemCatalog::new();
    two_chunk_table(&catalog);
    let device = HostDevice::new(1);

    let mut session = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor {
            table: "t".to_string(),
            predictable: Predictability::DefinitelyEmpty,
            required_columns: ordinals(&[0]),
            predicate_columns: FxHashSet::default(),
            kernel_source: None,
        },
        config(1024, 3),
    )
    .unwrap();

    assert!(session.next().unwrap().is_none());
    assert_eq!(catalog.stats().reads(), 0, "no row-map or segment reads");
}

#[test]
fn device_filtered_scan_keeps_rowid_order_under_out_of_order_completion() {
    let catalog = MemCatalog::new();
    let mut builder = TableBuilder::new("t")
        .column("v", DataType::Int64)
        .rowmap_entry(0, all_live(256))
        .rowmap_entry(256, all_live(256))
        .rowmap_entry(512, all_live(256))
        .rowmap_entry(768, all_live(256));
    for base in [0u64, 256, 512, 768] {
        builder = builder.segment(0, base, ident_array(base, 256));
    }
    builder.install(&catalog);

    // Unit 0 is slow, unit 1 fast: even-numbered chunks finish after their
    // successors, but rows must still surface in ascending row-id order.
    let device = HostDevice::with_latencies(vec![
        Duration::from_millis(10),
        Duration::from_millis(1),
    ]);

    let mut session = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor {
            table: "t".to_string(),
            predictable: Predictability::DependsOnData,
            required_columns: ordinals(&[0]),
            predicate_columns: ordinals(&[0]),
            kernel_source: Some(b"col 0 ge i64:512\n".to_vec()),
        },
        config(256, 2),
    )
    .unwrap();

    let rows = drain(&mut session);
    let got_ids: Vec<RowId> = rows.iter().map(|r| r.row_id).collect();
    let expected_ids: Vec<RowId> = (512..1024).collect();
    assert_eq!(got_ids, expected_ids);
    for row in &rows {
        assert_eq!(row.cells[0], Some(CellValue::Int64(row.row_id as i64)));
    }

    assert!(device.peak_in_flight() <= 2, "pipeline bound exceeded");
    session.end();
    assert_eq!(device.active_queues(), 0);
    assert_eq!(catalog.outstanding_locks(), 0);
}

#[test]
fn eager_and_lazy_paths_agree_per_row() {
    let catalog = MemCatalog::new();
    // One gapped run with interior nulls: rows 0..248 stored (every 7th
    // null), rows 248..256 unstored.
    let values: ArrayRef = Arc::new(Int64Array::from(
        (0..248)
            .map(|i| if i % 7 == 0 { None } else { Some(i as i64) })
            .collect::<Vec<_>>(),
    ));
    TableBuilder::new("t")
        .column("v", DataType::Int64)
        .rowmap_entry(0, all_live(256))
        .segment(0, 0, values)
        .install(&catalog);

    // Eager pass: the kernel passes every non-null value.
    let device = HostDevice::new(1);
    let mut eager = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor {
            table: "t".to_string(),
            predictable: Predictability::DependsOnData,
            required_columns: ordinals(&[0]),
            predicate_columns: ordinals(&[0]),
            kernel_source: Some(b"col 0 ge i64:-1\n".to_vec()),
        },
        config(256, 2),
    )
    .unwrap();
    let eager_rows = drain(&mut eager);

    // Lazy pass over the same data, no predicate.
    let mut lazy = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor::full("t", [0]),
        config(256, 2),
    )
    .unwrap();
    let lazy_rows = drain(&mut lazy);
    assert_eq!(lazy_rows.len(), 256);

    // The kernel kept exactly the rows whose lazy value is non-null, and
    // both paths read the same value for every kept row.
    let expected_kept: Vec<&ScanRow> =
        lazy_rows.iter().filter(|r| r.cells[0].is_some()).collect();
    assert_eq!(eager_rows.len(), expected_kept.len());
    for (eager_row, lazy_row) in eager_rows.iter().zip(expected_kept) {
        assert_eq!(eager_row.row_id, lazy_row.row_id);
        assert_eq!(eager_row.cells[0], lazy_row.cells[0]);
    }
}

#[test]
fn kernel_build_failure_fails_the_scan_and_leaks_nothing() {
    let catalog = MemCatalog::new();
    two_chunk_table(&catalog);
    let device = HostDevice::new(2);

    let result = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor {
            table: "t".to_string(),
            predictable: Predictability::DependsOnData,
            required_columns: ordinals(&[0]),
            predicate_columns: ordinals(&[0]),
            kernel_source: Some(b"col 0 gt i64:1\nnot a predicate\n".to_vec()),
        },
        config(1024, 2),
    );
    match result {
        Err(Error::DeviceBuild { log }) => {
            assert!(log.contains("unit 0: line 2"), "{log}");
        }
        other => panic!("expected DeviceBuild, got {:?}", other.map(|_| ())),
    }
    assert_eq!(device.active_queues(), 0);
    assert_eq!(catalog.outstanding_locks(), 0, "failure precedes any open");
}

#[test]
fn queue_creation_failure_releases_earlier_queues() {
    let catalog = MemCatalog::new();
    two_chunk_table(&catalog);
    let device = HostDevice::with_queue_limit(2, 1);

    let result = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor {
            table: "t".to_string(),
            predictable: Predictability::DependsOnData,
            required_columns: ordinals(&[0]),
            predicate_columns: ordinals(&[0]),
            kernel_source: Some(b"col 0 ge i64:0\n".to_vec()),
        },
        config(1024, 2),
    );
    assert!(matches!(result, Err(Error::DeviceResource(_))));
    assert_eq!(device.active_queues(), 0, "first queue must release");
    assert_eq!(catalog.outstanding_locks(), 0);
}

#[test]
fn ending_twice_releases_every_handle_exactly_once() {
    let catalog = MemCatalog::new();
    two_chunk_table(&catalog);
    let device = HostDevice::with_latencies(vec![Duration::from_millis(2)]);

    let mut session = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor {
            table: "t".to_string(),
            predictable: Predictability::DependsOnData,
            required_columns: ordinals(&[0]),
            predicate_columns: ordinals(&[0]),
            kernel_source: Some(b"col 0 ge i64:0\n".to_vec()),
        },
        config(1024, 2),
    )
    .unwrap();

    // Leave chunks mid-flight, then tear down twice (and once more on drop).
    let _ = session.next().unwrap();
    session.end();
    session.end();
    assert_eq!(device.active_queues(), 0);
    assert_eq!(catalog.outstanding_locks(), 0);
    assert!(session.next().unwrap().is_none(), "ended session yields nothing");
    drop(session);
    assert_eq!(catalog.outstanding_locks(), 0, "locks must not go negative");
}

#[test]
fn rescan_restarts_from_the_first_chunk() {
    let catalog = MemCatalog::new();
    two_chunk_table(&catalog);
    let device = HostDevice::new(1);

    let mut session = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor {
            table: "t".to_string(),
            predictable: Predictability::DependsOnData,
            required_columns: ordinals(&[0]),
            predicate_columns: ordinals(&[0]),
            kernel_source: Some(b"col 0 ge i64:0\n".to_vec()),
        },
        config(1024, 2),
    )
    .unwrap();

    let full = drain(&mut session);
    assert!(!full.is_empty());

    session.rescan().unwrap();
    let again = drain(&mut session);
    assert_eq!(full, again);

    // Rewinding mid-iteration also restarts from the top.
    session.rescan().unwrap();
    let _ = session.next().unwrap();
    let _ = session.next().unwrap();
    session.rescan().unwrap();
    let third = drain(&mut session);
    assert_eq!(full, third);
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let catalog = MemCatalog::new();
    two_chunk_table(&catalog);
    let device = HostDevice::new(1);

    let result = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor::full("t", [0]),
        config(1000, 2), // not a multiple of 8
    );
    assert!(matches!(result, Err(Error::Config(_))));

    let result = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor::full("t", [7]), // no such column
        config(1024, 2),
    );
    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(catalog.outstanding_locks(), 0);
}

#[test]
fn dropped_columns_cannot_be_required() {
    let catalog = MemCatalog::new();
    TableBuilder::new("t")
        .column("a", DataType::Int64)
        .dropped_column("gone")
        .rowmap_entry(0, all_live(8))
        .install(&catalog);
    let device = HostDevice::new(1);

    let result = ScanSession::begin(
        &catalog,
        &device,
        ScanDescriptor::full("t", [1]),
        config(8, 2),
    );
    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(catalog.outstanding_locks(), 0);
}
