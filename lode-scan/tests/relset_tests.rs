use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::buffer::BooleanBuffer;
use arrow::datatypes::DataType;

use lode_result::Error;
use lode_scan::RelationSet;
use lode_storage::mem::{MemCatalog, TableBuilder};
use lode_types::LockMode;

fn seeded_catalog() -> MemCatalog {
    let catalog = MemCatalog::new();
    TableBuilder::new("t")
        .column("a", DataType::Int64)
        .dropped_column("gone")
        .column("b", DataType::Float64)
        .rowmap_entry(0, BooleanBuffer::collect_bool(8, |_| true))
        .segment(0, 0, Arc::new(Int64Array::from(vec![5i64; 8])) as ArrayRef)
        .install(&catalog);
    catalog
}

#[test]
fn open_resolves_every_companion() {
    let catalog = seeded_catalog();
    let mut relset = RelationSet::open(&catalog, "t", LockMode::AccessShare, true).unwrap();

    assert_eq!(relset.num_attrs(), 3);
    assert!(relset.column(0).is_some());
    assert!(relset.column(1).is_none(), "dropped column has no handles");
    assert!(relset.column(2).is_some());
    assert!(relset.column(0).unwrap().index.is_some());
    assert!(relset.rowmap_index().is_some());
    assert!(catalog.outstanding_locks() > 0);

    relset.close();
    assert_eq!(catalog.outstanding_locks(), 0);
}

#[test]
fn open_without_index_skips_index_handles() {
    let catalog = seeded_catalog();
    let relset = RelationSet::open(&catalog, "t", LockMode::AccessShare, false).unwrap();
    assert!(relset.rowmap_index().is_none());
    assert!(relset.column(0).unwrap().index.is_none());
    drop(relset);
    assert_eq!(catalog.outstanding_locks(), 0);
}

#[test]
fn foreign_handler_mismatch_is_not_managed() {
    let catalog = MemCatalog::new();
    TableBuilder::new("alien")
        .handler("someone_elses_fdw")
        .column("a", DataType::Int64)
        .install(&catalog);

    match RelationSet::open(&catalog, "alien", LockMode::AccessShare, true) {
        Err(Error::NotManaged(name)) => assert_eq!(name, "alien"),
        other => panic!("expected NotManaged, got {other:?}"),
    }
    // The base lock taken before the check was given back.
    assert_eq!(catalog.outstanding_locks(), 0);
}

#[test]
fn wrong_companion_kind_fails_and_releases_partial_opens() {
    let catalog = MemCatalog::new();
    // Base and row map are fine; the first column's store resolves to a
    // sequence, which must fail the kind check after several successful
    // opens.
    TableBuilder::new("t")
        .column("a", DataType::Int64)
        .install(&catalog);
    catalog.install_sequence("t.a.cs", 0);

    match RelationSet::open(&catalog, "t", LockMode::AccessShare, true) {
        Err(Error::WrongKind {
            relation,
            expected,
            actual,
        }) => {
            assert_eq!(relation, "t.a.cs");
            assert_eq!(expected, "a column store");
            assert_eq!(actual, "a sequence");
        }
        other => panic!("expected WrongKind, got {other:?}"),
    }
    assert_eq!(catalog.outstanding_locks(), 0, "partial opens must unwind");
}

#[test]
fn missing_companion_fails_and_releases_partial_opens() {
    let catalog = MemCatalog::new();
    catalog.install_base(
        "t",
        lode_storage::LODE_HANDLER,
        vec![lode_storage::ColumnMeta {
            name: "a".to_string(),
            data_type: DataType::Int64,
            dropped: false,
        }],
    );
    // No t.rowid installed.
    match RelationSet::open(&catalog, "t", LockMode::AccessShare, true) {
        Err(Error::NotFound(name)) => assert_eq!(name, "t.rowid"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_eq!(catalog.outstanding_locks(), 0);
}

#[test]
fn close_is_idempotent() {
    let catalog = seeded_catalog();
    let mut relset = RelationSet::open(&catalog, "t", LockMode::AccessShare, true).unwrap();
    relset.close();
    relset.close();
    drop(relset); // drop runs close a third time
    assert_eq!(catalog.outstanding_locks(), 0, "locks must not go negative");
}
