//! Storage contracts consumed by the lode scan engine, plus the in-memory
//! reference engine used by tests and benchmarks.
//!
//! The scan core never talks to concrete storage: it resolves relations
//! through a [`Catalog`] and drives data through the cursor traits defined
//! here. The on-disk engine of the surrounding system implements the same
//! traits; [`mem`] provides the hermetic implementation this workspace tests
//! against, and [`instrument`] wraps any segment cursor with operation
//! counters so tests can observe seek behavior.

pub mod instrument;
pub mod mem;
pub mod traits;
pub mod types;

pub use instrument::{CursorStats, InstrumentedCursor};
pub use traits::{
    BaseRelation, Catalog, CatalogRelation, ColumnIndex, ColumnSegmentStore, LODE_HANDLER,
    Relation, RowIdSequence, RowMapCursor, RowMapStore, SegmentCursor,
};
pub use types::{ColumnMeta, RowMapEntry, ScanDirection, SeekBound, Segment};
