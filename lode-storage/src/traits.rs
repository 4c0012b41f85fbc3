//! Object-safe storage contracts.
//!
//! Everything the scan core needs from the storage engine fits in a handful
//! of traits: a catalog resolving names to locked relation handles, a
//! sequential cursor over the row-validity store, and directional cursors
//! over column segments. Handles are `Arc<dyn …>` so a relation set can hold
//! heterogeneous companions without caring which engine backs them.

use std::sync::Arc;

use arrow::datatypes::DataType;
use lode_result::Result;
use lode_types::{LockMode, RelationKind, RowId};

use crate::types::{ColumnMeta, RowMapEntry, ScanDirection, SeekBound, Segment};

/// Handler tag carried by base tables managed by this extension. Scans refuse
/// base tables whose handler differs.
pub const LODE_HANDLER: &str = "lode_handler";

/// Behavior common to every catalog-resolved relation.
pub trait CatalogRelation: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> RelationKind;

    /// Give back the lock taken when the relation was opened. Callers pair
    /// every successful `Catalog::open` with exactly one `release`.
    fn release(&self, mode: LockMode);
}

/// Foreign base table handle: schema plus the handler tag used to verify the
/// table is managed by this extension.
pub trait BaseRelation: CatalogRelation {
    fn schema(&self) -> &[ColumnMeta];
    fn handler(&self) -> &str;
}

/// Row-validity store: append-only (row id, bitmap) tuples in row-id order.
pub trait RowMapStore: CatalogRelation {
    fn begin_scan(&self) -> Result<Box<dyn RowMapCursor>>;
}

/// Sequential forward scan over row-map entries.
pub trait RowMapCursor: Send {
    /// Next entry in row-id order; `Ok(None)` signals normal exhaustion.
    fn next(&mut self) -> Result<Option<RowMapEntry>>;

    /// Reposition before the first entry.
    fn rewind(&mut self) -> Result<()>;
}

/// Per-column secondary store of dense value segments.
pub trait ColumnSegmentStore: CatalogRelation {
    fn data_type(&self) -> DataType;
}

/// Ordering index over a row-map or column store, keyed by row id.
pub trait ColumnIndex: CatalogRelation {
    fn begin_scan(&self) -> Result<Box<dyn SegmentCursor>>;
}

/// Directional index scan over segments keyed by their start row id.
///
/// A cursor is positioned by [`rescan`](Self::rescan) and stepped by
/// [`next`](Self::next); the two directions walk the same qualifying window
/// from opposite ends, which is how the column cache fetches "the last
/// segment at or before a row id" and then re-seeks forward past it.
pub trait SegmentCursor: Send {
    fn rescan(&mut self, bound: SeekBound) -> Result<()>;
    fn next(&mut self, direction: ScanDirection) -> Result<Option<Segment>>;
}

/// Row-id allocator for a table. The scan path only resolves and kind-checks
/// it; allocation belongs to the write path.
pub trait RowIdSequence: CatalogRelation {
    fn last_value(&self) -> RowId;
}

/// A locked relation handle, tagged by kind.
#[derive(Clone)]
pub enum Relation {
    Base(Arc<dyn BaseRelation>),
    RowMap(Arc<dyn RowMapStore>),
    Column(Arc<dyn ColumnSegmentStore>),
    Index(Arc<dyn ColumnIndex>),
    Sequence(Arc<dyn RowIdSequence>),
}

impl Relation {
    pub fn as_catalog(&self) -> &dyn CatalogRelation {
        match self {
            Relation::Base(r) => &**r,
            Relation::RowMap(r) => &**r,
            Relation::Column(r) => &**r,
            Relation::Index(r) => &**r,
            Relation::Sequence(r) => &**r,
        }
    }

    pub fn name(&self) -> &str {
        self.as_catalog().name()
    }

    pub fn kind(&self) -> RelationKind {
        self.as_catalog().kind()
    }

    pub fn release(&self, mode: LockMode) {
        self.as_catalog().release(mode);
    }
}

impl std::fmt::Debug for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Name → locked relation resolution.
///
/// `open` acquires `mode` on the named relation and returns a handle tagged
/// with its kind; the caller owns the lock until it calls
/// [`Relation::release`]. Missing names are `Error::NotFound`.
pub trait Catalog: Send + Sync {
    fn open(&self, name: &str, mode: LockMode) -> Result<Relation>;
}
