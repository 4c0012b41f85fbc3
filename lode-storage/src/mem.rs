//! In-memory storage engine used for tests/benchmarks.
//!
//! Relations are immutable once installed; a [`MemCatalog`] resolves them by
//! name, counts the locks handed out, and totals data-bearing cursor
//! operations so tests can assert that a scan touched (or did not touch)
//! storage.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use arrow::array::{ArrayRef, BooleanArray};
use arrow::buffer::BooleanBuffer;
use arrow::datatypes::DataType;
use lode_result::{Error, Result};
use lode_types::{ColumnOrdinal, LockMode, RelationKind, RowId};
use rustc_hash::FxHashMap;

use crate::traits::{
    BaseRelation, Catalog, CatalogRelation, ColumnIndex, ColumnSegmentStore, LODE_HANDLER,
    Relation, RowIdSequence, RowMapCursor, RowMapStore, SegmentCursor,
};
use crate::types::{ColumnMeta, RowMapEntry, ScanDirection, SeekBound, Segment};

/// Engine-wide operation counters shared by every cursor the catalog hands
/// out. `reads` counts data-bearing fetches (row-map entries, segments);
/// `rescans` counts cursor repositioning.
#[derive(Default)]
pub struct EngineStats {
    reads: AtomicU64,
    rescans: AtomicU64,
}

impl EngineStats {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn rescans(&self) -> u64 {
        self.rescans.load(Ordering::Relaxed)
    }
}

/// In-memory catalog: name → relation, with lock accounting.
pub struct MemCatalog {
    relations: RwLock<FxHashMap<String, (Relation, Arc<AtomicI64>)>>,
    stats: Arc<EngineStats>,
}

impl Default for MemCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemCatalog {
    pub fn new() -> Self {
        Self {
            relations: RwLock::new(FxHashMap::default()),
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Locks currently held on a named relation, `0` if unknown.
    pub fn lock_count(&self, name: &str) -> i64 {
        let map = self
            .relations
            .read()
            .expect("MemCatalog relations lock poisoned");
        map.get(name)
            .map(|(_, locks)| locks.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Locks currently held across every relation. Negative means a handle
    /// was released more often than it was opened.
    pub fn outstanding_locks(&self) -> i64 {
        let map = self
            .relations
            .read()
            .expect("MemCatalog relations lock poisoned");
        map.values()
            .map(|(_, locks)| locks.load(Ordering::Relaxed))
            .sum()
    }

    fn register(&self, name: &str, relation: Relation, locks: Arc<AtomicI64>) {
        let mut map = self
            .relations
            .write()
            .expect("MemCatalog relations lock poisoned");
        map.insert(name.to_string(), (relation, locks));
    }

    pub fn install_base(
        &self,
        name: &str,
        handler: &str,
        schema: Vec<ColumnMeta>,
    ) -> Arc<MemBaseTable> {
        let rel = Arc::new(MemBaseTable {
            name: name.to_string(),
            handler: handler.to_string(),
            schema,
            locks: Arc::new(AtomicI64::new(0)),
        });
        self.register(name, Relation::Base(rel.clone()), rel.locks.clone());
        rel
    }

    pub fn install_rowmap(&self, name: &str, mut entries: Vec<RowMapEntry>) -> Arc<MemRowMapStore> {
        entries.sort_by_key(|e| e.rowid);
        let rel = Arc::new(MemRowMapStore {
            name: name.to_string(),
            entries: Arc::new(entries),
            locks: Arc::new(AtomicI64::new(0)),
            stats: Arc::clone(&self.stats),
        });
        self.register(name, Relation::RowMap(rel.clone()), rel.locks.clone());
        rel
    }

    /// Install the row-map's ordering index. Entries are exposed to segment
    /// cursors as boolean segments, one per row-map tuple.
    pub fn install_rowmap_index(
        &self,
        name: &str,
        entries: &[RowMapEntry],
    ) -> Arc<MemColumnIndex> {
        let mut segments: Vec<Segment> = entries
            .iter()
            .map(|e| Segment {
                start: e.rowid,
                values: Arc::new(BooleanArray::new(e.bitmap.clone(), None)) as ArrayRef,
            })
            .collect();
        segments.sort_by_key(|s| s.start);
        self.install_column_index(name, segments)
    }

    pub fn install_column_store(
        &self,
        name: &str,
        data_type: DataType,
        mut segments: Vec<Segment>,
    ) -> Arc<MemColumnStore> {
        segments.sort_by_key(|s| s.start);
        let rel = Arc::new(MemColumnStore {
            name: name.to_string(),
            data_type,
            segments: Arc::new(segments),
            locks: Arc::new(AtomicI64::new(0)),
        });
        self.register(name, Relation::Column(rel.clone()), rel.locks.clone());
        rel
    }

    pub fn install_column_index(
        &self,
        name: &str,
        mut segments: Vec<Segment>,
    ) -> Arc<MemColumnIndex> {
        segments.sort_by_key(|s| s.start);
        let rel = Arc::new(MemColumnIndex {
            name: name.to_string(),
            segments: Arc::new(segments),
            locks: Arc::new(AtomicI64::new(0)),
            stats: Arc::clone(&self.stats),
        });
        self.register(name, Relation::Index(rel.clone()), rel.locks.clone());
        rel
    }

    pub fn install_sequence(&self, name: &str, last: RowId) -> Arc<MemSequence> {
        let rel = Arc::new(MemSequence {
            name: name.to_string(),
            last: AtomicU64::new(last),
            locks: Arc::new(AtomicI64::new(0)),
        });
        self.register(name, Relation::Sequence(rel.clone()), rel.locks.clone());
        rel
    }
}

impl Catalog for MemCatalog {
    fn open(&self, name: &str, _mode: LockMode) -> Result<Relation> {
        let map = self
            .relations
            .read()
            .expect("MemCatalog relations lock poisoned");
        match map.get(name) {
            Some((relation, locks)) => {
                locks.fetch_add(1, Ordering::Relaxed);
                Ok(relation.clone())
            }
            None => Err(Error::NotFound(name.to_string())),
        }
    }
}

pub struct MemBaseTable {
    name: String,
    handler: String,
    schema: Vec<ColumnMeta>,
    locks: Arc<AtomicI64>,
}

impl CatalogRelation for MemBaseTable {
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> RelationKind {
        RelationKind::Base
    }
    fn release(&self, _mode: LockMode) {
        self.locks.fetch_sub(1, Ordering::Relaxed);
    }
}

impl BaseRelation for MemBaseTable {
    fn schema(&self) -> &[ColumnMeta] {
        &self.schema
    }
    fn handler(&self) -> &str {
        &self.handler
    }
}

pub struct MemRowMapStore {
    name: String,
    entries: Arc<Vec<RowMapEntry>>,
    locks: Arc<AtomicI64>,
    stats: Arc<EngineStats>,
}

impl CatalogRelation for MemRowMapStore {
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> RelationKind {
        RelationKind::RowMap
    }
    fn release(&self, _mode: LockMode) {
        self.locks.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RowMapStore for MemRowMapStore {
    fn begin_scan(&self) -> Result<Box<dyn RowMapCursor>> {
        Ok(Box::new(MemRowMapCursor {
            entries: Arc::clone(&self.entries),
            pos: 0,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MemRowMapCursor {
    entries: Arc<Vec<RowMapEntry>>,
    pos: usize,
    stats: Arc<EngineStats>,
}

impl RowMapCursor for MemRowMapCursor {
    fn next(&mut self) -> Result<Option<RowMapEntry>> {
        if self.pos >= self.entries.len() {
            return Ok(None);
        }
        let entry = self.entries[self.pos].clone();
        self.pos += 1;
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry))
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

pub struct MemColumnStore {
    name: String,
    data_type: DataType,
    segments: Arc<Vec<Segment>>,
    locks: Arc<AtomicI64>,
}

impl CatalogRelation for MemColumnStore {
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> RelationKind {
        RelationKind::ColumnStore
    }
    fn release(&self, _mode: LockMode) {
        self.locks.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ColumnSegmentStore for MemColumnStore {
    fn data_type(&self) -> DataType {
        self.data_type.clone()
    }
}

pub struct MemColumnIndex {
    name: String,
    segments: Arc<Vec<Segment>>,
    locks: Arc<AtomicI64>,
    stats: Arc<EngineStats>,
}

impl CatalogRelation for MemColumnIndex {
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> RelationKind {
        RelationKind::Index
    }
    fn release(&self, _mode: LockMode) {
        self.locks.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ColumnIndex for MemColumnIndex {
    fn begin_scan(&self) -> Result<Box<dyn SegmentCursor>> {
        Ok(Box::new(MemSegmentCursor {
            segments: Arc::clone(&self.segments),
            lo: 0,
            hi: self.segments.len(),
            pos: None,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MemSegmentCursor {
    segments: Arc<Vec<Segment>>,
    /// Qualifying window `[lo, hi)` set by the last rescan.
    lo: usize,
    hi: usize,
    /// Index of the last returned segment, `None` right after a rescan.
    pos: Option<usize>,
    stats: Arc<EngineStats>,
}

impl SegmentCursor for MemSegmentCursor {
    fn rescan(&mut self, bound: SeekBound) -> Result<()> {
        self.stats.rescans.fetch_add(1, Ordering::Relaxed);
        let segs = &self.segments;
        let (lo, hi) = match bound {
            SeekBound::Unbounded => (0, segs.len()),
            SeekBound::Range { lo, hi } => (
                segs.partition_point(|s| s.start < lo),
                segs.partition_point(|s| s.start < hi),
            ),
            SeekBound::UpperInclusive(key) => (0, segs.partition_point(|s| s.start <= key)),
            SeekBound::LowerExclusive(key) => {
                (segs.partition_point(|s| s.start <= key), segs.len())
            }
        };
        self.lo = lo;
        self.hi = hi;
        self.pos = None;
        Ok(())
    }

    fn next(&mut self, direction: ScanDirection) -> Result<Option<Segment>> {
        let idx = match (self.pos, direction) {
            (None, ScanDirection::Forward) => self.lo,
            (None, ScanDirection::Backward) => match self.hi.checked_sub(1) {
                Some(i) => i,
                None => return Ok(None),
            },
            (Some(p), ScanDirection::Forward) => p + 1,
            (Some(p), ScanDirection::Backward) => match p.checked_sub(1) {
                Some(i) => i,
                None => return Ok(None),
            },
        };
        if idx < self.lo || idx >= self.hi {
            return Ok(None);
        }
        self.pos = Some(idx);
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        Ok(Some(self.segments[idx].clone()))
    }
}

pub struct MemSequence {
    name: String,
    last: AtomicU64,
    locks: Arc<AtomicI64>,
}

impl CatalogRelation for MemSequence {
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> RelationKind {
        RelationKind::Sequence
    }
    fn release(&self, _mode: LockMode) {
        self.locks.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RowIdSequence for MemSequence {
    fn last_value(&self) -> RowId {
        self.last.load(Ordering::Relaxed)
    }
}

/// Fabricates the full companion set for one table: base relation, row-map
/// store + index, per-column stores + indexes, and the row-id sequence,
/// under the naming scheme the resolver expects
/// (`t.rowid`, `t.idx`, `t.<col>.cs`, `t.<col>.idx`, `t.seq`).
pub struct TableBuilder {
    name: String,
    handler: String,
    columns: Vec<ColumnMeta>,
    rowmap: Vec<RowMapEntry>,
    segments: FxHashMap<ColumnOrdinal, Vec<Segment>>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: LODE_HANDLER.to_string(),
            columns: Vec::new(),
            rowmap: Vec::new(),
            segments: FxHashMap::default(),
        }
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(ColumnMeta {
            name: name.into(),
            data_type,
            dropped: false,
        });
        self
    }

    pub fn dropped_column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(ColumnMeta {
            name: name.into(),
            data_type: DataType::Null,
            dropped: true,
        });
        self
    }

    pub fn rowmap_entry(mut self, rowid: RowId, bitmap: BooleanBuffer) -> Self {
        self.rowmap.push(RowMapEntry { rowid, bitmap });
        self
    }

    pub fn segment(mut self, column: ColumnOrdinal, start: RowId, values: ArrayRef) -> Self {
        self.segments
            .entry(column)
            .or_default()
            .push(Segment { start, values });
        self
    }

    pub fn install(mut self, catalog: &MemCatalog) {
        self.rowmap.sort_by_key(|e| e.rowid);
        let last_rowid = self
            .rowmap
            .last()
            .map(|e| e.rowid + e.bitmap.len() as RowId)
            .unwrap_or(0);

        catalog.install_base(&self.name, &self.handler, self.columns.clone());
        catalog.install_rowmap(&format!("{}.rowid", self.name), self.rowmap.clone());
        catalog.install_rowmap_index(&format!("{}.idx", self.name), &self.rowmap);
        catalog.install_sequence(&format!("{}.seq", self.name), last_rowid);

        for (ordinal, meta) in self.columns.iter().enumerate() {
            if meta.dropped {
                continue;
            }
            let segments = self.segments.remove(&(ordinal as ColumnOrdinal)).unwrap_or_default();
            catalog.install_column_store(
                &format!("{}.{}.cs", self.name, meta.name),
                meta.data_type.clone(),
                segments.clone(),
            );
            catalog.install_column_index(&format!("{}.{}.idx", self.name, meta.name), segments);
        }
    }
}
