//! Chunk-oriented scan execution over lode columnar overlay storage.
//!
//! A scan session walks the row-validity store in fixed-size chunks,
//! eagerly bulk-loads predicate columns into dense buffers, ships them to a
//! parallel compute device for predicate evaluation, and iterates the
//! surviving rows in strict row-id order while chunk loading overlaps device
//! execution. The pull-based surface the surrounding query engine consumes
//! is [`ScanSession`]: `begin` → `next`* → (`rescan` →) `end`.
//!
//! Crate layout mirrors the stages of the pipeline:
//! - [`relset`]: resolving a base table's companion stores,
//! - [`chunk`]: the in-memory unit of work,
//! - [`column_cache`]: row-id → value lookups for lazily-read columns,
//! - [`loader`]: materializing chunks from the row-validity store,
//! - [`pipeline`]: pending → executing → ready progression on the device,
//! - [`session`]: the row iterator tying the above together.

use lode_result::{Error, Result};
use lode_types::{CellValue, ColumnOrdinal, Predictability, RowId};
use rustc_hash::FxHashSet;

pub mod chunk;
pub mod column_cache;
pub mod loader;
pub mod pipeline;
pub mod relset;
pub mod session;

pub use chunk::{Chunk, ColumnBuffer};
pub use column_cache::ColumnReader;
pub use loader::ChunkLoader;
pub use pipeline::Pipeline;
pub use relset::RelationSet;
pub use session::ScanSession;

/// Session-scoped scan tuning, fixed at `begin`.
#[derive(Clone, Debug)]
pub struct ScanConfig {
    /// Rows per chunk; the row-validity store's bitmap width. Must be a
    /// positive multiple of 8 so bitmaps pack into whole bytes.
    pub chunk_size: usize,
    /// Bound on chunks simultaneously pending or executing on the device.
    pub max_async_chunks: usize,
    /// Kernel dispatch granularity hint passed through to the device.
    pub work_group_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            max_async_chunks: 3,
            work_group_size: 64,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size % 8 != 0 {
            return Err(Error::Config(format!(
                "chunk_size must be a positive multiple of 8, got {}",
                self.chunk_size
            )));
        }
        if self.max_async_chunks == 0 {
            return Err(Error::Config(
                "max_async_chunks must be at least 1".to_string(),
            ));
        }
        if self.work_group_size == 0 {
            return Err(Error::Config("work_group_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Planner-supplied description of one scan.
#[derive(Clone, Debug)]
pub struct ScanDescriptor {
    /// Base table name; companions resolve from it.
    pub table: String,
    pub predictable: Predictability,
    /// Columns whose values the executor wants back. Everything else is
    /// reported null without touching its store.
    pub required_columns: FxHashSet<ColumnOrdinal>,
    /// Columns referenced by the predicate; copied to the device.
    pub predicate_columns: FxHashSet<ColumnOrdinal>,
    /// Opaque kernel blob, present iff predicates must be evaluated.
    pub kernel_source: Option<Vec<u8>>,
}

impl ScanDescriptor {
    /// A full scan with no predicate over the given columns.
    pub fn full(table: impl Into<String>, required: impl IntoIterator<Item = ColumnOrdinal>) -> Self {
        Self {
            table: table.into(),
            predictable: Predictability::DefinitelyMatches,
            required_columns: required.into_iter().collect(),
            predicate_columns: FxHashSet::default(),
            kernel_source: None,
        }
    }
}

/// One emitted row: its id plus one cell per base-table attribute, `None`
/// for nulls and for columns the descriptor did not require.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanRow {
    pub row_id: RowId,
    pub cells: Vec<Option<CellValue>>,
}
