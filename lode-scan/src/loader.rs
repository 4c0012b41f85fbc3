//! Materializing chunks from the row-validity store.
//!
//! The loader walks the row-validity store sequentially; every live entry
//! becomes one [`Chunk`]. When predicate evaluation is required, each
//! predicate column is bulk-loaded through a ranged index scan straight into
//! a dense buffer, never through the single-row cache, and any sub-range
//! no segment covers is left null. A row-id range with no stored values at
//! all is an all-null column, not an error.

use arrow::array::Array;
use lode_result::{Error, Result};
use lode_storage::{ColumnIndex, ColumnSegmentStore, RowMapCursor, RowMapStore, ScanDirection, SeekBound};
use lode_types::{ColumnOrdinal, Predictability, RowId, cell_width, copy_values_le, is_chunk_aligned};

use crate::chunk::{Chunk, ColumnBuffer};
use crate::relset::RelationSet;
use crate::{ScanConfig, ScanDescriptor};

/// Sequential chunk producer over one relation set.
pub struct ChunkLoader {
    cursor: Box<dyn RowMapCursor>,
    exhausted: bool,
}

impl ChunkLoader {
    pub fn new(relset: &RelationSet) -> Result<Self> {
        Ok(Self {
            cursor: relset.rowmap().begin_scan()?,
            exhausted: false,
        })
    }

    /// Whether the row-validity store has run out of entries. Not an error:
    /// it is the normal end-of-data signal.
    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    /// Restart from the first row-map entry.
    pub fn rewind(&mut self) -> Result<()> {
        self.cursor.rewind()?;
        self.exhausted = false;
        Ok(())
    }

    /// Materialize the next chunk, eagerly loading predicate columns when
    /// the query's visibility depends on data.
    pub fn next_chunk(
        &mut self,
        relset: &RelationSet,
        descriptor: &ScanDescriptor,
        config: &ScanConfig,
    ) -> Result<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(entry) = self.cursor.next()? else {
            self.exhausted = true;
            return Ok(None);
        };
        if entry.bitmap.len() != config.chunk_size {
            return Err(Error::Storage(format!(
                "row-map bitmap covers {} rows, expected chunk size {}",
                entry.bitmap.len(),
                config.chunk_size
            )));
        }
        if !is_chunk_aligned(entry.rowid, config.chunk_size) {
            return Err(Error::Storage(format!(
                "row-map entry at rowid {} is not aligned to chunk size {}",
                entry.rowid, config.chunk_size
            )));
        }

        let mut chunk = Chunk::new(entry.rowid, entry.bitmap, relset.num_attrs());
        if descriptor.predictable == Predictability::DependsOnData {
            let mut clause_cols: Vec<ColumnOrdinal> =
                descriptor.predicate_columns.iter().copied().collect();
            clause_cols.sort_unstable();
            for ordinal in clause_cols {
                load_column_store(relset, &mut chunk, ordinal, config.chunk_size)?;
            }
        }
        Ok(Some(chunk))
    }
}

/// Bulk-load one column of one chunk via a ranged index scan over
/// `[chunk.rowid, chunk.rowid + chunk_size)`.
fn load_column_store(
    relset: &RelationSet,
    chunk: &mut Chunk,
    ordinal: ColumnOrdinal,
    chunk_size: usize,
) -> Result<()> {
    let handles = relset
        .column(ordinal)
        .ok_or_else(|| Error::Internal(format!("predicate column {ordinal} has no store")))?;
    let index = handles
        .index
        .as_ref()
        .ok_or_else(|| Error::Internal(format!("predicate column {ordinal} has no index")))?;
    let data_type = handles.store.data_type();
    // Only fixed-width values reach the device copy path; the descriptor
    // validation rejected anything else before the first chunk loaded.
    let width = cell_width(&data_type)
        .ok_or_else(|| Error::Internal(format!("column {ordinal} is not fixed-width")))?;

    let base = chunk.rowid();
    let mut values = vec![0u8; chunk_size * width];
    let mut validity = vec![0u8; chunk_size / 8];
    let mut covered = 0usize;

    let mut cursor = index.begin_scan()?;
    cursor.rescan(SeekBound::Range {
        lo: base,
        hi: base + chunk_size as RowId,
    })?;
    while let Some(segment) = cursor.next(ScanDirection::Forward)? {
        let offset = (segment.start - base) as usize;
        if offset + segment.len() > chunk_size {
            return Err(Error::Storage(format!(
                "segment at rowid {} (len {}) overruns chunk at rowid {}",
                segment.start,
                segment.len(),
                base
            )));
        }
        if !copy_values_le(&segment.values, &mut values[offset * width..]) {
            return Err(Error::Storage(format!(
                "segment at rowid {} does not match column type {:?}",
                segment.start, data_type
            )));
        }
        for i in 0..segment.len() {
            if !segment.values.is_null(i) {
                let bit = offset + i;
                validity[bit / 8] |= 1 << (bit % 8);
            }
            covered += 1;
        }
    }

    if covered == 0 {
        // No stored rows anywhere in the range: an all-null column, by
        // construction of the (still all-zero) validity bitmap.
        tracing::debug!(
            ordinal,
            rowid = base,
            chunk_size,
            "column store has no rows in chunk range"
        );
    }

    let all_present = validity.iter().all(|b| *b == 0xff);
    let buffer = ColumnBuffer::new(
        data_type,
        width,
        values,
        if all_present { None } else { Some(validity) },
    );
    chunk.set_column(ordinal, buffer);
    Ok(())
}
