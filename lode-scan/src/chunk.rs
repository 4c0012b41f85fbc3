//! The chunk buffer: one fixed-size range of row ids with its validity
//! bitmap and any eagerly-loaded column data.

use std::sync::Arc;

use arrow::buffer::BooleanBuffer;
use arrow::datatypes::DataType;
use lode_device::{KernelColumn, KernelInput};
use lode_types::{CellValue, ColumnOrdinal, RowId};

/// Dense per-column data for one chunk: `chunk_size × width` little-endian
/// value bytes plus an optional validity bitmap (absent ⇒ no nulls in this
/// chunk). Buffers are shared with the device via `Arc`, so copy-in clones
/// bytes, not ownership.
#[derive(Clone, Debug)]
pub struct ColumnBuffer {
    data_type: DataType,
    width: usize,
    values: Arc<Vec<u8>>,
    validity: Option<Arc<Vec<u8>>>,
}

impl ColumnBuffer {
    pub fn new(
        data_type: DataType,
        width: usize,
        values: Vec<u8>,
        validity: Option<Vec<u8>>,
    ) -> Self {
        Self {
            data_type,
            width,
            values: Arc::new(values),
            validity: validity.map(Arc::new),
        }
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Read the cell at `offset` from the chunk base, `None` when null.
    pub fn cell(&self, offset: usize) -> Option<CellValue> {
        if let Some(validity) = &self.validity {
            if validity[offset / 8] & (1 << (offset % 8)) == 0 {
                return None;
            }
        }
        CellValue::from_le_bytes(&self.data_type, &self.values[offset * self.width..])
    }

    fn kernel_column(&self, ordinal: ColumnOrdinal) -> KernelColumn {
        KernelColumn {
            ordinal,
            data_type: self.data_type.clone(),
            values: Arc::clone(&self.values),
            validity: self.validity.as_ref().map(Arc::clone),
        }
    }
}

/// One fixed-size unit of scan work.
///
/// `rowid` is chunk-size aligned; bit `i` of `rowmap` describes row
/// `rowid + i`. Column buffers exist only for eagerly-loaded (predicate)
/// columns; everything else resolves lazily through the column cache.
pub struct Chunk {
    rowid: RowId,
    rowmap: BooleanBuffer,
    columns: Vec<Option<ColumnBuffer>>,
}

impl Chunk {
    pub fn new(rowid: RowId, rowmap: BooleanBuffer, num_attrs: usize) -> Self {
        let mut columns = Vec::with_capacity(num_attrs);
        columns.resize_with(num_attrs, || None);
        Self {
            rowid,
            rowmap,
            columns,
        }
    }

    pub fn rowid(&self) -> RowId {
        self.rowid
    }

    pub fn rows(&self) -> usize {
        self.rowmap.len()
    }

    /// Whether the row at `offset` from the chunk base is live.
    #[inline]
    pub fn is_live(&self, offset: usize) -> bool {
        self.rowmap.value(offset)
    }

    pub fn live_count(&self) -> usize {
        self.rowmap.count_set_bits()
    }

    pub fn column(&self, ordinal: ColumnOrdinal) -> Option<&ColumnBuffer> {
        self.columns.get(ordinal as usize).and_then(|c| c.as_ref())
    }

    pub fn set_column(&mut self, ordinal: ColumnOrdinal, buffer: ColumnBuffer) {
        self.columns[ordinal as usize] = Some(buffer);
    }

    /// Replace the validity bitmap with the kernel's narrowed result.
    pub fn set_rowmap(&mut self, rowmap: BooleanBuffer) {
        self.rowmap = rowmap;
    }

    /// Assemble the device submission for this chunk: the validity bitmap
    /// plus every eagerly-loaded column.
    pub fn kernel_input(&self, work_group: usize) -> KernelInput {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .filter_map(|(ordinal, buffer)| {
                buffer
                    .as_ref()
                    .map(|b| b.kernel_column(ordinal as ColumnOrdinal))
            })
            .collect();
        KernelInput {
            rows: self.rowmap.len(),
            work_group,
            rowmap: self.rowmap.clone(),
            columns,
        }
    }
}
