use arrow::array::ArrayRef;
use arrow::buffer::BooleanBuffer;
use arrow::datatypes::DataType;
use lode_types::RowId;

/// One column-store tuple: a dense fixed-width value array covering the
/// row-id interval `[start, start + len)`.
///
/// Segment starts are byte-aligned in the bitmap sense (multiples of 8), as
/// written by the ingest path; readers rely on that when splicing segment
/// null bitmaps into chunk-wide ones.
#[derive(Clone, Debug)]
pub struct Segment {
    pub start: RowId,
    pub values: ArrayRef,
}

impl Segment {
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One past the last covered row id. Also the *inclusive* hit bound used
    /// by the column cache.
    #[inline]
    pub fn end(&self) -> RowId {
        self.start + self.values.len() as RowId
    }
}

/// One row-validity tuple: the validity bitmap for `chunk_size` consecutive
/// row ids starting at `rowid` (bit set ⇒ row is live).
#[derive(Clone, Debug)]
pub struct RowMapEntry {
    pub rowid: RowId,
    pub bitmap: BooleanBuffer,
}

/// Re-seek target for a [`SegmentCursor`](crate::traits::SegmentCursor),
/// keyed by segment start.
#[derive(Clone, Copy, Debug)]
pub enum SeekBound {
    /// Every segment qualifies.
    Unbounded,
    /// Segments with `lo <= start < hi`.
    Range { lo: RowId, hi: RowId },
    /// Segments with `start <= key`. Pair with a backward fetch to find the
    /// last segment at or before a row id.
    UpperInclusive(RowId),
    /// Segments with `start > key`. Positions a cursor so its next forward
    /// fetch reads the segment after a cached run.
    LowerExclusive(RowId),
}

/// Fetch direction for a positioned segment cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// Schema entry for one attribute of a base table.
#[derive(Clone, Debug)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: DataType,
    /// Dropped columns keep their ordinal but have no companion stores.
    pub dropped: bool,
}
