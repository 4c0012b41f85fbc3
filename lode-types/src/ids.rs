/// Unique identifier for a logical row of the base table.
///
/// Row ids are 64-bit unsigned integers allocated by the table's row-id
/// sequence. The id domain is shared and monotonic across the row-validity
/// store and every column store of a table: row `r` of the base table is
/// described by bit `r - chunk_base` of a validity bitmap and by position
/// `r - segment_start` of any column segment covering it.
pub type RowId = u64;

/// Zero-based attribute position of a column in its base table.
///
/// Ordinals are stable across the life of a table; dropped columns leave a
/// hole rather than renumbering their successors.
pub type ColumnOrdinal = u32;

/// First row id covered by the chunk containing `rowid`.
#[inline]
pub fn chunk_base(rowid: RowId, chunk_size: usize) -> RowId {
    rowid - rowid % chunk_size as RowId
}

/// Whether `rowid` sits on a chunk boundary for the given chunk size.
#[inline]
pub fn is_chunk_aligned(rowid: RowId, chunk_size: usize) -> bool {
    rowid % chunk_size as RowId == 0
}
