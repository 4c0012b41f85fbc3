//! Fixed-width scalar cells and their byte-level codecs.
//!
//! Column data crosses three representations during a scan: Arrow arrays in
//! the column-store segments, dense little-endian byte buffers in chunk
//! buffers shipped to the device, and single [`CellValue`]s in emitted rows.
//! Only fixed-width primitive types are storable; variable-length values
//! never reach the device copy path.

use arrow::array::{Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::DataType;

/// A single fixed-width scalar value read out of a column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CellValue {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl CellValue {
    pub fn data_type(&self) -> DataType {
        match self {
            CellValue::Int32(_) => DataType::Int32,
            CellValue::Int64(_) => DataType::Int64,
            CellValue::Float32(_) => DataType::Float32,
            CellValue::Float64(_) => DataType::Float64,
        }
    }

    /// Numeric view used by predicate comparison; integers promote losslessly
    /// for the magnitudes the kernels compare against.
    pub fn as_f64(&self) -> f64 {
        match *self {
            CellValue::Int32(v) => v as f64,
            CellValue::Int64(v) => v as f64,
            CellValue::Float32(v) => v as f64,
            CellValue::Float64(v) => v,
        }
    }

    /// Integer view, when the cell holds an integer type.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            CellValue::Int32(v) => Some(v as i64),
            CellValue::Int64(v) => Some(v),
            CellValue::Float32(_) | CellValue::Float64(_) => None,
        }
    }

    /// Decode one cell from the little-endian bytes of a dense buffer.
    ///
    /// Returns `None` for data types outside the storable set.
    pub fn from_le_bytes(data_type: &DataType, bytes: &[u8]) -> Option<CellValue> {
        match data_type {
            DataType::Int32 => Some(CellValue::Int32(i32::from_le_bytes(
                bytes[..4].try_into().ok()?,
            ))),
            DataType::Int64 => Some(CellValue::Int64(i64::from_le_bytes(
                bytes[..8].try_into().ok()?,
            ))),
            DataType::Float32 => Some(CellValue::Float32(f32::from_le_bytes(
                bytes[..4].try_into().ok()?,
            ))),
            DataType::Float64 => Some(CellValue::Float64(f64::from_le_bytes(
                bytes[..8].try_into().ok()?,
            ))),
            _ => None,
        }
    }
}

/// Byte width of a storable data type, `None` for anything the scan cannot
/// place in a dense device buffer.
#[inline]
pub fn cell_width(data_type: &DataType) -> Option<usize> {
    match data_type {
        DataType::Int32 | DataType::Float32 => Some(4),
        DataType::Int64 | DataType::Float64 => Some(8),
        _ => None,
    }
}

/// Read one cell from an Arrow array, honoring its validity bitmap.
///
/// Returns `None` for a null slot, an out-of-range index, or an unsupported
/// array type. The out-of-range case is load-bearing: a cached run hit at its
/// inclusive upper boundary reads one slot past the data and must come back
/// null rather than panic.
pub fn cell_at(array: &ArrayRef, idx: usize) -> Option<CellValue> {
    if idx >= array.len() || array.is_null(idx) {
        return None;
    }
    let any = array.as_any();
    if let Some(a) = any.downcast_ref::<Int32Array>() {
        return Some(CellValue::Int32(a.value(idx)));
    }
    if let Some(a) = any.downcast_ref::<Int64Array>() {
        return Some(CellValue::Int64(a.value(idx)));
    }
    if let Some(a) = any.downcast_ref::<Float32Array>() {
        return Some(CellValue::Float32(a.value(idx)));
    }
    if let Some(a) = any.downcast_ref::<Float64Array>() {
        return Some(CellValue::Float64(a.value(idx)));
    }
    None
}

/// Copy the dense values of a fixed-width primitive array into `out` as
/// little-endian bytes. Null slots copy whatever the array's value buffer
/// holds; callers track validity separately.
///
/// Returns `false` when the array type is not storable or `out` is too small.
pub fn copy_values_le(array: &ArrayRef, out: &mut [u8]) -> bool {
    let any = array.as_any();
    if let Some(a) = any.downcast_ref::<Int32Array>() {
        return copy_with(a.values(), out, |v: &i32| v.to_le_bytes());
    }
    if let Some(a) = any.downcast_ref::<Int64Array>() {
        return copy_with(a.values(), out, |v: &i64| v.to_le_bytes());
    }
    if let Some(a) = any.downcast_ref::<Float32Array>() {
        return copy_with(a.values(), out, |v: &f32| v.to_le_bytes());
    }
    if let Some(a) = any.downcast_ref::<Float64Array>() {
        return copy_with(a.values(), out, |v: &f64| v.to_le_bytes());
    }
    false
}

fn copy_with<T, const W: usize>(values: &[T], out: &mut [u8], enc: impl Fn(&T) -> [u8; W]) -> bool {
    if out.len() < values.len() * W {
        return false;
    }
    for (i, v) in values.iter().enumerate() {
        out[i * W..(i + 1) * W].copy_from_slice(&enc(v));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn cell_at_handles_nulls_and_bounds() {
        let arr: ArrayRef = Arc::new(Int64Array::from(vec![Some(7), None, Some(-3)]));
        assert_eq!(cell_at(&arr, 0), Some(CellValue::Int64(7)));
        assert_eq!(cell_at(&arr, 1), None);
        assert_eq!(cell_at(&arr, 2), Some(CellValue::Int64(-3)));
        // One past the end is a legal probe (inclusive run boundary), not a panic.
        assert_eq!(cell_at(&arr, 3), None);
    }

    #[test]
    fn dense_copy_round_trips_through_le_bytes() {
        let arr: ArrayRef = Arc::new(Int32Array::from(vec![1, -2, 300]));
        let mut buf = vec![0u8; 12];
        assert!(copy_values_le(&arr, &mut buf));
        assert_eq!(
            CellValue::from_le_bytes(&DataType::Int32, &buf[4..]),
            Some(CellValue::Int32(-2))
        );
    }

    #[test]
    fn unsupported_types_are_rejected() {
        assert_eq!(cell_width(&DataType::Utf8), None);
        assert_eq!(cell_width(&DataType::Int64), Some(8));
    }
}
