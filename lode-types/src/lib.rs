//! Identifiers and plain value types shared across the lode crates.
//!
//! These live in `lode-types` so they can be reused without depending on the
//! storage- or device-specific crates.

pub mod ids;
pub mod kind;
pub mod value;

pub use ids::{ColumnOrdinal, RowId, chunk_base, is_chunk_aligned};
pub use kind::{LockMode, Predictability, RelationKind};
pub use value::{CellValue, cell_at, cell_width, copy_values_le};
