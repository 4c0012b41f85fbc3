/// Kind of a relation handed out by the catalog.
///
/// A scan resolves one base table plus a fixed set of companion objects; the
/// resolver checks each handle against the kind it expects and fails with a
/// wrong-kind error on any mismatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// Foreign base table the scan is declared against.
    Base,
    /// Row-validity store: append-only (row id, bitmap) tuples.
    RowMap,
    /// Per-column secondary store of dense value segments.
    ColumnStore,
    /// Ordering index over a row-map or column store, keyed by row id.
    Index,
    /// Row-id allocator for the table.
    Sequence,
}

impl RelationKind {
    /// Human-readable article + noun, used in wrong-kind error messages.
    pub fn describe(self) -> &'static str {
        match self {
            RelationKind::Base => "a foreign table",
            RelationKind::RowMap => "a row-validity store",
            RelationKind::ColumnStore => "a column store",
            RelationKind::Index => "an index",
            RelationKind::Sequence => "a sequence",
        }
    }
}

/// Lock level requested when opening a relation.
///
/// The scan path only ever takes `AccessShare`; the stronger modes exist so
/// open/close pairs stay symmetric with the write path of the surrounding
/// engine. Actual blocking semantics belong to the storage engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    AccessShare,
    RowExclusive,
    AccessExclusive,
}

/// Planner verdict on whether result visibility is knowable without
/// evaluating predicate columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Predictability {
    /// Every row passing the validity bitmap is visible; no kernel runs.
    DefinitelyMatches,
    /// Statically known to match nothing; the scan short-circuits.
    DefinitelyEmpty,
    /// Predicate columns must be copied to the device and evaluated.
    DependsOnData,
}
