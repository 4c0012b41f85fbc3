//! Resolving a base table into its companion relation set.
//!
//! A lode table is a foreign base table plus a fixed family of companions
//! under a naming scheme derived from the table name: the row-validity store
//! `t.rowid` (with ordering index `t.idx`), per-column stores `t.<col>.cs`
//! (with indexes `t.<col>.idx`), and the row-id sequence `t.seq`. The
//! resolver opens and kind-checks every one of them; on any failure it gives
//! back the locks it already took, in reverse order, before the error
//! propagates.

use std::sync::Arc;

use lode_result::{Error, Result};
use lode_storage::{
    BaseRelation, Catalog, CatalogRelation, ColumnIndex, ColumnSegmentStore, LODE_HANDLER,
    Relation, RowIdSequence, RowMapStore,
};
use lode_types::{ColumnOrdinal, LockMode, RelationKind};

/// Store + optional index handles for one non-dropped column.
pub struct ColumnHandles {
    pub store: Arc<dyn ColumnSegmentStore>,
    pub index: Option<Arc<dyn ColumnIndex>>,
}

/// Exclusive, session-lifetime bundle of every handle a scan needs.
pub struct RelationSet {
    base: Arc<dyn BaseRelation>,
    rowmap: Arc<dyn RowMapStore>,
    rowmap_index: Option<Arc<dyn ColumnIndex>>,
    columns: Vec<Option<ColumnHandles>>,
    sequence: Arc<dyn RowIdSequence>,
    lock_mode: LockMode,
    closed: bool,
}

impl std::fmt::Debug for RelationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationSet")
            .field("base", &self.base.name())
            .field("rowmap", &self.rowmap.name())
            .field("rowmap_index", &self.rowmap_index.as_ref().map(|i| i.name()))
            .field("columns", &self.columns.len())
            .field("lock_mode", &self.lock_mode)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Tracks relations opened so far so the failure path can release them in
/// reverse order.
struct OpenTrail<'a> {
    catalog: &'a dyn Catalog,
    mode: LockMode,
    opened: Vec<Relation>,
}

impl<'a> OpenTrail<'a> {
    fn open(&mut self, name: &str) -> Result<Relation> {
        let relation = self.catalog.open(name, self.mode)?;
        self.opened.push(relation.clone());
        Ok(relation)
    }

    fn unwind(self) {
        for relation in self.opened.into_iter().rev() {
            relation.release(self.mode);
        }
    }
}

fn wrong_kind(relation: &Relation, expected: RelationKind) -> Error {
    Error::WrongKind {
        relation: relation.name().to_string(),
        expected: expected.describe(),
        actual: relation.kind().describe(),
    }
}

impl RelationSet {
    /// Open the base table and every companion under `mode`.
    ///
    /// Fails with `NotManaged` if the base table is not a foreign table
    /// carried by this extension's handler, `WrongKind` if any companion
    /// resolves to an unexpected relation kind, and `NotFound` if a
    /// companion is missing. All locks taken before the failure are
    /// released before the error returns.
    pub fn open(
        catalog: &dyn Catalog,
        table: &str,
        mode: LockMode,
        with_index: bool,
    ) -> Result<RelationSet> {
        let mut trail = OpenTrail {
            catalog,
            mode,
            opened: Vec::new(),
        };
        match Self::open_inner(&mut trail, table, with_index) {
            Ok(mut relset) => {
                relset.lock_mode = mode;
                Ok(relset)
            }
            Err(e) => {
                trail.unwind();
                Err(e)
            }
        }
    }

    fn open_inner(
        trail: &mut OpenTrail<'_>,
        table: &str,
        with_index: bool,
    ) -> Result<RelationSet> {
        let base = match trail.open(table)? {
            Relation::Base(base) => base,
            other => return Err(wrong_kind(&other, RelationKind::Base)),
        };
        if base.handler() != LODE_HANDLER {
            return Err(Error::NotManaged(table.to_string()));
        }

        let rowmap = match trail.open(&format!("{table}.rowid"))? {
            Relation::RowMap(rowmap) => rowmap,
            other => return Err(wrong_kind(&other, RelationKind::RowMap)),
        };
        let rowmap_index = if with_index {
            match trail.open(&format!("{table}.idx"))? {
                Relation::Index(index) => Some(index),
                other => return Err(wrong_kind(&other, RelationKind::Index)),
            }
        } else {
            None
        };

        let mut columns = Vec::with_capacity(base.schema().len());
        for meta in base.schema() {
            if meta.dropped {
                columns.push(None);
                continue;
            }
            let store = match trail.open(&format!("{table}.{}.cs", meta.name))? {
                Relation::Column(store) => store,
                other => return Err(wrong_kind(&other, RelationKind::ColumnStore)),
            };
            let index = if with_index {
                match trail.open(&format!("{table}.{}.idx", meta.name))? {
                    Relation::Index(index) => Some(index),
                    other => return Err(wrong_kind(&other, RelationKind::Index)),
                }
            } else {
                None
            };
            columns.push(Some(ColumnHandles { store, index }));
        }

        let sequence = match trail.open(&format!("{table}.seq"))? {
            Relation::Sequence(sequence) => sequence,
            other => return Err(wrong_kind(&other, RelationKind::Sequence)),
        };

        Ok(RelationSet {
            base,
            rowmap,
            rowmap_index,
            columns,
            sequence,
            lock_mode: LockMode::AccessShare,
            closed: false,
        })
    }

    pub fn base(&self) -> &Arc<dyn BaseRelation> {
        &self.base
    }

    pub fn rowmap(&self) -> &Arc<dyn RowMapStore> {
        &self.rowmap
    }

    pub fn rowmap_index(&self) -> Option<&Arc<dyn ColumnIndex>> {
        self.rowmap_index.as_ref()
    }

    /// Handles for one column, `None` for dropped columns or out-of-range
    /// ordinals.
    pub fn column(&self, ordinal: ColumnOrdinal) -> Option<&ColumnHandles> {
        self.columns.get(ordinal as usize).and_then(|c| c.as_ref())
    }

    /// Number of attributes in the base table, dropped columns included.
    pub fn num_attrs(&self) -> usize {
        self.columns.len()
    }

    pub fn sequence(&self) -> &Arc<dyn RowIdSequence> {
        &self.sequence
    }

    /// Release every held lock. Columns release in reverse open order, then
    /// the row-map index, row-map, sequence, and base. Safe to call more
    /// than once; only the first call releases anything.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for handles in self.columns.iter().flatten().rev() {
            if let Some(index) = &handles.index {
                index.release(self.lock_mode);
            }
            handles.store.release(self.lock_mode);
        }
        if let Some(index) = &self.rowmap_index {
            index.release(self.lock_mode);
        }
        self.rowmap.release(self.lock_mode);
        self.sequence.release(self.lock_mode);
        self.base.release(self.lock_mode);
        tracing::debug!(table = self.base.name(), "relation set closed");
    }
}

impl Drop for RelationSet {
    fn drop(&mut self) {
        self.close();
    }
}
