//! The pull-based scan session consumed by the surrounding query engine.
//!
//! `begin` assembles everything the iteration loop needs: compiled kernel,
//! per-unit command queues, the relation set, the row-map scan, and one
//! column reader per lazily-read column. Every failure on the way releases
//! whatever was already acquired before propagating. `next` walks validity
//! bitmaps chunk by chunk, keeping the device pipeline full behind the
//! cursor. `end` is idempotent and also runs on drop.

use lode_result::{Error, Result};
use lode_device::Device;
use lode_storage::{Catalog, ColumnSegmentStore};
use lode_types::{CellValue, ColumnOrdinal, LockMode, Predictability, RowId, cell_width};
use rustc_hash::FxHashMap;

use crate::chunk::Chunk;
use crate::column_cache::ColumnReader;
use crate::loader::ChunkLoader;
use crate::pipeline::Pipeline;
use crate::relset::RelationSet;
use crate::{ScanConfig, ScanDescriptor, ScanRow};

struct CurrentChunk {
    chunk: Chunk,
    bit: usize,
}

/// One scan over one table. Exclusive owner of its relation set, column
/// caches, and device resources.
pub struct ScanSession<D: Device> {
    relset: RelationSet,
    descriptor: ScanDescriptor,
    config: ScanConfig,
    loader: Option<ChunkLoader>,
    pipeline: Pipeline<D::Queue>,
    readers: FxHashMap<ColumnOrdinal, ColumnReader>,
    current: Option<CurrentChunk>,
    ended: bool,
}

impl<D: Device> ScanSession<D> {
    /// Set up a scan session. Fatal paths, in discovery order: configuration
    /// validation, kernel build (log surfaced per failing unit), command
    /// queue creation (already-created queues released in reverse order,
    /// then the program), relation resolution, descriptor/schema mismatch.
    pub fn begin(
        catalog: &dyn Catalog,
        device: &D,
        descriptor: ScanDescriptor,
        config: ScanConfig,
    ) -> Result<Self> {
        config.validate()?;

        let needs_device = descriptor.predictable == Predictability::DependsOnData;
        let mut program = None;
        let mut queues = Vec::new();
        if needs_device {
            let source = descriptor.kernel_source.as_deref().ok_or_else(|| {
                Error::Config("predicate evaluation requested without a kernel".to_string())
            })?;
            let compiled = device.compile(source)?;
            for unit in 0..device.unit_count() {
                match device.create_queue(unit) {
                    Ok(queue) => queues.push(queue),
                    Err(e) => {
                        while let Some(queue) = queues.pop() {
                            drop(queue);
                        }
                        drop(compiled);
                        return Err(e);
                    }
                }
            }
            if queues.is_empty() {
                return Err(Error::DeviceResource(
                    "device reports no compute units".to_string(),
                ));
            }
            program = Some(compiled);
        }

        let relset = RelationSet::open(catalog, &descriptor.table, LockMode::AccessShare, true)?;
        validate_descriptor(&descriptor, &relset)?;

        let loader = ChunkLoader::new(&relset)?;

        // Predicate columns arrive in chunk buffers; everything else the
        // executor wants resolves lazily per row.
        let mut readers = FxHashMap::default();
        for &ordinal in &descriptor.required_columns {
            if needs_device && descriptor.predicate_columns.contains(&ordinal) {
                continue;
            }
            let handles = relset
                .column(ordinal)
                .ok_or_else(|| Error::Internal(format!("column {ordinal} vanished after validation")))?;
            let index = handles.index.as_ref().ok_or_else(|| {
                Error::Internal(format!("column {ordinal} was opened without an index"))
            })?;
            readers.insert(ordinal, ColumnReader::new(index.as_ref())?);
        }

        let pipeline = Pipeline::new(
            queues,
            program,
            config.max_async_chunks,
            config.work_group_size,
        );
        tracing::debug!(
            table = %descriptor.table,
            predictable = ?descriptor.predictable,
            "scan session started"
        );
        Ok(Self {
            relset,
            descriptor,
            config,
            loader: Some(loader),
            pipeline,
            readers,
            current: None,
            ended: false,
        })
    }

    /// Produce the next row, or `Ok(None)` at end-of-scan.
    pub fn next(&mut self) -> Result<Option<ScanRow>> {
        if self.ended || self.descriptor.predictable == Predictability::DefinitelyEmpty {
            return Ok(None);
        }
        loop {
            if self.current.is_none() && !self.advance_chunk()? {
                return Ok(None);
            }
            let current = self
                .current
                .as_mut()
                .ok_or_else(|| Error::Internal("no current chunk after advance".to_string()))?;
            while current.bit < current.chunk.rows() {
                let offset = current.bit;
                current.bit += 1;
                if current.chunk.is_live(offset) {
                    let row = emit_row(
                        &self.descriptor,
                        &self.relset,
                        &mut self.readers,
                        &current.chunk,
                        offset,
                    )?;
                    return Ok(Some(row));
                }
            }
            tracing::trace!(rowid = current.chunk.rowid(), "chunk consumed");
            self.current = None;
        }
    }

    /// Rewind to the first chunk: restart the row-map walk, drop every
    /// outstanding pipeline slot (in-flight device work is released, not
    /// awaited), and discard the column caches.
    pub fn rescan(&mut self) -> Result<()> {
        if self.ended {
            return Err(Error::Internal("rescan on an ended session".to_string()));
        }
        self.current = None;
        self.pipeline.clear_chunks();
        let loader = self
            .loader
            .as_mut()
            .ok_or_else(|| Error::Internal("rescan without a loader".to_string()))?;
        loader.rewind()?;
        for reader in self.readers.values_mut() {
            reader.reset()?;
        }
        tracing::debug!(table = %self.descriptor.table, "scan rewound");
        Ok(())
    }

    /// Tear the session down: device submissions, queues and program, column
    /// readers, the row-map scan, and every relation lock. Safe to call more
    /// than once; later calls are no-ops.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.current = None;
        self.pipeline.release();
        self.readers.clear();
        self.loader = None;
        self.relset.close();
        tracing::debug!(table = %self.descriptor.table, "scan session ended");
    }

    /// Keep the pipeline full behind the cursor, then surface the front
    /// chunk. `Ok(false)` means end-of-scan: the row-validity store is
    /// exhausted and no chunk remains in any pipeline state; in every other
    /// case this blocks until the front chunk's stages complete.
    fn advance_chunk(&mut self) -> Result<bool> {
        loop {
            self.refill()?;
            self.pipeline.poll()?;
            if self.pipeline.wait_front()? {
                let chunk = self
                    .pipeline
                    .pop_ready()
                    .ok_or_else(|| Error::Internal("ready chunk vanished from front".to_string()))?;
                tracing::trace!(
                    rowid = chunk.rowid(),
                    live = chunk.live_count(),
                    "chunk current"
                );
                self.current = Some(CurrentChunk { chunk, bit: 0 });
                return Ok(true);
            }
            let exhausted = self.loader.as_ref().map(|l| l.exhausted()).unwrap_or(true);
            if exhausted {
                return Ok(false);
            }
        }
    }

    fn refill(&mut self) -> Result<()> {
        let loader = self
            .loader
            .as_mut()
            .ok_or_else(|| Error::Internal("refill without a loader".to_string()))?;
        let execute = self.descriptor.predictable == Predictability::DependsOnData;
        while self.pipeline.has_capacity() && !loader.exhausted() {
            match loader.next_chunk(&self.relset, &self.descriptor, &self.config)? {
                Some(chunk) => self.pipeline.admit(chunk, execute)?,
                None => break,
            }
        }
        Ok(())
    }
}

impl<D: Device> Drop for ScanSession<D> {
    fn drop(&mut self) {
        self.end();
    }
}

fn validate_descriptor(descriptor: &ScanDescriptor, relset: &RelationSet) -> Result<()> {
    let nattrs = relset.num_attrs();
    for &ordinal in descriptor
        .required_columns
        .iter()
        .chain(descriptor.predicate_columns.iter())
    {
        if ordinal as usize >= nattrs {
            return Err(Error::Config(format!(
                "column ordinal {ordinal} out of range for {} attributes",
                nattrs
            )));
        }
        if relset.column(ordinal).is_none() {
            return Err(Error::Config(format!(
                "column ordinal {ordinal} refers to a dropped column"
            )));
        }
    }
    for &ordinal in &descriptor.predicate_columns {
        let handles = relset
            .column(ordinal)
            .ok_or_else(|| Error::Config(format!("predicate column {ordinal} has no store")))?;
        let data_type = handles.store.data_type();
        if cell_width(&data_type).is_none() {
            return Err(Error::Config(format!(
                "predicate column {ordinal} has non-fixed-width type {data_type:?}"
            )));
        }
    }
    if descriptor.predictable == Predictability::DependsOnData
        && descriptor.kernel_source.is_none()
    {
        return Err(Error::Config(
            "predicate evaluation requested without a kernel".to_string(),
        ));
    }
    Ok(())
}

fn emit_row(
    descriptor: &ScanDescriptor,
    relset: &RelationSet,
    readers: &mut FxHashMap<ColumnOrdinal, ColumnReader>,
    chunk: &Chunk,
    offset: usize,
) -> Result<ScanRow> {
    let row_id = chunk.rowid() + offset as RowId;
    let nattrs = relset.num_attrs();
    let mut cells: Vec<Option<CellValue>> = Vec::with_capacity(nattrs);
    for ordinal in 0..nattrs as ColumnOrdinal {
        // Unreferenced columns never touch their store.
        if !descriptor.required_columns.contains(&ordinal) {
            cells.push(None);
            continue;
        }
        // Columns loaded ahead of execution read straight from the chunk.
        if let Some(buffer) = chunk.column(ordinal) {
            cells.push(buffer.cell(offset));
            continue;
        }
        let reader = readers.get_mut(&ordinal).ok_or_else(|| {
            Error::Internal(format!("no column reader for required column {ordinal}"))
        })?;
        cells.push(reader.lookup(row_id)?);
    }
    Ok(ScanRow { row_id, cells })
}
