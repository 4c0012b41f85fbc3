//! Accelerator interface for chunk execution.
//!
//! A scan session compiles one kernel program per scan, opens one command
//! queue per device unit, and submits chunk buffers for asynchronous
//! evaluation. Each submission passes through three chained stages (copy-in,
//! execute, copy-out), every stage producing its own completion signal; a
//! chunk is consumable once all three have completed. Stages of one
//! submission never reorder; distinct submissions may complete out of order.
//!
//! [`host::HostDevice`] is the in-process reference implementation used by
//! tests and benchmarks: real worker threads, real asynchronous completion,
//! and a line-per-predicate kernel text format (see [`kernel`]).

use std::sync::Arc;

use arrow::buffer::BooleanBuffer;
use arrow::datatypes::DataType;
use lode_result::Result;
use lode_types::ColumnOrdinal;

pub mod host;
pub mod kernel;

pub use host::{HostDevice, HostQueue, HostSubmission};
pub use kernel::KernelProgram;

/// A parallel compute device: kernel compiler plus per-unit command queues.
pub trait Device: Send + Sync + 'static {
    type Program: Clone + Send + Sync + 'static;
    type Queue: CommandQueue<Program = Self::Program>;

    /// Number of independent compute units; the session opens one command
    /// queue per unit and round-robins chunks across them.
    fn unit_count(&self) -> usize;

    /// Build the opaque kernel source for all units.
    ///
    /// Failure is `Error::DeviceBuild` carrying the build log captured per
    /// failing unit; the session has no host-only fallback.
    fn compile(&self, source: &[u8]) -> Result<Self::Program>;

    /// Create the command queue for one unit. Failure is
    /// `Error::DeviceResource`; the caller releases any queues it already
    /// created (in reverse order) before propagating.
    fn create_queue(&self, unit: usize) -> Result<Self::Queue>;
}

/// An in-order command queue on one device unit.
pub trait CommandQueue: Send + 'static {
    type Program;
    type Submission: Submission;

    /// Enqueue copy-in → execute → copy-out for one chunk and return
    /// immediately with a handle to the chain's completion signals.
    fn submit(&mut self, program: &Self::Program, input: KernelInput) -> Result<Self::Submission>;
}

/// Completion handle for one submitted chunk.
///
/// Dropping a submission releases its handle without cancelling the work;
/// the device finishes the in-flight stages unobserved.
pub trait Submission: Send + 'static {
    /// Per-stage completion signals, in chain order.
    fn progress(&self) -> StageProgress;

    /// Non-blocking completion check. Yields the output exactly once, after
    /// all three stages have completed.
    fn poll(&mut self) -> Result<Option<KernelOutput>>;

    /// Block until the chain completes and take the output.
    fn wait(&mut self) -> Result<KernelOutput>;
}

/// Completion state of the three stages of one submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageProgress {
    pub copy_in: bool,
    pub execute: bool,
    pub copy_out: bool,
}

impl StageProgress {
    #[inline]
    pub fn complete(&self) -> bool {
        self.copy_in && self.execute && self.copy_out
    }
}

/// One column shipped to the device: dense little-endian values, optional
/// validity bitmap (absent ⇒ no nulls in this chunk).
#[derive(Clone, Debug)]
pub struct KernelColumn {
    pub ordinal: ColumnOrdinal,
    pub data_type: DataType,
    pub values: Arc<Vec<u8>>,
    pub validity: Option<Arc<Vec<u8>>>,
}

/// Input of one chunk execution.
#[derive(Clone, Debug)]
pub struct KernelInput {
    pub rows: usize,
    /// Kernel dispatch granularity hint; semantics belong to the device.
    pub work_group: usize,
    pub rowmap: BooleanBuffer,
    pub columns: Vec<KernelColumn>,
}

/// Result of one chunk execution: the validity bitmap narrowed to rows whose
/// predicates hold. Rows with a null predicate operand are dropped.
#[derive(Clone, Debug)]
pub struct KernelOutput {
    pub rowmap: BooleanBuffer,
}
