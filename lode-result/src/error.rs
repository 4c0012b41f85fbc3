use std::fmt;
use thiserror::Error;

/// Unified error type for all lode operations.
///
/// Every variant is fatal for the scan session that produced it. Recoverable
/// conditions (a row-id range with no stored values, the row-validity store
/// running out of entries, a forward-probe miss) are not errors and never
/// appear here.
///
/// # Thread Safety
///
/// `Error` is `Send` and `Sync` so failures can cross the boundary between
/// the control thread and device worker threads.
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecognized or inconsistent planner/session parameter.
    ///
    /// Raised while validating a scan descriptor or session configuration:
    /// a column ordinal that does not exist, a predicate column without a
    /// kernel to evaluate it, a chunk size that is not a multiple of eight.
    /// Aborts scan setup before any storage handle is opened for iteration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The base relation is not a foreign table managed by the lode handler.
    ///
    /// Scans only run over base tables whose handler tag matches this
    /// extension; anything else (a plain heap, a foreign table owned by a
    /// different wrapper) is rejected up front.
    #[error("\"{0}\" is not a table managed by the lode handler")]
    NotManaged(String),

    /// A companion object resolved to a relation of the wrong kind.
    ///
    /// The row-validity store, each column store, their indexes, and the
    /// row-id sequence are resolved by name; if the catalog hands back a
    /// relation of an unexpected kind the scan fails before any state is
    /// allocated.
    #[error("\"{relation}\" is not {expected} (found {actual})")]
    WrongKind {
        relation: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A named relation does not exist in the catalog.
    #[error("relation \"{0}\" does not exist")]
    NotFound(String),

    /// Device kernel compile/build failure.
    ///
    /// The build log is captured per failing device unit and surfaced
    /// verbatim. There is no degrade-to-host fallback: predicate evaluation
    /// depends on the compiled kernel, so the whole scan fails.
    #[error("device kernel build failed:\n{log}")]
    DeviceBuild { log: String },

    /// Command-queue creation (or another device allocation) failed
    /// mid-initialization.
    ///
    /// Already-created queues and the compiled program for the session are
    /// released before this propagates.
    #[error("device resource error: {0}")]
    DeviceResource(String),

    /// The underlying storage layer reported a broken invariant.
    ///
    /// Examples: a row-validity bitmap whose length does not match the
    /// configured chunk size, a chunk row-id that is not chunk-aligned, or a
    /// column segment extending past its chunk boundary.
    #[error("storage error: {0}")]
    Storage(String),

    /// Arrow error during columnar data operations.
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Internal error indicating a bug or unexpected state.
    #[error("an internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error from any displayable error.
    #[inline]
    pub fn storage<E: fmt::Display>(err: E) -> Self {
        Error::Storage(err.to_string())
    }

    /// Create an internal error from any displayable error.
    #[inline]
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        Error::Internal(err.to_string())
    }
}
