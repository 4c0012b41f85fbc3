//! Error types and result definitions for the lode scan engine.
//!
//! This crate provides the unified error type ([`Error`]) and result type
//! alias ([`Result<T>`]) used throughout the lode crates. All operations that
//! can fail return `Result<T>`; errors propagate across crate boundaries with
//! the `?` operator and are matched structurally where callers need to react
//! to a specific failure (for example, a kernel build failure versus a
//! mis-typed companion relation).
//!
//! # Error Categories
//!
//! - **Setup errors** ([`Error::Config`], [`Error::NotManaged`],
//!   [`Error::WrongKind`], [`Error::NotFound`]): discovered while a scan
//!   session is being assembled, before any row is produced.
//! - **Device errors** ([`Error::DeviceBuild`], [`Error::DeviceResource`]):
//!   kernel compilation and command-queue creation failures. Both are fatal
//!   for the session; there is no host-only fallback.
//! - **Data format errors** ([`Error::Arrow`]): Arrow array construction and
//!   conversion issues.
//! - **Storage errors** ([`Error::Storage`]): invariant violations reported
//!   by the underlying stores (misaligned chunk, bitmap length mismatch).
//! - **Internal errors** ([`Error::Internal`]): bugs or unexpected states.
//!
//! Note what is *not* here: exhausting the row-validity store and hitting a
//! row-id range with no stored column values are normal outcomes, expressed
//! as `Ok(None)` / short counts / null cells by the scan crates.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
