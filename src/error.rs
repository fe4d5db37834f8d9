//! Error types for the patch-tree core.
//!
//! Follows the teacher's flat `thiserror`-enum convention (`dse::dtype::DSEError`),
//! split per spec.md §7 into the RIFF layer, the format layer, the swap
//! allocator, and a programmer-error variant for structurally impossible
//! tree operations.

use std::io;
use thiserror::Error;

use crate::fourcc::FourCC;

/// Errors from the RIFF chunk engine (spec.md §4.2).
#[derive(Debug, Error)]
pub enum RiffError {
    #[error("expected chunk id {expected}, found {found}")]
    UnexpectedId { expected: FourCC, found: FourCC },

    #[error("expected {expected} chunk, found a different chunk kind")]
    UnexpectedKind { expected: &'static str },

    #[error("chunk size mismatch: declared {declared}, consumed {consumed}")]
    SizeMismatch { declared: u32, consumed: u32 },

    #[error("invalid RIFF data: {0}")]
    InvalidData(String),

    #[error("no chunk context is open")]
    NoOpenChunk,
}

/// Errors surfaced by a format reader/writer (spec.md §7).
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// A DLS reader hit a GIG-only chunk; the caller should rewind and
    /// restart the read in GIG mode (spec.md §4.4, Scenario E).
    #[error("GIG-only content detected while reading as DLS")]
    GigDetected,

    #[error("invalid sample {name:?}: {reason}")]
    InvalidSample { name: String, reason: String },

    #[error("unrecognized file format (not RIFF, or unknown FORM)")]
    UnknownFormat,
}

/// Swap-file allocator errors (spec.md §3.6).
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("swap file is out of space")]
    OutOfSpace,

    #[error("swap store handle is not open")]
    NotOpen,
}

/// Attempted a structurally impossible tree mutation.
#[derive(Debug, Error)]
pub enum ProgrammerError {
    #[error("cannot add a child of type {child} to a parent of type {parent}")]
    InvalidChildType { parent: &'static str, child: &'static str },
}

/// Top-level error type returned by public core APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Riff(#[from] RiffError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error(transparent)]
    Programmer(#[from] ProgrammerError),
}

pub type Result<T> = std::result::Result<T, Error>;
