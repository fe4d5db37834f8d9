//! DLS Level 2 format support (spec.md §4.4): RIFF `DLS ` chunk layout,
//! reader, and writer. Shared by [`crate::gig`], which layers its own
//! chunks over this module's structural parsing.

pub mod fourcc;
pub mod reader;
pub mod writer;

pub use reader::{read, DlsMode};
pub use writer::write;
