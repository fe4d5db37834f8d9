//! GigaSampler format support (spec.md §4.4): DLS-2 superset with
//! multi-dimension sample regions, layered on [`crate::dls`]'s structural
//! parsing and writing.

pub mod effects;
pub mod fourcc;
pub mod reader;
pub mod writer;

pub use reader::read;
pub use writer::write;
