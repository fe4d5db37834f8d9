//! SoundFont2 format support (spec.md §4.3): hydra chunk layout, reader,
//! and writer.

pub mod fourcc;
pub mod reader;
pub mod writer;

pub use reader::read;
pub use writer::{write, write_with_options, Sf2WriteOptions};
