//! The sample-data storage layer (spec.md §3.5): a polymorphic,
//! reference-counted abstraction over PCM audio bytes that can live in a
//! file region, in RAM, in the swap file, or in the split-24-bit SoundFont
//! arrangement.

pub mod data;
pub mod store;
pub mod swap;

pub use data::SampleData;
pub use store::{OpenMode, SampleFormat, SampleStore, StoreHandle};
