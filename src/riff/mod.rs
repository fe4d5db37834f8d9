//! The RIFF chunk engine (spec.md §3.1, §4.2): a reusable, streaming
//! parser/writer of little-endian IFF/RIFF chunk hierarchies with position
//! tracking, buffered I/O, and recoverable errors.
//!
//! The teacher (`dse`) reads its own fixed-layout records directly with
//! `byteorder`, with no notion of a generic nested-chunk stack (its format
//! has none). The nearest architectural cousin in the retrieval pack is
//! `symphonia-format-riff`'s `ChunksReader`, a manual (non-derive) loop over
//! sibling chunks; we generalize that shape into a full push/pop *stack* of
//! nested contexts (spec.md needs depth, not just one level, because SF2's
//! hydra reordering needs `push_state`/`pop_state` to jump between sibling
//! subtrees) and add the writer side, which has no precedent in the pack
//! (Symphonia is decode-only) and is built from spec.md §4.2 directly,
//! kept symmetric with the reader so both sides agree on what "chunk size"
//! means.

mod chunk;
mod reader;
mod writer;

pub use chunk::{Chunk, ChunkKind};
pub use reader::RiffReader;
pub use writer::RiffWriter;
