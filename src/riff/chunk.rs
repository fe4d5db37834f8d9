use crate::fourcc::FourCC;

/// The three chunk shapes a RIFF stream can hold (spec.md §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// The outermost `RIFF` container; carries a secondary form FOURCC.
    Riff,
    /// A `LIST` container; carries a secondary form FOURCC.
    List,
    /// An opaque-payload sub-chunk.
    Sub,
}

/// A parsed or in-progress chunk header plus bookkeeping.
///
/// `id` is the form FOURCC for `Riff`/`List` chunks (e.g. `sfbk`, `INFO`)
/// and the literal chunk tag for `Sub` chunks (e.g. `ifil`, `smpl`).
#[derive(Debug, Clone, Copy)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub id: FourCC,
    /// Declared size in bytes, as found in (or written to) the 4-byte
    /// size field. For `Riff`/`List` this includes the 4-byte form id.
    pub declared_size: u32,
    /// Absolute byte offset in the stream where this chunk's data begins
    /// (after the 8-byte header, and after the form id for containers).
    pub start_offset: u64,
}

impl Chunk {
    /// Size of this chunk's data, not counting the form id for containers.
    pub fn payload_size(&self) -> u32 {
        match self.kind {
            ChunkKind::Sub => self.declared_size,
            ChunkKind::Riff | ChunkKind::List => self.declared_size.saturating_sub(4),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ChunkKind::Riff | ChunkKind::List)
    }
}

/// One byte of zero padding is emitted after odd-sized chunk data
/// (spec.md §3.1).
pub fn pad_len(size: u32) -> u32 {
    size & 1
}
