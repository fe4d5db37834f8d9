use std::io::{self, Seek, SeekFrom, Write};

use crate::error::{RiffError, Result};
use crate::fourcc::FourCC;

use super::chunk::{pad_len, ChunkKind};

struct WriteCtx {
    kind: ChunkKind,
    /// Absolute offset of this chunk's 4-byte size field, for back-patching.
    size_field_pos: u64,
    /// Bytes written so far within this chunk's data, including the
    /// 4-byte form id for container chunks.
    consumed: u32,
}

/// Streaming RIFF writer: the inverse of [`super::RiffReader`]. Chunk sizes
/// are unknown up front, so `begin_chunk` reserves a zero size field and
/// `end_chunk` seeks back to patch it once the chunk's true size is known
/// (spec.md §4.2 "Writing is always append-only from the handle's
/// perspective during `close_chunk` back-patches, which must seek back and
/// restore position").
pub struct RiffWriter<W> {
    inner: W,
    stack: Vec<WriteCtx>,
}

impl<W: Write + Seek> RiffWriter<W> {
    pub fn new(inner: W) -> Self {
        RiffWriter { inner, stack: Vec::new() }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Opens the outermost `RIFF` chunk with the given form id.
    pub fn start_write(&mut self, form: FourCC) -> Result<()> {
        self.begin_chunk(ChunkKind::Riff, FourCC(*b"RIFF"), Some(form))
    }

    /// Begins a new chunk as a child of the currently open chunk (or, if
    /// none is open, as the root). `id` is the literal 4-byte tag written
    /// for `Sub` chunks, and ignored (always `"LIST"`) for `List` chunks;
    /// `form` must be `Some` for `Riff`/`List` chunks.
    pub fn begin_chunk(&mut self, kind: ChunkKind, id: FourCC, form: Option<FourCC>) -> Result<()> {
        let tag = match kind {
            ChunkKind::Riff => *b"RIFF",
            ChunkKind::List => *b"LIST",
            ChunkKind::Sub => id.0,
        };
        self.inner.write_all(&tag)?;
        let size_field_pos = self.inner.stream_position()?;
        self.inner.write_all(&0u32.to_le_bytes())?;

        let consumed_init = if kind == ChunkKind::Sub {
            0u32
        } else {
            let form = form.ok_or(RiffError::InvalidData("container chunk needs a form id".into()))?;
            self.inner.write_all(&form.0)?;
            4u32
        };

        if let Some(parent) = self.stack.last_mut() {
            parent.consumed = parent.consumed.saturating_add(8).saturating_add(consumed_init);
        }

        self.stack.push(WriteCtx { kind, size_field_pos, consumed: consumed_init });
        Ok(())
    }

    /// Convenience for opening a `LIST` chunk.
    pub fn begin_list(&mut self, form: FourCC) -> Result<()> {
        self.begin_chunk(ChunkKind::List, FourCC(*b"LIST"), Some(form))
    }

    /// Convenience for opening a leaf chunk.
    pub fn begin_sub(&mut self, id: FourCC) -> Result<()> {
        self.begin_chunk(ChunkKind::Sub, id, None)
    }

    /// Closes the current chunk: writes its pad byte if needed and
    /// back-patches its size field.
    pub fn end_chunk(&mut self) -> Result<()> {
        let ctx = self.stack.pop().ok_or(RiffError::NoOpenChunk)?;
        let size = ctx.consumed;
        let pad = pad_len(size);
        if pad == 1 {
            self.inner.write_all(&[0u8])?;
        }
        let end_pos = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(ctx.size_field_pos))?;
        self.inner.write_all(&size.to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(end_pos))?;

        if let Some(parent) = self.stack.last_mut() {
            parent.consumed = parent.consumed.saturating_add(size).saturating_add(pad);
        }
        Ok(())
    }

    /// Alias for [`Self::end_chunk`].
    pub fn close_chunk(&mut self) -> Result<()> {
        self.end_chunk()
    }

    fn bump(&mut self, n: u32) {
        if let Some(ctx) = self.stack.last_mut() {
            ctx.consumed = ctx.consumed.saturating_add(n);
        }
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.inner.write_all(&[v])?;
        self.bump(1);
        Ok(())
    }

    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_u8(v as u8)
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.inner.write_all(&v.to_le_bytes())?;
        self.bump(2);
        Ok(())
    }

    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.write_u16(v as u16)
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.inner.write_all(&v.to_le_bytes())?;
        self.bump(4);
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_u32(v as u32)
    }

    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf)?;
        self.bump(buf.len() as u32);
        Ok(())
    }

    pub fn write_fourcc(&mut self, id: FourCC) -> Result<()> {
        self.write_bytes(&id.0)
    }

    /// Writes `s` truncated/zero-padded to exactly `len` bytes.
    pub fn write_fixed_string(&mut self, s: &str, len: usize) -> Result<()> {
        let mut buf = vec![0u8; len];
        let bytes = s.as_bytes();
        let n = bytes.len().min(len);
        buf[..n].copy_from_slice(&bytes[..n]);
        self.write_bytes(&buf)
    }

    /// Current stream position, for recording sample byte offsets etc.
    pub fn tell(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riff::{ChunkKind as CK, RiffReader};
    use std::io::Cursor;

    #[test]
    fn writes_and_reads_back_nested_chunks() {
        let mut w = RiffWriter::new(Cursor::new(Vec::<u8>::new()));
        w.start_write(FourCC(*b"TEST")).unwrap();
        w.begin_list(FourCC(*b"abcd")).unwrap();
        w.begin_sub(FourCC(*b"leaf")).unwrap();
        w.write_bytes(b"hi").unwrap();
        w.end_chunk().unwrap(); // leaf
        w.end_chunk().unwrap(); // list
        w.end_chunk().unwrap(); // root

        let bytes = w.into_inner().into_inner();
        let mut r = RiffReader::new(Cursor::new(bytes));
        let root = r.start_read().unwrap();
        assert_eq!(root.kind, CK::Riff);
        assert_eq!(root.id, FourCC(*b"TEST"));
        let list = r.read_chunk().unwrap().unwrap();
        assert_eq!(list.id, FourCC(*b"abcd"));
        let leaf = r.read_chunk().unwrap().unwrap();
        assert_eq!(leaf.declared_size, 2);
        assert_eq!(r.read_fixed_string(2).unwrap(), "hi");
    }

    #[test]
    fn pads_odd_sized_chunks() {
        let mut w = RiffWriter::new(Cursor::new(Vec::<u8>::new()));
        w.start_write(FourCC(*b"TEST")).unwrap();
        w.begin_sub(FourCC(*b"odd1")).unwrap();
        w.write_bytes(b"xyz").unwrap();
        w.end_chunk().unwrap();
        w.begin_sub(FourCC(*b"nxt2")).unwrap();
        w.end_chunk().unwrap();
        w.end_chunk().unwrap();

        let bytes = w.into_inner().into_inner();
        let mut r = RiffReader::new(Cursor::new(bytes));
        r.start_read().unwrap();
        let odd = r.read_chunk().unwrap().unwrap();
        assert_eq!(odd.declared_size, 3);
        r.end_chunk().unwrap();
        let nxt = r.read_chunk().unwrap().unwrap();
        assert_eq!(nxt.id, FourCC(*b"nxt2"));
    }
}
