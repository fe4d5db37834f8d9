use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{RiffError, Result};
use crate::fourcc::FourCC;

use super::chunk::{pad_len, Chunk, ChunkKind};

struct ReadCtx {
    chunk: Chunk,
    /// Bytes consumed so far within this chunk's data, including the
    /// 4-byte form id for container chunks.
    consumed: u32,
}

/// Streaming RIFF reader: pushes/pops nested chunk contexts, enforces size
/// accounting, and routes all primitive reads through itself so it can
/// track how much of the current chunk has been consumed (spec.md §4.2).
pub struct RiffReader<R> {
    inner: R,
    stack: Vec<ReadCtx>,
    saved: Vec<(u64, Vec<ChunkSnapshot>)>,
}

#[derive(Clone)]
struct ChunkSnapshot {
    chunk: Chunk,
    consumed: u32,
}

impl<R: Read + Seek> RiffReader<R> {
    pub fn new(inner: R) -> Self {
        RiffReader { inner, stack: Vec::new(), saved: Vec::new() }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Initializes the root context by reading the outermost `RIFF` chunk.
    pub fn start_read(&mut self) -> Result<Chunk> {
        match self.read_chunk()? {
            Some(c) if c.kind == ChunkKind::Riff => Ok(c),
            Some(_) => Err(RiffError::UnexpectedKind { expected: "RIFF" }.into()),
            None => Err(RiffError::InvalidData("empty stream".into()).into()),
        }
    }

    /// Reads the next chunk header at the current nesting level and pushes
    /// a context for it. Returns `None` when the parent chunk (or, at top
    /// level, the stream) has been exhausted.
    pub fn read_chunk(&mut self) -> Result<Option<Chunk>> {
        let remaining: u64 = match self.stack.last() {
            None => u64::MAX,
            Some(ctx) if ctx.chunk.declared_size == u32::MAX => u64::MAX,
            Some(ctx) => (ctx.chunk.declared_size.saturating_sub(ctx.consumed)) as u64,
        };
        if remaining < 8 {
            return Ok(None);
        }

        let mut tag = [0u8; 4];
        if self.inner.read_exact(&mut tag).is_err() {
            return Ok(None);
        }
        let size = read_u32_le(&mut self.inner)?;

        if let Some(ctx) = self.stack.last_mut() {
            ctx.consumed = ctx.consumed.saturating_add(8);
        }

        if remaining != u64::MAX {
            let parent_remaining_after_header = remaining - 8;
            let unbounded_sentinel = remaining as u32 == size && size == u32::MAX;
            if (parent_remaining_after_header as u32) < size && !unbounded_sentinel {
                return Err(RiffError::InvalidData(format!(
                    "chunk {} length {} exceeds parent's remaining {}",
                    FourCC(tag),
                    size,
                    parent_remaining_after_header
                ))
                .into());
            }
        }

        let kind = if &tag == b"RIFF" {
            ChunkKind::Riff
        } else if &tag == b"LIST" {
            ChunkKind::List
        } else {
            ChunkKind::Sub
        };

        let (id, consumed_init) = if kind == ChunkKind::Sub {
            (FourCC(tag), 0u32)
        } else {
            let mut form = [0u8; 4];
            self.inner.read_exact(&mut form)?;
            if let Some(ctx) = self.stack.last_mut() {
                ctx.consumed = ctx.consumed.saturating_add(4);
            }
            (FourCC(form), 4u32)
        };

        let start_offset = self.inner.stream_position()?;
        let chunk = Chunk { kind, id, declared_size: size, start_offset };
        self.stack.push(ReadCtx { chunk, consumed: consumed_init });
        Ok(Some(chunk))
    }

    /// Convenience wrapper: reads a chunk and verifies its kind and id.
    pub fn read_chunk_verify(&mut self, expected_kind: ChunkKind, expected_id: FourCC) -> Result<Chunk> {
        let c = self
            .read_chunk()?
            .ok_or(RiffError::InvalidData("expected a chunk, found end of parent".into()))?;
        if c.kind != expected_kind {
            return Err(RiffError::UnexpectedKind {
                expected: match expected_kind {
                    ChunkKind::Riff => "RIFF",
                    ChunkKind::List => "LIST",
                    ChunkKind::Sub => "SUB",
                },
            }
            .into());
        }
        if c.id != expected_id {
            return Err(RiffError::UnexpectedId { expected: expected_id, found: c.id }.into());
        }
        Ok(c)
    }

    /// Skips any unread bytes of the current chunk plus its pad byte, and
    /// pops the context.
    pub fn end_chunk(&mut self) -> Result<()> {
        let ctx = self.stack.pop().ok_or(RiffError::NoOpenChunk)?;
        let remaining = ctx.chunk.declared_size.saturating_sub(ctx.consumed) as i64;
        let pad = pad_len(ctx.chunk.declared_size) as i64;
        if remaining > 0 || pad > 0 {
            self.inner.seek(SeekFrom::Current(remaining + pad))?;
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.consumed = parent
                .consumed
                .saturating_add(ctx.chunk.declared_size)
                .saturating_add(pad as u32);
        }
        Ok(())
    }

    /// Alias for [`Self::end_chunk`].
    pub fn close_chunk(&mut self) -> Result<()> {
        self.end_chunk()
    }

    /// Ends the current chunk `n` times.
    pub fn skip_chunks(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.end_chunk()?;
        }
        Ok(())
    }

    /// Returns the chunk record at `depth_from_top`. Non-negative indices
    /// count from the outermost open chunk; `-1` is the innermost
    /// (currently open) chunk, `-2` its parent, and so on.
    pub fn get_chunk(&self, depth_from_top: isize) -> Option<Chunk> {
        let len = self.stack.len() as isize;
        let idx = if depth_from_top < 0 { len + depth_from_top } else { depth_from_top };
        if idx < 0 || idx >= len {
            None
        } else {
            Some(self.stack[idx as usize].chunk)
        }
    }

    /// Byte offset from the start of the current chunk's data.
    pub fn get_position(&mut self) -> Result<u64> {
        let start = self.stack.last().map(|c| c.chunk.start_offset).unwrap_or(0);
        Ok(self.inner.stream_position()? - start)
    }

    /// Saves `(file position, stack of open chunks)` so the reader can jump
    /// elsewhere and come back; used by the SF2 reader's hydra reordering
    /// (spec.md §4.3.1).
    pub fn push_state(&mut self) -> Result<()> {
        let pos = self.inner.stream_position()?;
        let snap = self.stack.iter().map(|c| ChunkSnapshot { chunk: c.chunk, consumed: c.consumed }).collect();
        self.saved.push((pos, snap));
        Ok(())
    }

    pub fn pop_state(&mut self) -> Result<()> {
        let (pos, snap) = self.saved.pop().ok_or(RiffError::InvalidData("no saved state".into()))?;
        self.inner.seek(SeekFrom::Start(pos))?;
        self.stack = snap.into_iter().map(|s| ReadCtx { chunk: s.chunk, consumed: s.consumed }).collect();
        Ok(())
    }

    fn bump(&mut self, n: u32) {
        if let Some(ctx) = self.stack.last_mut() {
            ctx.consumed = ctx.consumed.saturating_add(n);
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.inner.read_exact(&mut b)?;
        self.bump(1);
        Ok(b[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let v = read_u16_le(&mut self.inner)?;
        self.bump(2);
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let v = read_u32_le(&mut self.inner)?;
        self.bump(4);
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        self.bump(n as u32);
        Ok(buf)
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        self.bump(4);
        Ok(FourCC(buf))
    }

    /// Reads a fixed-length ASCII string, trimming a trailing NUL run.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

fn read_u16_le<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_simple_riff() -> Vec<u8> {
        // RIFF 'TEST' { LIST 'abcd' { 'leaf' "hi" } }
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        let size_pos = buf.len();
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(b"TEST");

        buf.extend_from_slice(b"LIST");
        let list_size_pos = buf.len();
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(b"abcd");

        buf.extend_from_slice(b"leaf");
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(b"hi");

        let list_size = (buf.len() - list_size_pos - 4) as u32;
        buf[list_size_pos..list_size_pos + 4].copy_from_slice(&list_size.to_le_bytes());

        let total_size = (buf.len() - size_pos - 4) as u32;
        buf[size_pos..size_pos + 4].copy_from_slice(&total_size.to_le_bytes());
        buf
    }

    #[test]
    fn reads_nested_chunks() {
        let data = build_simple_riff();
        let mut r = RiffReader::new(Cursor::new(data));
        let root = r.start_read().unwrap();
        assert_eq!(root.kind, ChunkKind::Riff);
        assert_eq!(root.id, FourCC(*b"TEST"));

        let list = r.read_chunk().unwrap().unwrap();
        assert_eq!(list.kind, ChunkKind::List);
        assert_eq!(list.id, FourCC(*b"abcd"));

        let leaf = r.read_chunk().unwrap().unwrap();
        assert_eq!(leaf.kind, ChunkKind::Sub);
        assert_eq!(leaf.id, FourCC(*b"leaf"));
        assert_eq!(leaf.declared_size, 2);
        let s = r.read_fixed_string(2).unwrap();
        assert_eq!(s, "hi");
        r.end_chunk().unwrap(); // leaf

        assert!(r.read_chunk().unwrap().is_none()); // list exhausted
        r.end_chunk().unwrap(); // list
        assert!(r.read_chunk().unwrap().is_none()); // root exhausted
        r.end_chunk().unwrap(); // root
    }

    #[test]
    fn push_pop_state_jumps_around() {
        let data = build_simple_riff();
        let mut r = RiffReader::new(Cursor::new(data));
        r.start_read().unwrap();
        r.push_state().unwrap();
        let list = r.read_chunk().unwrap().unwrap();
        assert_eq!(list.id, FourCC(*b"abcd"));
        r.pop_state().unwrap();
        // after pop, we should be able to read the same chunk again
        let list2 = r.read_chunk().unwrap().unwrap();
        assert_eq!(list2.id, FourCC(*b"abcd"));
    }

    #[test]
    fn odd_sized_chunk_skips_pad_byte() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(b"TEST");
        buf.extend_from_slice(b"odd1");
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(b"xyz");
        buf.push(0); // pad
        buf.extend_from_slice(b"nxt2");
        buf.extend_from_slice(&0u32.to_le_bytes());
        let total = (buf.len() - 8) as u32;
        buf[4..8].copy_from_slice(&total.to_le_bytes());

        let mut r = RiffReader::new(Cursor::new(buf));
        r.start_read().unwrap();
        let odd = r.read_chunk().unwrap().unwrap();
        assert_eq!(odd.declared_size, 3);
        r.end_chunk().unwrap();
        let nxt = r.read_chunk().unwrap().unwrap();
        assert_eq!(nxt.id, FourCC(*b"nxt2"));
    }
}
