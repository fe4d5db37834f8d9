//! The process-wide swap-file allocator (spec.md §3.6, §5).
//!
//! A single swap file holds audio that has no backing patch file. Small
//! allocations stay in RAM (a plain owned buffer) until a configurable cap
//! is reached, after which new allocations spill to a shared on-disk file
//! guarded by one coarse mutex — "swap is a fallback, not a hot path"
//! (spec.md §5).

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Mutex, OnceLock};

use crate::config;
use crate::error::{Result, SwapError};

#[derive(Debug, Clone, Copy)]
struct Segment {
    offset: u64,
    size: u64,
}

struct Inner {
    file: Option<File>,
    append_cursor: u64,
    free: Vec<Segment>,
    live_disk: HashMap<u64, Segment>,
    ram_used: u64,
    next_id: u64,
}

impl Inner {
    fn new() -> Self {
        Inner { file: None, append_cursor: 0, free: Vec::new(), live_disk: HashMap::new(), ram_used: 0, next_id: 1 }
    }

    fn file(&mut self) -> std::io::Result<&mut File> {
        if self.file.is_none() {
            let path = config::swap_file_name();
            let prefix = format!("{}-swap_", config::application_name());
            let f = match path {
                Some(p) => tempfile::Builder::new().prefix(&prefix).tempfile_in(
                    p.parent().unwrap_or_else(|| std::path::Path::new(".")),
                )?,
                None => tempfile::Builder::new().prefix(&prefix).tempfile()?,
            };
            // Detach into a plain File; the directory entry is unlinked on
            // most platforms once no further references exist, but on
            // Windows NamedTempFile keeps the handle exclusive, which is
            // acceptable for a process-lifetime scratch file.
            self.file = Some(f.into_file());
        }
        Ok(self.file.as_mut().unwrap())
    }

    /// Smallest free segment that fits `size`, walking the size-descending
    /// ordering from the small end backward (spec.md §3.6).
    fn best_fit(&mut self, size: u64) -> Option<usize> {
        let mut order: Vec<usize> = (0..self.free.len()).collect();
        order.sort_by(|&a, &b| self.free[b].size.cmp(&self.free[a].size));
        order.into_iter().rev().find(|&i| self.free[i].size >= size)
    }

    fn merge_insert(&mut self, mut seg: Segment) {
        let mut i = 0;
        while i < self.free.len() {
            let other = self.free[i];
            if other.offset + other.size == seg.offset {
                seg.offset = other.offset;
                seg.size += other.size;
                self.free.remove(i);
                continue;
            }
            if seg.offset + seg.size == other.offset {
                seg.size += other.size;
                self.free.remove(i);
                continue;
            }
            i += 1;
        }
        self.free.push(seg);
    }

    fn unused_size(&self) -> u64 {
        self.free.iter().map(|s| s.size).sum()
    }
}

/// The global swap allocator.
pub struct SwapAllocator {
    inner: Mutex<Inner>,
}

fn allocator() -> &'static SwapAllocator {
    static INSTANCE: OnceLock<SwapAllocator> = OnceLock::new();
    INSTANCE.get_or_init(|| SwapAllocator { inner: Mutex::new(Inner::new()) })
}

/// RAII handle to a swap allocation. Dropping it returns RAM or disk space
/// to the allocator.
#[derive(Debug)]
pub struct SwapAlloc {
    id: u64,
    size: u64,
    ram: bool,
}

impl SwapAlloc {
    /// Stable identity of this allocation, for store handles that need to
    /// address it without holding the `SwapAlloc` itself.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_ram(&self) -> bool {
        self.ram
    }

    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        read(self.id, offset, buf)
    }

    pub fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        write(self.id, offset, buf)
    }
}

impl Drop for SwapAlloc {
    fn drop(&mut self) {
        if self.ram {
            ram_store().lock().unwrap().remove(&self.id);
            let mut inner = allocator().inner.lock().unwrap();
            inner.ram_used = inner.ram_used.saturating_sub(self.size);
        } else {
            let a = allocator();
            let mut inner = a.inner.lock().unwrap();
            if let Some(seg) = inner.live_disk.remove(&self.id) {
                inner.merge_insert(seg);
            }
        }
    }
}

/// Side table mapping RAM-backed allocation ids to their buffers, kept
/// apart from `Inner` so a `SwapAlloc`'s read/write doesn't need to hold
/// the allocator's own lock for the whole RAM fast path.
fn ram_store() -> &'static Mutex<HashMap<u64, Vec<u8>>> {
    static INSTANCE: OnceLock<Mutex<HashMap<u64, Vec<u8>>>> = OnceLock::new();
    INSTANCE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Allocates `size` bytes, preferring RAM under the configured cap
/// (spec.md §3.6).
pub fn alloc(size: u64) -> Result<SwapAlloc> {
    let a = allocator();
    let mut inner = a.inner.lock().unwrap();
    let ram_max = config::swap_max_memory();

    let id = inner.next_id;
    inner.next_id += 1;

    let fits_ram = ram_max < 0 || inner.ram_used + size <= ram_max as u64;
    if fits_ram {
        inner.ram_used += size;
        drop(inner);
        ram_store().lock().unwrap().insert(id, vec![0u8; size as usize]);
        return Ok(SwapAlloc { id, size, ram: true });
    }

    let offset = if let Some(idx) = inner.best_fit(size) {
        let seg = inner.free.remove(idx);
        if seg.size > size {
            inner.free.push(Segment { offset: seg.offset + size, size: seg.size - size });
        }
        seg.offset
    } else {
        let offset = inner.append_cursor;
        inner.append_cursor += size;
        offset
    };
    inner.live_disk.insert(id, Segment { offset, size });
    Ok(SwapAlloc { id, size, ram: false })
}

/// Total free (unused, reclaimable) bytes in the swap file's allocated
/// region, for tests and diagnostics (spec.md §8 testable property 7).
pub fn unused_size() -> u64 {
    allocator().inner.lock().unwrap().unused_size()
}

pub fn append_cursor() -> u64 {
    allocator().inner.lock().unwrap().append_cursor
}

pub fn ram_used() -> u64 {
    allocator().inner.lock().unwrap().ram_used
}

/// Reads from a live allocation by id, for [`SampleStore`](crate::sample::store::SwapStore)
/// handles that only carry the id, not the owning `SwapAlloc`.
pub fn read(id: u64, offset: u64, buf: &mut [u8]) -> Result<()> {
    if let Some(data) = ram_store().lock().unwrap().get(&id) {
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        return Ok(());
    }
    let a = allocator();
    let mut inner = a.inner.lock().unwrap();
    let seg = *inner.live_disk.get(&id).ok_or(SwapError::NotOpen)?;
    let file = inner.file()?;
    file.seek(SeekFrom::Start(seg.offset + offset))?;
    file.read_exact(buf)?;
    Ok(())
}

pub fn write(id: u64, offset: u64, buf: &[u8]) -> Result<()> {
    if let Some(data) = ram_store().lock().unwrap().get_mut(&id) {
        let start = offset as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        return Ok(());
    }
    let a = allocator();
    let mut inner = a.inner.lock().unwrap();
    let seg = *inner.live_disk.get(&id).ok_or(SwapError::NotOpen)?;
    let file = inner.file()?;
    file.seek(SeekFrom::Start(seg.offset + offset))?;
    file.write_all(buf)?;
    Ok(())
}

/// Rewrites the swap file with no gaps, relocating every live store.
pub fn compact() -> Result<()> {
    let a = allocator();
    let mut inner = a.inner.lock().unwrap();

    let mut ids: Vec<u64> = inner.live_disk.keys().copied().collect();
    ids.sort_by_key(|id| inner.live_disk[id].offset);

    let prefix = format!("{}-swap_", config::application_name());
    let mut new_file = tempfile::Builder::new().prefix(&prefix).tempfile()?.into_file();

    let mut cursor = 0u64;
    let mut relocated = HashMap::new();
    for id in ids {
        let seg = inner.live_disk[&id];
        let mut buf = vec![0u8; seg.size as usize];
        if let Some(old_file) = inner.file.as_mut() {
            old_file.seek(SeekFrom::Start(seg.offset))?;
            old_file.read_exact(&mut buf)?;
        }
        new_file.write_all(&buf)?;
        relocated.insert(id, Segment { offset: cursor, size: seg.size });
        cursor += seg.size;
    }

    inner.file = Some(new_file);
    inner.live_disk = relocated;
    inner.free.clear();
    inner.append_cursor = cursor;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The allocator is a process-wide singleton, so tests that exercise it
    // must not run concurrently with each other.
    fn reset_swap_state() {
        let a = allocator();
        let mut inner = a.inner.lock().unwrap();
        *inner = Inner::new();
        ram_store().lock().unwrap().clear();
    }

    #[test]
    #[serial_test::serial]
    fn ram_then_disk_spill() {
        reset_swap_state();
        config::set_swap_max_memory(1024);

        let s1 = alloc(512).unwrap();
        let s2 = alloc(512).unwrap();
        assert!(s1.is_ram());
        assert!(s2.is_ram());

        let s3 = alloc(512).unwrap();
        let s4 = alloc(512).unwrap();
        assert!(!s3.is_ram());
        assert!(!s4.is_ram());

        drop(s3); // frees disk offset 0
        assert_eq!(unused_size(), 512);

        let s5 = alloc(256).unwrap();
        assert!(!s5.is_ram());
        assert_eq!(unused_size(), 256);

        drop(s1);
        drop(s2);
        drop(s4);
        drop(s5);
        config::set_swap_max_memory(config::DEFAULT_SWAP_MAX_MEMORY);
    }

    #[test]
    #[serial_test::serial]
    fn compact_relocates_to_zero_gaps() {
        reset_swap_state();
        config::set_swap_max_memory(0);

        let a = alloc(100).unwrap();
        let b = alloc(100).unwrap();
        a.write(0, &[1u8; 100]).unwrap();
        b.write(0, &[2u8; 100]).unwrap();
        drop(a);

        compact().unwrap();
        assert_eq!(unused_size(), 0);

        let mut buf = [0u8; 100];
        b.read(0, &mut buf).unwrap();
        assert_eq!(buf, [2u8; 100]);

        drop(b);
        config::set_swap_max_memory(config::DEFAULT_SWAP_MAX_MEMORY);
    }
}
