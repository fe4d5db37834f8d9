//! `SampleStore` variants (spec.md §3.5), grounded on
//! `IpatchSampleStoreFile.c`, `IpatchSampleStoreRom.c`,
//! `IpatchSampleStoreSplit24.c` and `IpatchSampleStoreSwap.c`.

use std::fmt;

use crate::error::{ProgrammerError, Result};
use crate::file::SharedFileHandle;

use super::swap::SwapAlloc;

/// PCM encoding of a store's frames. Every format here is signed and
/// little-endian; a "frame" is one mono sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Pcm16,
    Pcm24,
}

impl SampleFormat {
    pub fn bytes_per_frame(self) -> usize {
        match self {
            SampleFormat::Pcm16 => 2,
            SampleFormat::Pcm24 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// A handle returned by [`SampleStore::open`]; frame offsets/counts are in
/// whole frames, not bytes.
pub trait StoreHandle: fmt::Debug {
    fn read(&mut self, frame_offset: u32, frame_count: u32, buf: &mut [u8]) -> Result<()>;

    fn write(&mut self, _frame_offset: u32, _frame_count: u32, _buf: &[u8]) -> Result<()> {
        Err(ProgrammerError::InvalidChildType { parent: "SampleStore", child: "write" }.into())
    }
}

/// Common immutable attributes of every store variant (spec.md §3.5).
pub trait SampleStore: fmt::Debug + Send + Sync {
    fn sample_format(&self) -> SampleFormat;
    fn sample_size_in_frames(&self) -> u32;
    fn sample_rate(&self) -> u32;

    /// Whether this variant can ever be opened (false only for `RomStore`).
    fn can_open(&self) -> bool {
        true
    }

    fn open(&self, mode: OpenMode) -> Result<Box<dyn StoreHandle>>;
}

/// Bytes live at `(file, byte_offset)` in a read-only backing file
/// (`IpatchSampleStoreFile`).
#[derive(Clone)]
pub struct FileStore {
    pub file: SharedFileHandle,
    pub byte_offset: u64,
    pub format: SampleFormat,
    pub frame_count: u32,
    pub sample_rate: u32,
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("byte_offset", &self.byte_offset)
            .field("format", &self.format)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

impl SampleStore for FileStore {
    fn sample_format(&self) -> SampleFormat {
        self.format
    }
    fn sample_size_in_frames(&self) -> u32 {
        self.frame_count
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&self, mode: OpenMode) -> Result<Box<dyn StoreHandle>> {
        if mode == OpenMode::Write {
            return Err(ProgrammerError::InvalidChildType { parent: "FileStore", child: "write" }.into());
        }
        Ok(Box::new(FileStoreHandle { store: self.clone() }))
    }
}

#[derive(Debug)]
struct FileStoreHandle {
    store: FileStore,
}

impl StoreHandle for FileStoreHandle {
    fn read(&mut self, frame_offset: u32, frame_count: u32, buf: &mut [u8]) -> Result<()> {
        let bpf = self.store.format.bytes_per_frame();
        let want = frame_count as usize * bpf;
        if buf.len() < want {
            return Err(ProgrammerError::InvalidChildType { parent: "FileStore", child: "short buffer" }.into());
        }
        let mut guard = self.store.file.lock().unwrap();
        let start = self.store.byte_offset + frame_offset as u64 * bpf as u64;
        guard.seek(std::io::SeekFrom::Start(start))?;
        guard.read_exact(&mut buf[..want])?;
        Ok(())
    }
}

/// A placeholder recording a ROM location; can never be opened
/// (`IpatchSampleStoreRom`: `IPATCH_ERROR_PROGRAM`, "ROM sample data is not accessible").
#[derive(Debug, Clone, Copy)]
pub struct RomStore {
    pub rom_offset: u32,
    pub format: SampleFormat,
    pub frame_count: u32,
    pub sample_rate: u32,
}

impl SampleStore for RomStore {
    fn sample_format(&self) -> SampleFormat {
        self.format
    }
    fn sample_size_in_frames(&self) -> u32 {
        self.frame_count
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn can_open(&self) -> bool {
        false
    }

    fn open(&self, _mode: OpenMode) -> Result<Box<dyn StoreHandle>> {
        Err(ProgrammerError::InvalidChildType { parent: "RomStore", child: "open" }.into())
    }
}

/// SF2 2.04 24-bit encoding: the 16 MSBs live in `smpl`, the LS byte of
/// each frame lives in `sm24` (`IpatchSampleStoreSplit24`).
#[derive(Clone)]
pub struct Split24Store {
    pub msb_file: SharedFileHandle,
    pub msb_offset: u64,
    pub lsb_file: SharedFileHandle,
    pub lsb_offset: u64,
    pub frame_count: u32,
    pub sample_rate: u32,
}

impl fmt::Debug for Split24Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Split24Store")
            .field("msb_offset", &self.msb_offset)
            .field("lsb_offset", &self.lsb_offset)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

impl SampleStore for Split24Store {
    fn sample_format(&self) -> SampleFormat {
        SampleFormat::Pcm24
    }
    fn sample_size_in_frames(&self) -> u32 {
        self.frame_count
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&self, mode: OpenMode) -> Result<Box<dyn StoreHandle>> {
        if mode == OpenMode::Write {
            return Err(ProgrammerError::InvalidChildType { parent: "Split24Store", child: "write" }.into());
        }
        Ok(Box::new(Split24StoreHandle { store: self.clone() }))
    }
}

#[derive(Debug)]
struct Split24StoreHandle {
    store: Split24Store,
}

impl StoreHandle for Split24StoreHandle {
    fn read(&mut self, frame_offset: u32, frame_count: u32, buf: &mut [u8]) -> Result<()> {
        let want = frame_count as usize * 3;
        if buf.len() < want {
            return Err(ProgrammerError::InvalidChildType { parent: "Split24Store", child: "short buffer" }.into());
        }

        let mut msb = vec![0u8; frame_count as usize * 2];
        {
            let mut guard = self.store.msb_file.lock().unwrap();
            guard.seek(std::io::SeekFrom::Start(self.store.msb_offset + frame_offset as u64 * 2))?;
            guard.read_exact(&mut msb)?;
        }
        let mut lsb = vec![0u8; frame_count as usize];
        {
            let mut guard = self.store.lsb_file.lock().unwrap();
            guard.seek(std::io::SeekFrom::Start(self.store.lsb_offset + frame_offset as u64))?;
            guard.read_exact(&mut lsb)?;
        }

        for i in 0..frame_count as usize {
            buf[i * 3] = lsb[i];
            buf[i * 3 + 1] = msb[i * 2];
            buf[i * 3 + 2] = msb[i * 2 + 1];
        }
        Ok(())
    }
}

/// Memory-backed if under the configured RAM cap, otherwise a region of
/// the process-wide swap file (`IpatchSampleStoreSwap`).
#[derive(Debug)]
pub struct SwapStore {
    pub alloc: SwapAlloc,
    pub format: SampleFormat,
    pub frame_count: u32,
    pub sample_rate: u32,
}

impl SwapStore {
    /// Allocates swap space for `frame_count` frames of `format` and
    /// returns an empty (zero-filled) store.
    pub fn new(format: SampleFormat, frame_count: u32, sample_rate: u32) -> Result<Self> {
        let size = frame_count as u64 * format.bytes_per_frame() as u64;
        let alloc = super::swap::alloc(size)?;
        Ok(SwapStore { alloc, format, frame_count, sample_rate })
    }
}

impl SampleStore for SwapStore {
    fn sample_format(&self) -> SampleFormat {
        self.format
    }
    fn sample_size_in_frames(&self) -> u32 {
        self.frame_count
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&self, _mode: OpenMode) -> Result<Box<dyn StoreHandle>> {
        Ok(Box::new(SwapStoreHandle {
            alloc_id: self.alloc.id(),
            bpf: self.format.bytes_per_frame(),
        }))
    }
}

#[derive(Debug)]
struct SwapStoreHandle {
    alloc_id: u64,
    bpf: usize,
}

impl StoreHandle for SwapStoreHandle {
    fn read(&mut self, frame_offset: u32, frame_count: u32, buf: &mut [u8]) -> Result<()> {
        let want = frame_count as usize * self.bpf;
        super::swap::read(self.alloc_id, frame_offset as u64 * self.bpf as u64, &mut buf[..want])
    }

    fn write(&mut self, frame_offset: u32, frame_count: u32, buf: &[u8]) -> Result<()> {
        let want = frame_count as usize * self.bpf;
        super::swap::write(self.alloc_id, frame_offset as u64 * self.bpf as u64, &buf[..want])
    }
}
