//! DLS Level 2 reader (spec.md §4.4), grounded on the SF2 reader's manual
//! record-at-a-time parsing style (`sf2::reader`) and the pool-table
//! indirection described in `IpatchDLSReader.c`: regions reference samples
//! through a `ptbl` pool-cue table rather than a direct index, so the fixup
//! runs only after the whole file has been read once.

use std::collections::HashMap;
use std::io::{Read, Seek};

use crate::error::{FormatError, Result};
use crate::file::SharedFileHandle;
use crate::fourcc::{self, FourCC};
use crate::riff::{ChunkKind, RiffReader};
use crate::sample::store::{FileStore, SampleFormat, SwapStore};
use crate::sample::SampleData;
use crate::tree::{Base, ChannelRole, DlsParam, Instrument, InstZone, LocalSampleInfo, Range, Sample, SampleIdx, Version};

use super::fourcc as dlsfourcc;

/// Distinguishes plain DLS-2 from GIG while sharing this module's
/// structural parsing (spec.md §9: identification is extension-driven, not
/// content-sniffed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlsMode {
    Dls,
    Gig,
}

struct PendingZoneRef {
    inst: usize,
    zone: usize,
    pool_index: u32,
}

struct FmtInfo {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

pub fn read(file: SharedFileHandle, mode: DlsMode) -> Result<Base> {
    let cursor = crate::file::SharedCursor(file.clone());
    let mut r = RiffReader::new(cursor);
    read_from(&mut r, &file, mode)
}

pub(crate) fn read_from<S: Read + Seek>(
    r: &mut RiffReader<S>,
    file: &SharedFileHandle,
    mode: DlsMode,
) -> Result<Base> {
    let root = r.start_read()?;
    if root.id != dlsfourcc::DLS_FORM {
        return Err(FormatError::UnknownFormat.into());
    }

    let mut base = Base::new();
    let mut pending: Vec<PendingZoneRef> = Vec::new();
    let mut wave_offsets: Vec<u64> = Vec::new();
    let mut ptbl_cues: Vec<u32> = Vec::new();

    while let Some(chunk) = r.read_chunk()? {
        match (chunk.kind, chunk.id) {
            (ChunkKind::Sub, id) if id == dlsfourcc::VERS => {
                let ms = r.read_u32()?;
                let _ls = r.read_u32()?;
                base.version = Version::new((ms >> 16) as u16, (ms & 0xFFFF) as u16);
            }
            (ChunkKind::Sub, id) if id == dlsfourcc::DLID => {
                base.unique_id = Some(read_dlid(r)?);
            }
            (ChunkKind::Sub, id) if id == dlsfourcc::PTBL => {
                let cb_size = r.read_u32()?;
                let n_cues = r.read_u32()?;
                if cb_size > dlsfourcc::PTBL_HEADER_SIZE as u32 {
                    r.read_bytes((cb_size - dlsfourcc::PTBL_HEADER_SIZE as u32) as usize)?;
                }
                ptbl_cues = (0..n_cues).map(|_| r.read_u32()).collect::<Result<Vec<_>>>()?;
            }
            (ChunkKind::List, id) if id == fourcc::riff::INFO => {
                read_info(r, &mut base)?;
            }
            (ChunkKind::List, id) if id == dlsfourcc::LINS => {
                read_instrument_list(r, &mut base, &mut pending, mode)?;
            }
            (ChunkKind::List, id) if id == dlsfourcc::WVPL => {
                let wvpl_data_start = chunk.start_offset;
                read_wave_pool(r, &mut base, &mut wave_offsets, wvpl_data_start, file)?;
            }
            _ => {
                check_gig_only(mode, chunk.id)?;
                let raw = r.read_bytes(chunk.payload_size() as usize)?;
                base.opaque_chunks.push((chunk.id, raw));
            }
        }
        r.end_chunk()?;
    }
    r.end_chunk()?; // root

    resolve_pool_refs(&mut base, &pending, &ptbl_cues, &wave_offsets);
    if mode == DlsMode::Gig {
        resolve_gig_sub_regions(&mut base, &ptbl_cues, &wave_offsets);
    }
    Ok(base)
}

/// Decodes each zone's `3lnk` sub-region sample table (spec.md §4.4) and
/// resolves its pool indices to `Base::samples` entries the same way
/// [`resolve_pool_refs`] resolves a region's own `wlnk` pool index, so
/// downstream voice resolution can see every GIG round-robin/velocity-layer
/// sub-region instead of only the region's default sample.
fn resolve_gig_sub_regions(base: &mut Base, ptbl: &[u32], wave_offsets: &[u64]) {
    let mut by_offset: HashMap<u64, SampleIdx> = HashMap::new();
    for (idx, &offset) in wave_offsets.iter().enumerate() {
        by_offset.insert(offset, idx);
    }

    for inst in &mut base.instruments {
        for zone in &mut inst.zones {
            let Some((_, raw)) = zone.opaque_chunks.iter().find(|(id, _)| *id == crate::gig::fourcc::THREE_LNK) else {
                continue;
            };
            let pool_indices = crate::gig::reader::decode_3lnk_sample_table(raw);
            let mut resolved = Vec::with_capacity(pool_indices.len());
            for pool_index in pool_indices {
                let Some(&offset) = ptbl.get(pool_index as usize) else {
                    log::warn!("3lnk pool index {} out of range of ptbl ({} cues)", pool_index, ptbl.len());
                    continue;
                };
                match by_offset.get(&(offset as u64)) {
                    Some(&sample_idx) => resolved.push(sample_idx),
                    None => log::warn!("3lnk pool offset {} does not match any wave chunk", offset),
                }
            }
            zone.sub_region_samples = resolved;
        }
    }
}

fn check_gig_only(mode: DlsMode, id: FourCC) -> Result<()> {
    if mode == DlsMode::Dls && crate::gig::fourcc::is_gig_only(id) {
        return Err(FormatError::GigDetected.into());
    }
    Ok(())
}

fn read_dlid<S: Read + Seek>(r: &mut RiffReader<S>) -> Result<[u8; 16]> {
    let bytes = r.read_bytes(16)?;
    let mut arr = [0u8; 16];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Generic `INFO` sub-chunk reader shared by the file, instrument, and wave
/// levels (each has its own `LIST INFO`, spec.md §6.1).
fn read_info<S: Read + Seek>(r: &mut RiffReader<S>, base: &mut Base) -> Result<()> {
    while let Some(chunk) = r.read_chunk()? {
        let len = chunk.payload_size() as usize;
        let s = r.read_fixed_string(len)?;
        base.info.insert(chunk.id, s);
        r.end_chunk()?;
    }
    Ok(())
}

fn read_name_from_info<S: Read + Seek>(r: &mut RiffReader<S>) -> Result<String> {
    let mut dummy = Base::new();
    read_info(r, &mut dummy)?;
    Ok(dummy.info.get(&fourcc::info::INAM).cloned().unwrap_or_default())
}

fn read_instrument_list<S: Read + Seek>(
    r: &mut RiffReader<S>,
    base: &mut Base,
    pending: &mut Vec<PendingZoneRef>,
    mode: DlsMode,
) -> Result<()> {
    while let Some(chunk) = r.read_chunk()? {
        if chunk.kind == ChunkKind::List && chunk.id == dlsfourcc::INS {
            read_instrument(r, base, pending, mode)?;
        } else {
            check_gig_only(mode, chunk.id)?;
            r.read_bytes(chunk.payload_size() as usize)?;
        }
        r.end_chunk()?;
    }
    Ok(())
}

fn read_instrument<S: Read + Seek>(
    r: &mut RiffReader<S>,
    base: &mut Base,
    pending: &mut Vec<PendingZoneRef>,
    mode: DlsMode,
) -> Result<()> {
    let mut name = String::new();
    let mut bank_raw = 0u32;
    let mut program = 0u8;
    let mut zones: Vec<InstZone> = Vec::new();
    let mut zone_pool: Vec<u32> = Vec::new();
    let mut global_params: Vec<DlsParam> = Vec::new();
    let mut opaque: Vec<(FourCC, Vec<u8>)> = Vec::new();
    let mut unique_id = None;

    while let Some(chunk) = r.read_chunk()? {
        match (chunk.kind, chunk.id) {
            (ChunkKind::Sub, id) if id == dlsfourcc::INSH => {
                let _region_count = r.read_u32()?;
                bank_raw = r.read_u32()?;
                program = r.read_u32()? as u8;
            }
            (ChunkKind::Sub, id) if id == dlsfourcc::DLID => {
                unique_id = Some(read_dlid(r)?);
            }
            (ChunkKind::List, id) if id == fourcc::riff::INFO => {
                name = read_name_from_info(r)?;
            }
            (ChunkKind::List, id) if id == dlsfourcc::LRGN => {
                read_region_list(r, &mut zones, &mut zone_pool, mode)?;
            }
            (ChunkKind::List, id) if id == dlsfourcc::LART || id == dlsfourcc::LAR2 => {
                let (params, extra) = read_articulator_list(r)?;
                global_params = params;
                opaque.extend(extra);
            }
            _ => {
                check_gig_only(mode, chunk.id)?;
                let raw = r.read_bytes(chunk.payload_size() as usize)?;
                opaque.push((chunk.id, raw));
            }
        }
        r.end_chunk()?;
    }

    let percussion = bank_raw & dlsfourcc::PERCUSSION_BIT != 0;
    let bank = (bank_raw & dlsfourcc::BANK_MASK) as u16;

    let inst_idx = base.instruments.len();
    for (zone_idx, pool_idx) in zone_pool.iter().enumerate() {
        pending.push(PendingZoneRef { inst: inst_idx, zone: zone_idx, pool_index: *pool_idx });
    }

    base.instruments.push(Instrument {
        name,
        bank,
        program,
        percussion,
        zones,
        global_generators: crate::tree::generator::GenArray::new(),
        global_modulators: crate::tree::modulator::ModulatorList::new(),
        global_params,
        unique_id,
        opaque_chunks: opaque,
    });
    Ok(())
}

fn read_region_list<S: Read + Seek>(
    r: &mut RiffReader<S>,
    zones: &mut Vec<InstZone>,
    zone_pool: &mut Vec<u32>,
    mode: DlsMode,
) -> Result<()> {
    while let Some(chunk) = r.read_chunk()? {
        if chunk.kind == ChunkKind::List && (chunk.id == dlsfourcc::RGN || chunk.id == dlsfourcc::RGN2) {
            let (zone, pool_index) = read_region(r, mode)?;
            zones.push(zone);
            zone_pool.push(pool_index);
        } else {
            check_gig_only(mode, chunk.id)?;
            r.read_bytes(chunk.payload_size() as usize)?;
        }
        r.end_chunk()?;
    }
    Ok(())
}

fn read_region<S: Read + Seek>(r: &mut RiffReader<S>, mode: DlsMode) -> Result<(InstZone, u32)> {
    let mut zone = InstZone::default();
    let mut pool_index = 0u32;
    let mut local = LocalSampleInfo::default();
    let mut has_local = false;

    while let Some(chunk) = r.read_chunk()? {
        match (chunk.kind, chunk.id) {
            (ChunkKind::Sub, id) if id == dlsfourcc::RGNH => {
                let low_key = r.read_u16()?;
                let high_key = r.read_u16()?;
                let low_vel = r.read_u16()?;
                let high_vel = r.read_u16()?;
                let _options = r.read_u16()?;
                let key_group = r.read_u16()?;
                zone.note_range = Range::new(low_key as u8, high_key as u8);
                zone.velocity_range = Range::new(low_vel as u8, high_vel as u8);
                zone.key_group = key_group as u8;
                if chunk.payload_size() as usize >= dlsfourcc::RGNH_LAYER_SIZE {
                    zone.layer_group = r.read_u16()? as u8;
                }
            }
            (ChunkKind::Sub, id) if id == dlsfourcc::WLNK => {
                let _options = r.read_u16()?;
                zone.phase_group = r.read_u16()?;
                let channel = r.read_u32()?;
                pool_index = r.read_u32()?;
                zone.channel = channel as u8;
            }
            (ChunkKind::Sub, id) if id == dlsfourcc::WSMP => {
                let (root, fine, loop_info) = read_wsmp(r)?;
                local.root_note = Some(root);
                local.fine_tune = Some(fine);
                if let Some((start, end)) = loop_info {
                    local.loop_start = Some(start);
                    local.loop_end = Some(end);
                }
                has_local = true;
            }
            (ChunkKind::List, id) if id == dlsfourcc::LART || id == dlsfourcc::LAR2 => {
                let (params, extra) = read_articulator_list(r)?;
                zone.params = params;
                zone.opaque_chunks.extend(extra);
            }
            _ => {
                check_gig_only(mode, chunk.id)?;
                let raw = r.read_bytes(chunk.payload_size() as usize)?;
                zone.opaque_chunks.push((chunk.id, raw));
            }
        }
        r.end_chunk()?;
    }

    if has_local {
        zone.local_sample_info = Some(local);
    }
    Ok((zone, pool_index))
}

/// Parses one `wsmp` record, returning `(root_note, fine_tune, loop)`.
fn read_wsmp<S: Read + Seek>(r: &mut RiffReader<S>) -> Result<(u8, i16, Option<(u32, u32)>)> {
    let _cb_size = r.read_u32()?;
    let unity_note = r.read_u16()?;
    let fine_tune = r.read_i16()?;
    let _gain = r.read_i32()?;
    let _options = r.read_u32()?;
    let loop_count = r.read_u32()?;
    let mut loop_info = None;
    if loop_count > 0 {
        let _loop_cb_size = r.read_u32()?;
        let loop_type = r.read_u32()?;
        let loop_start = r.read_u32()?;
        let loop_length = r.read_u32()?;
        if loop_type == dlsfourcc::loop_type::FORWARD || loop_type == dlsfourcc::loop_type::RELEASE {
            loop_info = Some((loop_start, loop_start + loop_length));
        }
    }
    Ok((unity_note as u8, fine_tune, loop_info))
}

/// Reads every `art1`/`art2` connection-block chunk in a `lart`/`lar2`
/// list, collapsing each connection to `(destination, scale)` (spec.md
/// §3.3 `InstZone::params[]`); this drops the source/control/transform
/// fields of non-default connections, a documented simplification (see
/// DESIGN.md) rather than a full articulator graph. Any other chunk found
/// in the list is preserved verbatim in the second return value.
fn read_articulator_list<S: Read + Seek>(r: &mut RiffReader<S>) -> Result<(Vec<DlsParam>, Vec<(FourCC, Vec<u8>)>)> {
    let mut params = Vec::new();
    let mut extra = Vec::new();
    while let Some(chunk) = r.read_chunk()? {
        if chunk.kind == ChunkKind::Sub && (chunk.id == dlsfourcc::ART1 || chunk.id == dlsfourcc::ART2) {
            let cb_size = r.read_u32()?;
            let n_conn = r.read_u32()?;
            if cb_size > dlsfourcc::ART_HEADER_SIZE as u32 {
                r.read_bytes((cb_size - dlsfourcc::ART_HEADER_SIZE as u32) as usize)?;
            }
            for _ in 0..n_conn {
                let _source = r.read_u16()?;
                let _control = r.read_u16()?;
                let destination = r.read_u16()?;
                let _transform = r.read_u16()?;
                let scale = r.read_i32()?;
                params.push(DlsParam { articulation: destination, value: (scale >> 16) as i16 });
            }
        } else {
            let raw = r.read_bytes(chunk.payload_size() as usize)?;
            extra.push((chunk.id, raw));
        }
        r.end_chunk()?;
    }
    Ok((params, extra))
}

fn read_wave_pool<S: Read + Seek>(
    r: &mut RiffReader<S>,
    base: &mut Base,
    wave_offsets: &mut Vec<u64>,
    wvpl_data_start: u64,
    file: &SharedFileHandle,
) -> Result<()> {
    while let Some(chunk) = r.read_chunk()? {
        if chunk.kind == ChunkKind::List && chunk.id == dlsfourcc::WAVE {
            // Pool-cue offsets address the chunk's own "LIST"+size+"wave"
            // header, not its data (spec.md §4.4, §6.1 `ptbl`).
            let header_start = chunk.start_offset - 12;
            let offset_in_pool = header_start - wvpl_data_start;
            let sample = read_wave(r, file)?;
            wave_offsets.push(offset_in_pool);
            base.samples.push(sample);
        } else {
            r.read_bytes(chunk.payload_size() as usize)?;
        }
        r.end_chunk()?;
    }
    Ok(())
}

fn read_wave<S: Read + Seek>(r: &mut RiffReader<S>, file: &SharedFileHandle) -> Result<Sample> {
    let mut fmt: Option<FmtInfo> = None;
    let mut data_offset = None;
    let mut data_len = 0u32;
    let mut root_note = 60u8;
    let mut fine_tune = 0i16;
    let mut loop_start = 0u32;
    let mut loop_end = 0u32;
    let mut name = String::new();
    let mut opaque = Vec::new();
    let mut unique_id = None;

    while let Some(chunk) = r.read_chunk()? {
        match (chunk.kind, chunk.id) {
            (ChunkKind::Sub, id) if id == dlsfourcc::FMT => {
                let format_tag = r.read_u16()?;
                let channels = r.read_u16()?;
                let sample_rate = r.read_u32()?;
                let _avg_bytes_per_sec = r.read_u32()?;
                let _block_align = r.read_u16()?;
                let bits_per_sample = r.read_u16()?;
                if format_tag != 1 {
                    log::warn!("wave fmt tag {} is not PCM, reading as 16-bit PCM anyway", format_tag);
                }
                fmt = Some(FmtInfo { channels, sample_rate, bits_per_sample });
            }
            (ChunkKind::Sub, id) if id == dlsfourcc::DATA => {
                data_offset = Some(chunk.start_offset);
                data_len = chunk.payload_size();
            }
            (ChunkKind::Sub, id) if id == dlsfourcc::WSMP => {
                let (root, fine, loop_info) = read_wsmp(r)?;
                root_note = root;
                fine_tune = fine;
                if let Some((s, e)) = loop_info {
                    loop_start = s;
                    loop_end = e;
                }
            }
            (ChunkKind::Sub, id) if id == dlsfourcc::DLID => {
                unique_id = Some(read_dlid(r)?);
            }
            (ChunkKind::List, id) if id == fourcc::riff::INFO => {
                name = read_name_from_info(r)?;
            }
            _ => {
                let raw = r.read_bytes(chunk.payload_size() as usize)?;
                opaque.push((chunk.id, raw));
            }
        }
        r.end_chunk()?;
    }

    let fmt = fmt.ok_or_else(|| FormatError::InvalidSample { name: name.clone(), reason: "missing fmt chunk".into() })?;
    let data_offset = data_offset
        .ok_or_else(|| FormatError::InvalidSample { name: name.clone(), reason: "missing data chunk".into() })?;

    let bytes_per_sample = (fmt.bits_per_sample as u32 / 8).max(1);
    let channels = fmt.channels.max(1) as u32;
    let frame_count = data_len / (bytes_per_sample * channels);

    let data = build_sample_data(file, data_offset, data_len, &fmt, frame_count)?;

    Ok(Sample {
        name,
        rate: fmt.sample_rate,
        root_note,
        fine_tune,
        loop_start,
        loop_end,
        channel_role: ChannelRole::Mono,
        linked: None,
        data: std::sync::Arc::new(data),
        unique_id,
        opaque_chunks: opaque,
    })
}

/// Builds a store over a wave's raw PCM (spec.md §6.1 "8 (unsigned) and 16
/// (signed LE)" bit widths, mono only). 16-bit mono points directly at the
/// file like the SF2 reader's `FileStore`; 8-bit is widened to 16-bit
/// signed at read time since [`SampleFormat`] has no 8-bit variant, and
/// copied into a swap allocation since the bytes no longer match the file's
/// own layout. Multi-channel wave data is out of scope (see DESIGN.md).
fn build_sample_data(
    file: &SharedFileHandle,
    data_offset: u64,
    data_len: u32,
    fmt: &FmtInfo,
    frame_count: u32,
) -> Result<SampleData> {
    if fmt.channels != 1 {
        return Err(FormatError::InvalidSample {
            name: "wave".into(),
            reason: format!("unsupported channel count {}", fmt.channels),
        }
        .into());
    }

    match fmt.bits_per_sample {
        16 => Ok(SampleData::new(Box::new(FileStore {
            file: file.clone(),
            byte_offset: data_offset,
            format: SampleFormat::Pcm16,
            frame_count,
            sample_rate: fmt.sample_rate,
        }))),
        8 => {
            let mut raw = vec![0u8; data_len as usize];
            {
                let mut guard = file.lock().unwrap();
                guard.seek(std::io::SeekFrom::Start(data_offset))?;
                guard.read_exact(&mut raw)?;
            }
            let store = SwapStore::new(SampleFormat::Pcm16, frame_count, fmt.sample_rate)?;
            let mut out = vec![0u8; frame_count as usize * 2];
            for i in 0..frame_count as usize {
                let widened: i16 = ((raw[i] as i16) - 128) << 8;
                out[i * 2..i * 2 + 2].copy_from_slice(&widened.to_le_bytes());
            }
            store.alloc.write(0, &out)?;
            Ok(SampleData::new(Box::new(store)))
        }
        other => Err(FormatError::InvalidSample {
            name: "wave".into(),
            reason: format!("unsupported bit depth {}", other),
        }
        .into()),
    }
}

/// Resolves every pending zone's pool index to a sample, by hashing the
/// `ptbl` cue's byte offset against each wave's recorded offset (spec.md
/// §4.4 "Pool table... resolves region references... via a post-read
/// hash-and-fixup pass").
fn resolve_pool_refs(base: &mut Base, pending: &[PendingZoneRef], ptbl: &[u32], wave_offsets: &[u64]) {
    let mut by_offset: HashMap<u64, SampleIdx> = HashMap::new();
    for (idx, &offset) in wave_offsets.iter().enumerate() {
        by_offset.insert(offset, idx);
    }

    for p in pending {
        let offset = match ptbl.get(p.pool_index as usize) {
            Some(&o) => o as u64,
            None => {
                log::warn!("pool index {} out of range of ptbl ({} cues)", p.pool_index, ptbl.len());
                continue;
            }
        };
        match by_offset.get(&offset) {
            Some(&sample_idx) => {
                base.instruments[p.inst].zones[p.zone].sample_ref = Some(sample_idx);
            }
            None => {
                log::warn!("pool offset {} does not match any wave chunk", offset);
            }
        }
    }
}
