//! DLS Level 2 writer (spec.md §4.4): the inverse of [`super::reader`].
//!
//! Pool-cue offsets are relative to the wave pool's own data, independent
//! of where `wvpl` ends up in the file, so the wave pool is serialized into
//! a scratch buffer first to learn each sample's offset before the `ptbl`
//! chunk (which must precede `lins` in the file) is written.

use std::collections::HashMap;
use std::io::{Cursor, Write, Seek};

use crate::error::Result;
use crate::fourcc;
use crate::riff::RiffWriter;
use crate::sample::store::{SampleFormat, StoreHandle};
use crate::tree::{Base, DlsParam, Instrument, InstZone, LocalSampleInfo, Sample, SampleIdx};

use super::fourcc as dlsfourcc;

pub fn write<W: Write + Seek>(base: &Base, out: W) -> Result<()> {
    let (wave_bytes, sample_offsets) = build_wave_pool(base)?;

    let mut pool_index_of: HashMap<SampleIdx, u32> = HashMap::new();
    let mut ptbl_cues: Vec<u32> = Vec::new();
    for inst in &base.instruments {
        for zone in inst.sounding_zones() {
            if let Some(sample_idx) = zone.sample_ref {
                if !pool_index_of.contains_key(&sample_idx) {
                    pool_index_of.insert(sample_idx, ptbl_cues.len() as u32);
                    ptbl_cues.push(sample_offsets[sample_idx] as u32);
                }
            }
        }
    }

    let mut w = RiffWriter::new(out);
    w.start_write(dlsfourcc::DLS_FORM)?;

    w.begin_sub(dlsfourcc::VERS)?;
    w.write_u32(((base.version.major as u32) << 16) | base.version.minor as u32)?;
    w.write_u32(0)?;
    w.end_chunk()?;

    w.begin_list(fourcc::riff::INFO)?;
    write_info(&mut w, base)?;
    w.end_chunk()?;

    if let Some(unique_id) = base.unique_id {
        w.begin_sub(dlsfourcc::DLID)?;
        w.write_bytes(&unique_id)?;
        w.end_chunk()?;
    }

    w.begin_sub(dlsfourcc::PTBL)?;
    w.write_u32(dlsfourcc::PTBL_HEADER_SIZE as u32)?;
    w.write_u32(ptbl_cues.len() as u32)?;
    for cue in &ptbl_cues {
        w.write_u32(*cue)?;
    }
    w.end_chunk()?;

    w.begin_list(dlsfourcc::LINS)?;
    for inst in &base.instruments {
        write_instrument(&mut w, inst, &pool_index_of)?;
    }
    w.end_chunk()?;

    w.begin_list(dlsfourcc::WVPL)?;
    w.write_bytes(&wave_bytes)?;
    w.end_chunk()?;

    for (id, raw) in &base.opaque_chunks {
        w.begin_sub(*id)?;
        w.write_bytes(raw)?;
        w.end_chunk()?;
    }

    w.end_chunk()?; // DLS root
    Ok(())
}

/// Emits INFO chunks in canonical order (spec.md §4.3.2 step 3, shared with
/// SF2's writer): `INAM` first, then the standard RIFF INFO ids in their
/// conventional order, with any unrecognized ids trailing in FourCC byte
/// order so emission never depends on `base.info`'s (unordered) storage.
fn write_info<W: Write + Seek>(w: &mut RiffWriter<W>, base: &Base) -> Result<()> {
    const ORDER: &[fourcc::FourCC] = &[
        fourcc::info::INAM,
        fourcc::info::ICRD,
        fourcc::info::IENG,
        fourcc::info::IPRD,
        fourcc::info::ICOP,
        fourcc::info::ICMT,
        fourcc::info::ISFT,
    ];
    for &id in ORDER {
        if let Some(text) = base.info.get(&id) {
            write_info_chunk(w, id, text)?;
        }
    }
    let mut leftover: Vec<(fourcc::FourCC, &String)> =
        base.info.iter().filter(|(id, _)| !ORDER.contains(id)).map(|(&id, text)| (id, text)).collect();
    leftover.sort_by_key(|(id, _)| *id);
    for (id, text) in leftover {
        write_info_chunk(w, id, text)?;
    }
    Ok(())
}

fn write_info_chunk<W: Write + Seek>(w: &mut RiffWriter<W>, id: fourcc::FourCC, text: &str) -> Result<()> {
    w.begin_sub(id)?;
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    w.write_bytes(&bytes)?;
    w.end_chunk()?;
    Ok(())
}

fn write_name<W: Write + Seek>(w: &mut RiffWriter<W>, name: &str) -> Result<()> {
    if name.is_empty() {
        return Ok(());
    }
    w.begin_list(fourcc::riff::INFO)?;
    w.begin_sub(fourcc::info::INAM)?;
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);
    w.write_bytes(&bytes)?;
    w.end_chunk()?;
    w.end_chunk()?;
    Ok(())
}

fn write_instrument<W: Write + Seek>(
    w: &mut RiffWriter<W>,
    inst: &Instrument,
    pool_index_of: &HashMap<SampleIdx, u32>,
) -> Result<()> {
    w.begin_list(dlsfourcc::INS)?;

    w.begin_sub(dlsfourcc::INSH)?;
    w.write_u32(inst.sounding_zones().count() as u32)?;
    let bank_raw = (inst.bank as u32 & dlsfourcc::BANK_MASK) | if inst.percussion { dlsfourcc::PERCUSSION_BIT } else { 0 };
    w.write_u32(bank_raw)?;
    w.write_u32(inst.program as u32)?;
    w.end_chunk()?;

    write_name(w, &inst.name)?;

    if let Some(unique_id) = inst.unique_id {
        w.begin_sub(dlsfourcc::DLID)?;
        w.write_bytes(&unique_id)?;
        w.end_chunk()?;
    }

    w.begin_list(dlsfourcc::LRGN)?;
    for zone in inst.sounding_zones() {
        write_region(w, zone, pool_index_of)?;
    }
    w.end_chunk()?;

    if !inst.global_params.is_empty() {
        w.begin_list(dlsfourcc::LART)?;
        write_articulator(w, &inst.global_params)?;
        w.end_chunk()?;
    }

    for (id, raw) in &inst.opaque_chunks {
        w.begin_sub(*id)?;
        w.write_bytes(raw)?;
        w.end_chunk()?;
    }

    w.end_chunk()?; // ins
    Ok(())
}

fn write_region<W: Write + Seek>(
    w: &mut RiffWriter<W>,
    zone: &InstZone,
    pool_index_of: &HashMap<SampleIdx, u32>,
) -> Result<()> {
    w.begin_list(dlsfourcc::RGN)?;

    w.begin_sub(dlsfourcc::RGNH)?;
    w.write_u16(zone.note_range.low as u16)?;
    w.write_u16(zone.note_range.high as u16)?;
    w.write_u16(zone.velocity_range.low as u16)?;
    w.write_u16(zone.velocity_range.high as u16)?;
    w.write_u16(0)?; // fusOptions
    w.write_u16(zone.key_group as u16)?;
    w.end_chunk()?;

    w.begin_sub(dlsfourcc::WLNK)?;
    w.write_u16(0)?; // fusOptions
    w.write_u16(zone.phase_group)?;
    w.write_u32(zone.channel as u32)?;
    let pool_index = zone.sample_ref.and_then(|idx| pool_index_of.get(&idx)).copied().unwrap_or(0);
    w.write_u32(pool_index)?;
    w.end_chunk()?;

    if let Some(local) = &zone.local_sample_info {
        w.begin_sub(dlsfourcc::WSMP)?;
        write_wsmp_fields(w, local.root_note.unwrap_or(60), local.fine_tune.unwrap_or(0), local.loop_start, local.loop_end)?;
        w.end_chunk()?;
    }

    if !zone.params.is_empty() {
        w.begin_list(dlsfourcc::LART)?;
        write_articulator(w, &zone.params)?;
        w.end_chunk()?;
    }

    for (id, raw) in &zone.opaque_chunks {
        w.begin_sub(*id)?;
        w.write_bytes(raw)?;
        w.end_chunk()?;
    }

    w.end_chunk()?; // rgn
    Ok(())
}

fn write_articulator<W: Write + Seek>(w: &mut RiffWriter<W>, params: &[DlsParam]) -> Result<()> {
    w.begin_sub(dlsfourcc::ART1)?;
    w.write_u32(dlsfourcc::ART_HEADER_SIZE as u32)?;
    w.write_u32(params.len() as u32)?;
    for p in params {
        w.write_u16(0)?; // source: CONN_SRC_NONE
        w.write_u16(0)?; // control: CONN_SRC_NONE
        w.write_u16(p.articulation)?;
        w.write_u16(0)?; // transform: CONN_TRN_NONE
        w.write_i32((p.value as i32) << 16)?;
    }
    w.end_chunk()?;
    Ok(())
}

fn write_wsmp_fields<W: Write + Seek>(
    w: &mut RiffWriter<W>,
    root_note: u8,
    fine_tune: i16,
    loop_start: Option<u32>,
    loop_end: Option<u32>,
) -> Result<()> {
    w.write_u32(dlsfourcc::WSMP_HEADER_SIZE as u32)?;
    w.write_u16(root_note as u16)?;
    w.write_i16(fine_tune)?;
    w.write_i32(0)?; // gain
    w.write_u32(0)?; // fulOptions
    let has_loop = matches!((loop_start, loop_end), (Some(s), Some(e)) if e > s);
    w.write_u32(if has_loop { 1 } else { 0 })?;
    if has_loop {
        let start = loop_start.unwrap();
        let end = loop_end.unwrap();
        w.write_u32(dlsfourcc::WSMP_LOOP_SIZE as u32)?;
        w.write_u32(dlsfourcc::loop_type::FORWARD)?;
        w.write_u32(start)?;
        w.write_u32(end - start)?;
    }
    Ok(())
}

/// Serializes every sample into a standalone `wave` chunk stream, returning
/// the bytes and each sample's byte offset from the start of that stream
/// (which is what `ptbl` cues must address).
fn build_wave_pool(base: &Base) -> Result<(Vec<u8>, Vec<u64>)> {
    let mut w: RiffWriter<Cursor<Vec<u8>>> = RiffWriter::new(Cursor::new(Vec::new()));
    let mut offsets = Vec::with_capacity(base.samples.len());
    for sample in &base.samples {
        offsets.push(w.tell()?);
        write_wave(&mut w, sample)?;
    }
    Ok((w.into_inner().into_inner(), offsets))
}

fn write_wave<W: Write + Seek>(w: &mut RiffWriter<W>, sample: &Sample) -> Result<()> {
    w.begin_list(dlsfourcc::WAVE)?;

    w.begin_sub(dlsfourcc::FMT)?;
    w.write_u16(1)?; // WAVE_FORMAT_PCM
    w.write_u16(1)?; // mono
    w.write_u32(sample.rate)?;
    let block_align = 2u16;
    w.write_u32(sample.rate * block_align as u32)?;
    w.write_u16(block_align)?;
    w.write_u16(16)?;
    w.end_chunk()?;

    w.begin_sub(dlsfourcc::WSMP)?;
    let loop_start = if sample.loop_end > sample.loop_start { Some(sample.loop_start) } else { None };
    let loop_end = if sample.loop_end > sample.loop_start { Some(sample.loop_end) } else { None };
    write_wsmp_fields(w, sample.root_note, sample.fine_tune, loop_start, loop_end)?;
    w.end_chunk()?;

    write_name(w, &sample.name)?;

    if let Some(unique_id) = sample.unique_id {
        w.begin_sub(dlsfourcc::DLID)?;
        w.write_bytes(&unique_id)?;
        w.end_chunk()?;
    }

    for (id, raw) in &sample.opaque_chunks {
        w.begin_sub(*id)?;
        w.write_bytes(raw)?;
        w.end_chunk()?;
    }

    w.begin_sub(dlsfourcc::DATA)?;
    write_sample_bytes(w, sample)?;
    w.end_chunk()?;

    w.end_chunk()?; // wave
    Ok(())
}

/// Copies a sample's audio out through its best 16-bit store and into the
/// `data` chunk (spec.md §4.1 "the core only copies bytes").
fn write_sample_bytes<W: Write + Seek>(w: &mut RiffWriter<W>, sample: &Sample) -> Result<()> {
    let frame_count = sample.data.frame_count();
    let mut handle = sample.data.open(SampleFormat::Pcm16)?;
    let mut buf = vec![0u8; frame_count as usize * 2];
    handle.read(0, frame_count, &mut buf)?;
    sample.data.release();
    w.write_bytes(&buf)?;
    Ok(())
}
