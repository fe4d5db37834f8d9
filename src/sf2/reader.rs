//! SF2 reader (spec.md §4.3.1), grounded on `IpatchSF2Reader.c`'s hydra
//! load order and the teacher's manual record-at-a-time parsing style
//! (`dse::swdl` chunk readers).

use std::io::{Read, Seek};

use crate::error::{FormatError, Result};
use crate::file::SharedFileHandle;
use crate::fourcc::{self, FourCC};
use crate::riff::{ChunkKind, RiffReader};
use crate::sample::store::{FileStore, RomStore, SampleFormat, Split24Store};
use crate::sample::SampleData;
use crate::tree::generator::{self, GenAmount, GenArray};
use crate::tree::modulator::{Modulator, ModulatorList};
use crate::tree::{Base, ChannelRole, Instrument, InstZone, Preset, PresetZone, Range, Sample, Version};

use super::fourcc as sf2fourcc;

struct RawPhdr {
    name: String,
    preset: u16,
    bank: u16,
    bag_index: u16,
    library: u32,
    genre: u32,
    morphology: u32,
}

struct RawInst {
    name: String,
    bag_index: u16,
}

#[derive(Clone, Copy)]
struct RawBag {
    gen_index: u16,
    mod_index: u16,
}

struct RawMod {
    src: u16,
    dest_gen: u16,
    amount: i16,
    amount_src: u16,
    transform: u16,
}

struct RawGen {
    gen_id: u16,
    amount: i16,
}

struct RawShdr {
    name: String,
    start: u32,
    end: u32,
    loop_start: u32,
    loop_end: u32,
    rate: u32,
    root: u8,
    fine: i8,
    link: u16,
    sample_type: u16,
}

/// Reads a whole SF2 file from `file`, returning the populated patch tree.
pub fn read(file: SharedFileHandle) -> Result<Base> {
    let cursor = crate::file::SharedCursor(file.clone());
    let mut r = RiffReader::new(cursor);
    read_from(&mut r, &file)
}

fn read_from<S: Read + Seek>(r: &mut RiffReader<S>, file: &SharedFileHandle) -> Result<Base> {
    let root = r.start_read()?;
    if root.id != sf2fourcc::SFBK {
        return Err(FormatError::UnknownFormat.into());
    }

    let mut base = Base::new();

    r.read_chunk_verify(ChunkKind::List, fourcc::riff::INFO)?;
    read_info(r, &mut base)?;
    r.end_chunk()?;

    r.read_chunk_verify(ChunkKind::List, sf2fourcc::SDTA)?;
    let (smpl_offset, sm24_offset) = read_sdta(r)?;
    r.end_chunk()?;

    r.read_chunk_verify(ChunkKind::List, sf2fourcc::PDTA)?;
    let phdrs = read_phdr(r)?;

    r.push_state()?;
    for _ in 0..3 {
        // pbag, pmod, pgen: not yet needed, read and discard the header+payload
        r.read_chunk()?;
        r.end_chunk()?;
    }
    let insts = read_inst(r)?;
    let ibag = read_bag(r, sf2fourcc::IBAG)?;
    let imod = read_mod(r, sf2fourcc::IMOD)?;
    let igen = read_gen(r, sf2fourcc::IGEN)?;
    let shdrs = read_shdr(r)?;

    build_samples(&mut base, &shdrs, smpl_offset, sm24_offset, file)?;
    build_instruments(&mut base, &insts, &ibag, &imod, &igen)?;

    r.pop_state()?;
    let pbag = read_bag(r, sf2fourcc::PBAG)?;
    let pmod = read_mod(r, sf2fourcc::PMOD)?;
    let pgen = read_gen(r, sf2fourcc::PGEN)?;
    build_presets(&mut base, &phdrs, &pbag, &pmod, &pgen);

    r.end_chunk()?; // pdta
    r.end_chunk()?; // sfbk root

    Ok(base)
}

fn read_info<S: Read + Seek>(r: &mut RiffReader<S>, base: &mut Base) -> Result<()> {
    while let Some(chunk) = r.read_chunk()? {
        if chunk.id == fourcc::info::IFIL || chunk.id == fourcc::info::IVER {
            let major = r.read_u16()?;
            let minor = r.read_u16()?;
            if chunk.id == fourcc::info::IFIL {
                base.version = Version::new(major, minor);
            } else {
                base.info.insert(chunk.id, format!("{major}.{minor}"));
            }
        } else {
            let max = sf2fourcc::info_max_len(chunk.id);
            let len = chunk.payload_size() as usize;
            let s = r.read_fixed_string(len.min(max))?;
            if len > max {
                log::warn!("INFO {} exceeds {} bytes, truncating", chunk.id, max);
                r.read_bytes(len - max)?;
            }
            base.info.insert(chunk.id, s);
        }
        r.end_chunk()?;
    }
    Ok(())
}

/// Returns `(smpl_offset, sm24_offset)`, the absolute byte offsets of the
/// sample data chunks within the file.
fn read_sdta<S: Read + Seek>(r: &mut RiffReader<S>) -> Result<(u64, Option<u64>)> {
    let mut smpl_offset = None;
    let mut sm24_offset = None;
    while let Some(chunk) = r.read_chunk()? {
        if chunk.id == sf2fourcc::SMPL {
            smpl_offset = Some(chunk.start_offset);
        } else if chunk.id == sf2fourcc::SM24 {
            sm24_offset = Some(chunk.start_offset);
        }
        r.end_chunk()?;
    }
    let smpl_offset = smpl_offset.ok_or(FormatError::InvalidSample {
        name: "sdta".into(),
        reason: "missing smpl chunk".into(),
    })?;
    Ok((smpl_offset, sm24_offset))
}

fn read_phdr<S: Read + Seek>(r: &mut RiffReader<S>) -> Result<Vec<RawPhdr>> {
    let chunk = r.read_chunk_verify(ChunkKind::Sub, sf2fourcc::PHDR)?;
    let n = chunk.payload_size() as usize / sf2fourcc::PHDR_SIZE;
    let mut v = Vec::with_capacity(n);
    for _ in 0..n {
        let name = r.read_fixed_string(20)?;
        let preset = r.read_u16()?;
        let bank = r.read_u16()?;
        let bag_index = r.read_u16()?;
        let library = r.read_u32()?;
        let genre = r.read_u32()?;
        let morphology = r.read_u32()?;
        v.push(RawPhdr { name, preset, bank, bag_index, library, genre, morphology });
    }
    r.end_chunk()?;
    Ok(v)
}

fn read_inst<S: Read + Seek>(r: &mut RiffReader<S>) -> Result<Vec<RawInst>> {
    let chunk = r.read_chunk_verify(ChunkKind::Sub, sf2fourcc::INST)?;
    let n = chunk.payload_size() as usize / sf2fourcc::INST_SIZE;
    let mut v = Vec::with_capacity(n);
    for _ in 0..n {
        let name = r.read_fixed_string(20)?;
        let bag_index = r.read_u16()?;
        v.push(RawInst { name, bag_index });
    }
    r.end_chunk()?;
    Ok(v)
}

fn read_bag<S: Read + Seek>(r: &mut RiffReader<S>, id: FourCC) -> Result<Vec<RawBag>> {
    let chunk = r.read_chunk_verify(ChunkKind::Sub, id)?;
    let n = chunk.payload_size() as usize / sf2fourcc::BAG_SIZE;
    let mut v = Vec::with_capacity(n);
    for i in 0..n {
        let gen_index = r.read_u16()?;
        let mod_index = r.read_u16()?;
        if let Some(prev) = v.last() {
            let prev: &RawBag = prev;
            if gen_index < prev.gen_index || mod_index < prev.mod_index {
                return Err(crate::error::RiffError::InvalidData(format!(
                    "{} record {} has a non-increasing gen/mod index",
                    id, i
                ))
                .into());
            }
        }
        v.push(RawBag { gen_index, mod_index });
    }
    r.end_chunk()?;
    Ok(v)
}

fn read_mod<S: Read + Seek>(r: &mut RiffReader<S>, id: FourCC) -> Result<Vec<RawMod>> {
    let chunk = r.read_chunk_verify(ChunkKind::Sub, id)?;
    let n = chunk.payload_size() as usize / sf2fourcc::MOD_SIZE;
    let mut v = Vec::with_capacity(n);
    for _ in 0..n {
        let src = r.read_u16()?;
        let dest_gen = r.read_u16()?;
        let amount = r.read_i16()?;
        let amount_src = r.read_u16()?;
        let transform = r.read_u16()?;
        v.push(RawMod { src, dest_gen, amount, amount_src, transform });
    }
    r.end_chunk()?;
    Ok(v)
}

fn read_gen<S: Read + Seek>(r: &mut RiffReader<S>, id: FourCC) -> Result<Vec<RawGen>> {
    let chunk = r.read_chunk_verify(ChunkKind::Sub, id)?;
    let n = chunk.payload_size() as usize / sf2fourcc::GEN_SIZE;
    let mut v = Vec::with_capacity(n);
    for _ in 0..n {
        let gen_id = r.read_u16()?;
        let amount = r.read_i16()?;
        v.push(RawGen { gen_id, amount });
    }
    r.end_chunk()?;
    Ok(v)
}

fn read_shdr<S: Read + Seek>(r: &mut RiffReader<S>) -> Result<Vec<RawShdr>> {
    let chunk = r.read_chunk_verify(ChunkKind::Sub, sf2fourcc::SHDR)?;
    let n = chunk.payload_size() as usize / sf2fourcc::SHDR_SIZE;
    let mut v = Vec::with_capacity(n);
    for _ in 0..n {
        let name = r.read_fixed_string(20)?;
        let start = r.read_u32()?;
        let end = r.read_u32()?;
        let loop_start = r.read_u32()?;
        let loop_end = r.read_u32()?;
        let rate = r.read_u32()?;
        let root = r.read_u8()?;
        let fine = r.read_i8()?;
        let link = r.read_u16()?;
        let sample_type = r.read_u16()?;
        v.push(RawShdr { name, start, end, loop_start, loop_end, rate, root, fine, link, sample_type });
    }
    r.end_chunk()?;
    Ok(v)
}

/// Builds `base.samples` from the raw header records, one sample per
/// non-sentinel `shdr` entry preserving array order/index (so pool indices
/// used by instrument zones need no separate remapping table), then
/// establishes stereo links (spec.md §4.3.1 "Sample records" / "Stereo linking").
fn build_samples(
    base: &mut Base,
    shdrs: &[RawShdr],
    smpl_offset: u64,
    sm24_offset: Option<u64>,
    file: &SharedFileHandle,
) -> Result<()> {
    if shdrs.is_empty() {
        return Ok(());
    }

    for s in &shdrs[..shdrs.len() - 1] {
        let is_rom = s.sample_type & sf2fourcc::sample_type::ROM != 0;
        let frame_count = s.end.saturating_sub(s.start);
        let invalid = frame_count < 4 || (s.end < s.start);

        let data = if invalid && !is_rom {
            log::warn!("sample {:?} has invalid frame range, using blank sentinel", s.name);
            SampleData::blank()
        } else if is_rom {
            SampleData::new(Box::new(RomStore {
                rom_offset: s.start,
                format: SampleFormat::Pcm16,
                frame_count,
                sample_rate: s.rate,
            }))
        } else if let Some(sm24) = sm24_offset {
            SampleData::new(Box::new(Split24Store {
                msb_file: file.clone(),
                msb_offset: smpl_offset + s.start as u64 * 2,
                lsb_file: file.clone(),
                lsb_offset: sm24 + s.start as u64,
                frame_count,
                sample_rate: s.rate,
            }))
        } else {
            SampleData::new(Box::new(FileStore {
                file: file.clone(),
                byte_offset: smpl_offset + s.start as u64 * 2,
                format: SampleFormat::Pcm16,
                frame_count,
                sample_rate: s.rate,
            }))
        };

        let channel_role = if s.sample_type & sf2fourcc::sample_type::LEFT != 0 {
            ChannelRole::Left
        } else if s.sample_type & sf2fourcc::sample_type::RIGHT != 0 {
            ChannelRole::Right
        } else if is_rom {
            ChannelRole::RomMono
        } else {
            ChannelRole::Mono
        };

        base.samples.push(Sample {
            name: s.name.clone(),
            rate: s.rate,
            root_note: s.root,
            fine_tune: s.fine as i16,
            loop_start: s.loop_start.saturating_sub(s.start),
            loop_end: s.loop_end.saturating_sub(s.start),
            channel_role,
            linked: None,
            data: std::sync::Arc::new(data),
            unique_id: None,
            opaque_chunks: Vec::new(),
        });
    }

    for (i, s) in shdrs[..shdrs.len() - 1].iter().enumerate() {
        let has_left = s.sample_type & sf2fourcc::sample_type::LEFT != 0;
        if has_left {
            let target = s.link as usize;
            if target < base.samples.len() && target != i {
                base.link_stereo(i, target);
            } else {
                log::warn!("sample {:?} has out-of-range stereo link {}", s.name, s.link);
            }
        }
    }

    Ok(())
}

/// Parses one zone's generator slice, enforcing the terminal-link-last
/// rule (spec.md §4.3.1): any generator after the terminal id is discarded
/// with a warning. Returns `(gens, terminal_pool_index)`.
fn parse_zone_gens(raw: &[RawGen], terminal_id: u16) -> (GenArray, Option<u16>) {
    let mut arr = GenArray::new();
    let mut link = None;
    for g in raw {
        if link.is_some() {
            log::warn!("generator {} found after terminal link generator, discarding", g.gen_id);
            continue;
        }
        if g.gen_id == terminal_id {
            link = Some(g.amount as u16);
        } else if (g.gen_id as usize) < generator::NUM_GENERATORS {
            arr.set(g.gen_id, GenAmount::from_raw(g.gen_id, g.amount));
        } else {
            log::warn!("unknown generator id {} ignored", g.gen_id);
        }
    }
    (arr, link)
}

fn parse_zone_mods(raw: &[RawMod]) -> ModulatorList {
    let mut list = ModulatorList::new();
    for m in raw {
        list.0.push(Modulator { src: m.src, dest_gen: m.dest_gen, amount: m.amount, amount_src: m.amount_src, transform: m.transform });
    }
    list
}

/// `(gen_start, gen_end, mod_start, mod_end)` for each zone belonging to a
/// record spanning `[bag_index, bag_index+zone_count)` in `bag`.
fn zone_slices(bag: &[RawBag], bag_index: u16, zone_count: u16) -> Vec<(usize, usize, usize, usize)> {
    let mut out = Vec::new();
    for z in 0..zone_count {
        let i = (bag_index + z) as usize;
        if i + 1 >= bag.len() {
            log::warn!("zone index {} out of range of bag table", i);
            break;
        }
        out.push((bag[i].gen_index as usize, bag[i + 1].gen_index as usize, bag[i].mod_index as usize, bag[i + 1].mod_index as usize));
    }
    out
}

fn build_instruments(base: &mut Base, insts: &[RawInst], ibag: &[RawBag], imod: &[RawMod], igen: &[RawGen]) -> Result<()> {
    if insts.is_empty() {
        return Ok(());
    }
    for i in 0..insts.len() - 1 {
        let zone_count = insts[i + 1].bag_index.saturating_sub(insts[i].bag_index);
        let slices = zone_slices(ibag, insts[i].bag_index, zone_count);

        let mut zones = Vec::new();
        for (idx, (gs, ge, ms, me)) in slices.iter().enumerate() {
            let (gens, link) = parse_zone_gens(&igen[*gs..*ge], generator::id::SAMPLE_ID);
            let mods = parse_zone_mods(&imod[*ms..*me]);

            let sample_ref = match link {
                Some(pool_idx) => {
                    if (pool_idx as usize) < base.samples.len() {
                        Some(pool_idx as usize)
                    } else {
                        log::warn!("instrument {:?} zone {} has out-of-range sample id {}", insts[i].name, idx, pool_idx);
                        continue;
                    }
                }
                None if idx == 0 => None,
                None => {
                    log::warn!("instrument {:?} zone {} missing sample id, discarding malformed zone", insts[i].name, idx);
                    continue;
                }
            };

            let mut zone = InstZone { sample_ref, generators: gens, modulators: mods, ..InstZone::default() };
            if let Some((lo, hi)) = zone.generators.get(generator::id::KEY_RANGE).and_then(|a| a.as_range()) {
                zone.note_range = Range::new(lo, hi);
            }
            if let Some((lo, hi)) = zone.generators.get(generator::id::VEL_RANGE).and_then(|a| a.as_range()) {
                zone.velocity_range = Range::new(lo, hi);
            }
            zones.push(zone);
        }

        let (global_gens, global_mods) = Base::absorb_global_inst_zone(&mut zones);
        base.instruments.push(Instrument {
            name: insts[i].name.clone(),
            bank: 0,
            program: 0,
            percussion: false,
            zones,
            global_generators: global_gens,
            global_modulators: global_mods,
            global_params: Vec::new(),
            unique_id: None,
            opaque_chunks: Vec::new(),
        });
    }
    Ok(())
}

fn build_presets(base: &mut Base, phdrs: &[RawPhdr], pbag: &[RawBag], pmod: &[RawMod], pgen: &[RawGen]) {
    if phdrs.is_empty() {
        return;
    }
    for i in 0..phdrs.len() - 1 {
        let zone_count = phdrs[i + 1].bag_index.saturating_sub(phdrs[i].bag_index);
        let slices = zone_slices(pbag, phdrs[i].bag_index, zone_count);

        let mut zones = Vec::new();
        for (idx, (gs, ge, ms, me)) in slices.iter().enumerate() {
            let (gens, link) = parse_zone_gens(&pgen[*gs..*ge], generator::id::INSTRUMENT_ID);
            let mods = parse_zone_mods(&pmod[*ms..*me]);

            let inst_ref = match link {
                Some(pool_idx) => {
                    if (pool_idx as usize) < base.instruments.len() {
                        Some(pool_idx as usize)
                    } else {
                        log::warn!("preset {:?} zone {} has out-of-range instrument id {}", phdrs[i].name, idx, pool_idx);
                        continue;
                    }
                }
                None if idx == 0 => None,
                None => {
                    log::warn!("preset {:?} zone {} missing instrument id, discarding malformed zone", phdrs[i].name, idx);
                    continue;
                }
            };

            zones.push(PresetZone { inst_ref, generators: gens, modulators: mods });
        }

        base.presets.push(Preset {
            name: phdrs[i].name.clone(),
            bank: phdrs[i].bank,
            program: phdrs[i].preset as u8,
            library: phdrs[i].library,
            genre: phdrs[i].genre,
            morphology: phdrs[i].morphology,
            zones,
        });
    }
}
