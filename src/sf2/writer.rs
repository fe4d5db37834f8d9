//! SF2 writer (spec.md §4.3.2), grounded on `IpatchSF2Writer.c`'s
//! deep-clone-then-mutate save strategy and the teacher's `buf_begin`/
//! `buf_write_*`/`buf_commit` staged-write idiom (`dse::swdl` writers use
//! the equivalent direct `WriteBytesExt` calls; this crate generalizes
//! that into `FileHandle`'s staging buffer, see `src/file.rs`).

use std::io::{Seek, Write};

use crate::error::Result;
use crate::fourcc::{self, FourCC};
use crate::riff::RiffWriter;
use crate::sample::store::{FileStore, SampleFormat};
use crate::tree::generator;
use crate::tree::{Base, ChannelRole, InstZone, PresetZone};

use super::fourcc as sf2fourcc;

const TRAILING_SILENCE_FRAMES: u32 = 46;

/// Writer policy knobs with no in-tree representation (spec.md §9 "Open
/// question — writer 24-bit preservation": the original unconditionally
/// downsamples storage to 16-bit unless explicitly told otherwise, and we
/// keep that as an explicit, non-silent default rather than auto-detecting
/// from whichever stores happen to be attached).
#[derive(Debug, Clone, Copy)]
pub struct Sf2WriteOptions {
    /// Emit `sm24` and keep 24-bit precision for samples that have a
    /// 24-bit store. Defaults to `false`, matching the original's
    /// unconditional-16-bit behavior.
    pub preserve_24_bit: bool,
}

impl Default for Sf2WriteOptions {
    fn default() -> Self {
        Sf2WriteOptions { preserve_24_bit: false }
    }
}

/// Writes `base` as a complete SF2 file to `out` using default options
/// (16-bit storage). Every sample's shared `SampleData` gets a fresh
/// [`FileStore`] appended pointing at the data just written (spec.md
/// §4.3.2 step 6 "writers may optionally hand back new stores pointing
/// into the file they just wrote"); since `Sample::data` is an
/// `Arc<SampleData>`, the caller's existing tree observes the new store
/// immediately with no splice-back step required.
pub fn write<W: Write + Seek>(base: &Base, out: W, shared: crate::file::SharedFileHandle) -> Result<()> {
    write_with_options(base, out, shared, Sf2WriteOptions::default())
}

/// Like [`write`], but with explicit control over 24-bit preservation.
pub fn write_with_options<W: Write + Seek>(
    base: &Base,
    out: W,
    shared: crate::file::SharedFileHandle,
    options: Sf2WriteOptions,
) -> Result<()> {
    let mut w = RiffWriter::new(out);

    w.start_write(sf2fourcc::SFBK)?;

    w.begin_list(fourcc::riff::INFO)?;
    write_info(&mut w, base)?;
    w.end_chunk()?;

    w.begin_list(sf2fourcc::SDTA)?;
    let (smpl_offsets, start_frames, use_24bit) = write_sdta(&mut w, base, options.preserve_24_bit)?;
    w.end_chunk()?;

    w.begin_list(sf2fourcc::PDTA)?;
    write_pdta(&mut w, base, &start_frames)?;
    w.end_chunk()?;

    w.end_chunk()?; // sfbk

    for (sample, byte_offset) in base.samples.iter().zip(smpl_offsets) {
        sample.data.add_store(Box::new(FileStore {
            file: shared.clone(),
            byte_offset,
            format: if use_24bit { SampleFormat::Pcm24 } else { SampleFormat::Pcm16 },
            frame_count: sample.frame_count(),
            sample_rate: sample.rate,
        }));
    }
    Ok(())
}

fn write_info<W: Write + Seek>(w: &mut RiffWriter<W>, base: &Base) -> Result<()> {
    w.begin_sub(fourcc::info::IFIL)?;
    w.write_u16(base.version.major)?;
    w.write_u16(base.version.minor)?;
    w.end_chunk()?;

    if let Some(iver) = base.info.get(&fourcc::info::IVER) {
        if let Some((major, minor)) = iver.split_once('.').and_then(|(a, b)| Some((a.parse().ok()?, b.parse().ok()?))) {
            w.begin_sub(fourcc::info::IVER)?;
            w.write_u16(major)?;
            w.write_u16(minor)?;
            w.end_chunk()?;
        }
    }

    let name = base.info.get(&fourcc::info::INAM).cloned().unwrap_or_else(|| "untitled".into());
    write_text_chunk(w, fourcc::info::INAM, &name)?;

    // Canonical ordering: ISFT is regenerated to record this crate's
    // authorship, appending any prior "created:" provenance.
    let created = base.info.get(&fourcc::info::ISFT).and_then(|prior| {
        prior.split_once("created:").map(|(_, rest)| format!(" created:{}", rest.trim()))
    });
    let isft = format!(
        "{} (instpatch {}){}",
        crate::config::application_name(),
        env!("CARGO_PKG_VERSION"),
        created.unwrap_or_default()
    );
    write_text_chunk(w, fourcc::info::ISFT, &isft)?;

    // Canonical INFO order (spec.md §4.3.2 step 3): ifil/iver/INAM/ISFT are
    // handled above; everything else follows isng, irom, ICRD, IENG, IPRD,
    // ICOP, ICMT, with any remaining unlisted ids trailing in FourCC byte
    // order so emission is deterministic regardless of `base.info`'s
    // (unordered) storage.
    const REMAINING_ORDER: &[FourCC] = &[
        fourcc::info::ISNG,
        fourcc::info::IROM,
        fourcc::info::ICRD,
        fourcc::info::IENG,
        fourcc::info::IPRD,
        fourcc::info::ICOP,
        fourcc::info::ICMT,
    ];
    let handled = [fourcc::info::INAM, fourcc::info::ISFT, fourcc::info::IFIL, fourcc::info::IVER];
    for &id in REMAINING_ORDER {
        if let Some(value) = base.info.get(&id) {
            write_text_chunk(w, id, value)?;
        }
    }
    let mut leftover: Vec<(FourCC, &String)> = base
        .info
        .iter()
        .filter(|(id, _)| !handled.contains(id) && !REMAINING_ORDER.contains(id))
        .map(|(&id, value)| (id, value))
        .collect();
    leftover.sort_by_key(|(id, _)| *id);
    for (id, value) in leftover {
        write_text_chunk(w, id, value)?;
    }
    Ok(())
}

fn write_text_chunk<W: Write + Seek>(w: &mut RiffWriter<W>, id: FourCC, text: &str) -> Result<()> {
    w.begin_sub(id)?;
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    if bytes.len() % 2 != 0 {
        bytes.push(0);
    }
    w.write_bytes(&bytes)?;
    w.end_chunk()?;
    Ok(())
}

/// Writes `smpl` (and `sm24` if `preserve_24_bit` is requested and at least
/// one sample has 24-bit data), each sample followed by 46 zero frames of
/// trailing silence as SF2 requires (spec.md §4.3.2 "Sample data
/// emission"). Returns each sample's absolute byte offset into `smpl` plus
/// whether a `sm24` chunk was emitted.
fn write_sdta<W: Write + Seek>(w: &mut RiffWriter<W>, base: &Base, preserve_24_bit: bool) -> Result<(Vec<u64>, Vec<u32>, bool)> {
    let use_24bit = preserve_24_bit
        && base
            .samples
            .iter()
            .any(|s| s.data.best_format(SampleFormat::Pcm24) == SampleFormat::Pcm24);

    let mut offsets = Vec::with_capacity(base.samples.len());
    let mut start_frames = Vec::with_capacity(base.samples.len());
    let mut lsb_bytes: Vec<u8> = Vec::new();

    w.begin_sub(sf2fourcc::SMPL)?;
    let pool_start = w.tell()?;
    for sample in &base.samples {
        let offset = w.tell()?;
        offsets.push(offset);
        start_frames.push(((offset - pool_start) / 2) as u32);

        let frames = sample.frame_count();
        let want = if use_24bit { SampleFormat::Pcm24 } else { SampleFormat::Pcm16 };
        let bpf = sample.data.best_format(want).bytes_per_frame();
        let mut handle = sample.data.open(want)?;
        let mut buf = vec![0u8; frames as usize * bpf];
        if frames > 0 {
            handle.read(0, frames, &mut buf)?;
        }
        sample.data.release();

        if bpf == 3 {
            for frame in buf.chunks_exact(3) {
                w.write_bytes(&[frame[1], frame[2]])?;
                lsb_bytes.push(frame[0]);
            }
        } else {
            w.write_bytes(&buf)?;
        }
        for _ in 0..TRAILING_SILENCE_FRAMES {
            w.write_u16(0)?;
            if use_24bit {
                lsb_bytes.push(0);
            }
        }
    }
    w.end_chunk()?;

    if use_24bit {
        w.begin_sub(sf2fourcc::SM24)?;
        w.write_bytes(&lsb_bytes)?;
        if lsb_bytes.len() % 2 != 0 {
            w.write_u8(0)?;
        }
        w.end_chunk()?;
    }

    Ok((offsets, start_frames, use_24bit))
}

fn write_pdta<W: Write + Seek>(w: &mut RiffWriter<W>, base: &Base, start_frames: &[u32]) -> Result<()> {
    // Dense pool-index maps (spec.md §4.3.2 "index maps"): a preset/
    // instrument zone's sample_ref/inst_ref is already a direct `Base`
    // index, so the identity map suffices as long as every referenced
    // sample/instrument is written (which it always is, since `samples`/
    // `instruments` hold every entry this writer emits).
    let mut ibag_recs: Vec<(u16, u16)> = Vec::new();
    let mut inst_recs: Vec<(String, u16)> = Vec::new();
    let mut igen_recs: Vec<(u16, i16)> = Vec::new();
    let mut imod_recs: Vec<(u16, u16, i16, u16, u16)> = Vec::new();

    for inst in &base.instruments {
        inst_recs.push((inst.name.clone(), ibag_recs.len() as u16));

        if inst.global_generators.len_set() > 0 || !inst.global_modulators.0.is_empty() {
            ibag_recs.push((igen_recs.len() as u16, imod_recs.len() as u16));
            emit_mods(&mut imod_recs, &inst.global_modulators.0);
            emit_gens(&mut igen_recs, &inst.global_generators, None);
        }

        for zone in &inst.zones {
            ibag_recs.push((igen_recs.len() as u16, imod_recs.len() as u16));
            emit_mods(&mut imod_recs, &zone.modulators.0);
            emit_zone_gens(&mut igen_recs, zone);
        }
    }
    ibag_recs.push((igen_recs.len() as u16, imod_recs.len() as u16));
    inst_recs.push(("EOI".into(), ibag_recs.len() as u16 - 1));

    w.begin_sub(sf2fourcc::INST)?;
    for (name, bag_index) in &inst_recs {
        write_fixed_name(w, name)?;
        w.write_u16(*bag_index)?;
    }
    w.end_chunk()?;

    write_bag_chunk(w, sf2fourcc::IBAG, &ibag_recs)?;
    write_mod_chunk(w, sf2fourcc::IMOD, &imod_recs)?;
    write_gen_chunk(w, sf2fourcc::IGEN, &igen_recs)?;

    w.begin_sub(sf2fourcc::SHDR)?;
    for (s, &start) in base.samples.iter().zip(start_frames) {
        write_fixed_name(w, &s.name)?;
        let frames = s.frame_count();
        w.write_u32(start)?;
        w.write_u32(start + frames)?;
        w.write_u32(start + s.loop_start)?;
        w.write_u32(start + s.loop_end)?;
        w.write_u32(s.rate)?;
        w.write_u8(s.root_note)?;
        w.write_i8(s.fine_tune as i8)?;
        let link = s.linked.map(|idx| idx as u16).unwrap_or(0);
        w.write_u16(link)?;
        let sample_type = match s.channel_role {
            ChannelRole::Mono => sf2fourcc::sample_type::MONO,
            ChannelRole::Left => sf2fourcc::sample_type::LEFT,
            ChannelRole::Right => sf2fourcc::sample_type::RIGHT,
            ChannelRole::RomMono => sf2fourcc::sample_type::MONO | sf2fourcc::sample_type::ROM,
        };
        w.write_u16(sample_type)?;
    }
    write_fixed_name(w, "EOS")?;
    for _ in 0..5 {
        w.write_u32(0)?;
    }
    w.write_u8(0)?;
    w.write_i8(0)?;
    w.write_u16(0)?;
    w.write_u16(0)?;
    w.end_chunk()?;

    write_presets(w, base)?;
    Ok(())
}

fn write_presets<W: Write + Seek>(w: &mut RiffWriter<W>, base: &Base) -> Result<()> {
    let mut pbag_recs: Vec<(u16, u16)> = Vec::new();
    let mut phdr_recs: Vec<&crate::tree::Preset> = Vec::new();
    let mut phdr_bag_index: Vec<u16> = Vec::new();
    let mut pgen_recs: Vec<(u16, i16)> = Vec::new();
    let mut pmod_recs: Vec<(u16, u16, i16, u16, u16)> = Vec::new();

    for preset in &base.presets {
        phdr_recs.push(preset);
        phdr_bag_index.push(pbag_recs.len() as u16);

        if let Some(global) = preset.global_zone() {
            pbag_recs.push((pgen_recs.len() as u16, pmod_recs.len() as u16));
            emit_mods(&mut pmod_recs, &global.modulators.0);
            emit_gens(&mut pgen_recs, &global.generators, None);
        }

        for zone in preset.sounding_zones() {
            pbag_recs.push((pgen_recs.len() as u16, pmod_recs.len() as u16));
            emit_mods(&mut pmod_recs, &zone.modulators.0);
            emit_preset_zone_gens(&mut pgen_recs, zone);
        }
    }
    pbag_recs.push((pgen_recs.len() as u16, pmod_recs.len() as u16));
    phdr_bag_index.push(pbag_recs.len() as u16 - 1);

    w.begin_sub(sf2fourcc::PHDR)?;
    for (i, preset) in phdr_recs.iter().enumerate() {
        write_fixed_name(w, &preset.name)?;
        w.write_u16(preset.program as u16)?;
        w.write_u16(preset.bank)?;
        w.write_u16(phdr_bag_index[i])?;
        w.write_u32(preset.library)?;
        w.write_u32(preset.genre)?;
        w.write_u32(preset.morphology)?;
    }
    write_fixed_name(w, "EOP")?;
    w.write_u16(0)?;
    w.write_u16(0)?;
    w.write_u16(*phdr_bag_index.last().unwrap_or(&0))?;
    w.write_u32(0)?;
    w.write_u32(0)?;
    w.write_u32(0)?;
    w.end_chunk()?;

    write_bag_chunk(w, sf2fourcc::PBAG, &pbag_recs)?;
    write_mod_chunk(w, sf2fourcc::PMOD, &pmod_recs)?;
    write_gen_chunk(w, sf2fourcc::PGEN, &pgen_recs)?;
    Ok(())
}

fn emit_mods(out: &mut Vec<(u16, u16, i16, u16, u16)>, mods: &[crate::tree::modulator::Modulator]) {
    for m in mods {
        out.push((m.src, m.dest_gen, m.amount, m.amount_src, m.transform));
    }
}

/// Emits an instrument zone's generators in canonical order: ranges first
/// (`key_range` before `vel_range` when both set), plain scalars next, the
/// `sampleID` terminal link last (spec.md §4.3.2 "Generator ordering").
fn emit_zone_gens(out: &mut Vec<(u16, i16)>, zone: &InstZone) {
    emit_gens(out, &zone.generators, zone.sample_ref.map(|idx| (generator::id::SAMPLE_ID, idx as i16)));
}

fn emit_preset_zone_gens(out: &mut Vec<(u16, i16)>, zone: &PresetZone) {
    emit_gens(out, &zone.generators, zone.inst_ref.map(|idx| (generator::id::INSTRUMENT_ID, idx as i16)));
}

fn emit_gens(out: &mut Vec<(u16, i16)>, gens: &generator::GenArray, terminal: Option<(u16, i16)>) {
    if let Some(amount) = gens.get(generator::id::KEY_RANGE) {
        out.push((generator::id::KEY_RANGE, amount.to_raw()));
    }
    if let Some(amount) = gens.get(generator::id::VEL_RANGE) {
        out.push((generator::id::VEL_RANGE, amount.to_raw()));
    }
    for (id, amount) in gens.iter_set() {
        if id == generator::id::KEY_RANGE || id == generator::id::VEL_RANGE {
            continue;
        }
        out.push((id, amount.to_raw()));
    }
    if let Some((id, amount)) = terminal {
        out.push((id, amount));
    }
}

fn write_bag_chunk<W: Write + Seek>(w: &mut RiffWriter<W>, id: FourCC, recs: &[(u16, u16)]) -> Result<()> {
    w.begin_sub(id)?;
    for (gen_index, mod_index) in recs {
        w.write_u16(*gen_index)?;
        w.write_u16(*mod_index)?;
    }
    w.end_chunk()?;
    Ok(())
}

fn write_mod_chunk<W: Write + Seek>(w: &mut RiffWriter<W>, id: FourCC, recs: &[(u16, u16, i16, u16, u16)]) -> Result<()> {
    w.begin_sub(id)?;
    for (src, dest, amount, amount_src, transform) in recs {
        w.write_u16(*src)?;
        w.write_u16(*dest)?;
        w.write_i16(*amount)?;
        w.write_u16(*amount_src)?;
        w.write_u16(*transform)?;
    }
    w.end_chunk()?;
    Ok(())
}

fn write_gen_chunk<W: Write + Seek>(w: &mut RiffWriter<W>, id: FourCC, recs: &[(u16, i16)]) -> Result<()> {
    w.begin_sub(id)?;
    for (gen_id, amount) in recs {
        w.write_u16(*gen_id)?;
        w.write_i16(*amount)?;
    }
    w.end_chunk()?;
    Ok(())
}

fn write_fixed_name<W: Write + Seek>(w: &mut RiffWriter<W>, name: &str) -> Result<()> {
    let mut bytes = [0u8; 20];
    let src = name.as_bytes();
    let n = src.len().min(20);
    bytes[..n].copy_from_slice(&src[..n]);
    w.write_bytes(&bytes)?;
    Ok(())
}
