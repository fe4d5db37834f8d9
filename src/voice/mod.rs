//! The voice cache (spec.md §4.5): flattens every preset/instrument zone
//! combination down to the generator/modulator set a synthesizer would
//! play, resolving each combination's note/velocity coverage up front so a
//! cache is built once per preset/instrument and queried by `(key,
//! velocity)` afterward rather than re-walked on every note-on. SF2's
//! preset-over-instrument layering rule is applied at build time. DLS/GIG
//! lack generators natively, so their articulator connections
//! (`InstZone::params`/`Instrument::global_params`) and GIG's `3ewa` effect
//! block are mapped onto the same `GenArray` shape the SF2 side produces,
//! so a single `Voice` type serves every format.

use crate::tree::generator::{id, GenArray};
use crate::tree::modulator::ModulatorList;
use crate::tree::{Base, DlsParam, InstIdx, Range, SampleIdx};

/// One fully resolved playback instance: everything a synth needs to start
/// a note, with preset/instrument/global layering already applied and its
/// note/velocity coverage resolved (spec.md §4.5 "voice.note_range.low <=
/// voice.note_range.high" must hold for every cached voice).
#[derive(Debug, Clone)]
pub struct Voice {
    pub sample_ref: Option<SampleIdx>,
    pub generators: GenArray,
    pub modulators: ModulatorList,
    pub note_range: Range,
    pub velocity_range: Range,
}

/// The flattened voice set for one preset (SF2) or instrument (DLS/GIG),
/// built once via [`VoiceCache::from_sf2_preset`]/[`VoiceCache::from_dls_instrument`]
/// and queried by `(key, velocity)` for every note-on rather than re-walking
/// the zone tree each time (spec.md §4.5).
#[derive(Debug, Clone, Default)]
pub struct VoiceCache {
    voices: Vec<Voice>,
}

impl VoiceCache {
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Every voice whose resolved coverage includes `(key, velocity)`; SF2
    /// allows overlapping zones, so more than one voice may match.
    pub fn matching(&self, key: u8, velocity: u8) -> impl Iterator<Item = &Voice> {
        self.voices.iter().filter(move |v| v.note_range.contains(key) && v.velocity_range.contains(velocity))
    }

    /// Builds the full voice set for an SF2 preset (spec.md §4.5 step
    /// 1a-1c): each non-global preset zone paired with each non-global
    /// instrument zone of its referenced instrument, honoring the absorbed
    /// global zone as a base layer on both sides.
    pub fn from_sf2_preset(base: &Base, preset_idx: usize) -> VoiceCache {
        let Some(preset) = base.presets.get(preset_idx) else { return VoiceCache::default() };
        let preset_global = preset.global_zone();

        let mut voices = Vec::new();
        for pzone in preset.sounding_zones() {
            let Some(inst_idx) = pzone.inst_ref else { continue };
            let Some(inst) = base.instruments.get(inst_idx) else { continue };

            for izone in inst.sounding_zones() {
                let Some((note_range, velocity_range)) = zone_coverage(&pzone.generators, &izone.generators) else {
                    continue;
                };

                let mut gens = inst.global_generators;
                gens.overlay_from(&izone.generators);

                let mut preset_offset = GenArray::new();
                if let Some(g) = preset_global {
                    preset_offset.overlay_from(&g.generators);
                }
                preset_offset.add_scalars_from(&pzone.generators);
                gens.add_scalars_from(&preset_offset);

                let mut mods = ModulatorList::new();
                mods.extend_override(&inst.global_modulators);
                mods.extend_override(&izone.modulators);
                if let Some(g) = preset_global {
                    mods.extend_additive(&g.modulators);
                }
                mods.extend_additive(&pzone.modulators);

                voices.push(Voice {
                    sample_ref: izone.sample_ref,
                    generators: gens,
                    modulators: mods,
                    note_range,
                    velocity_range,
                });
            }
        }
        VoiceCache { voices }
    }

    /// Builds the full voice set for a DLS/GIG instrument (spec.md §4.4
    /// "DLS merges the preset level into the instrument"): instrument-level
    /// `global_params` is the base layer, each region's own `params` and
    /// (for GIG) `3ewa` effect block overlay on top.
    pub fn from_dls_instrument(base: &Base, inst_idx: InstIdx) -> VoiceCache {
        let Some(inst) = base.instruments.get(inst_idx) else { return VoiceCache::default() };

        let mut base_gens = GenArray::new();
        apply_dls_params(&mut base_gens, &inst.global_params);

        let mut voices = Vec::new();
        for zone in inst.sounding_zones() {
            let mut gens = base_gens;
            apply_dls_params(&mut gens, &zone.params);

            if let Some((_, raw)) = zone.opaque_chunks.iter().find(|(id, _)| id == &crate::gig::fourcc::THREE_EWA) {
                gens.overlay_from(&crate::gig::effects::map_to_generators(raw));
            }

            voices.push(Voice {
                sample_ref: zone.sample_ref,
                generators: gens,
                modulators: ModulatorList::new(),
                note_range: zone.note_range,
                velocity_range: zone.velocity_range,
            });
        }
        VoiceCache { voices }
    }
}

/// Intersects a preset zone's and instrument zone's `key_range`/`vel_range`
/// generators, defaulting to the full `0..=127` range when either side
/// leaves a dimension unset; `None` if the zones share no coverage at all.
fn zone_coverage(preset_gens: &GenArray, inst_gens: &GenArray) -> Option<(Range, Range)> {
    let note = range_of(preset_gens, id::KEY_RANGE).intersect(range_of(inst_gens, id::KEY_RANGE))?;
    let vel = range_of(preset_gens, id::VEL_RANGE).intersect(range_of(inst_gens, id::VEL_RANGE))?;
    Some((note, vel))
}

fn range_of(gens: &GenArray, gen_id: u16) -> Range {
    gens.get(gen_id).and_then(|a| a.as_range()).map(|(lo, hi)| Range::new(lo, hi)).unwrap_or_else(Range::full)
}

fn apply_dls_params(gens: &mut GenArray, params: &[DlsParam]) {
    for p in params {
        if let Some(gen_id) = dls_destination_to_generator(p.articulation) {
            gens.set_scalar(gen_id, p.value);
        }
    }
}

/// Maps a DLS-2 articulator connection-block destination (`CONN_DST_*`) to
/// its SF2 generator equivalent, for the handful of destinations the two
/// formats share directly (DLS-2 §2.9; SF2's generator set was modeled on
/// it). Destinations with no SF2 counterpart (LFO routing, per-MIDI-
/// controller modulation depth) are left unmapped.
fn dls_destination_to_generator(dest: u16) -> Option<u16> {
    match dest {
        0x0004 => Some(id::PAN),                      // CONN_DST_PAN
        0x0206 => Some(id::ATTACK_VOL_ENV),            // CONN_DST_EG1_ATTACKTIME
        0x0207 => Some(id::DECAY_VOL_ENV),             // CONN_DST_EG1_DECAYTIME
        0x0208 => Some(id::SUSTAIN_VOL_ENV),           // CONN_DST_EG1_SUSTAINLEVEL
        0x0209 => Some(id::RELEASE_VOL_ENV),           // CONN_DST_EG1_RELEASETIME
        0x020A => Some(id::HOLD_VOL_ENV),              // CONN_DST_EG1_HOLDTIME
        0x030A => Some(id::ATTACK_MOD_ENV),            // CONN_DST_EG2_ATTACKTIME
        0x030B => Some(id::DECAY_MOD_ENV),             // CONN_DST_EG2_DECAYTIME
        0x030C => Some(id::SUSTAIN_MOD_ENV),           // CONN_DST_EG2_SUSTAINLEVEL
        0x030D => Some(id::RELEASE_MOD_ENV),           // CONN_DST_EG2_RELEASETIME
        0x0500 => Some(id::INITIAL_FILTER_FC),         // CONN_DST_FILTER_CUTOFF
        0x0501 => Some(id::INITIAL_FILTER_Q),          // CONN_DST_FILTER_Q
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::generator::id as gid;
    use crate::tree::{Instrument, InstZone, Preset, PresetZone};

    fn base_with_one_voice() -> Base {
        let mut base = Base::new();
        let mut izone = InstZone::default();
        izone.sample_ref = Some(0);
        izone.generators.set_scalar(gid::INITIAL_ATTENUATION, 50);
        let inst = Instrument { zones: vec![izone], ..Default::default() };
        base.instruments.push(inst);

        let mut pzone = PresetZone { inst_ref: Some(0), ..Default::default() };
        pzone.generators.set_scalar(gid::INITIAL_ATTENUATION, 10);
        let preset = Preset { zones: vec![pzone], ..Default::default() };
        base.presets.push(preset);
        base
    }

    #[test]
    fn sf2_flatten_adds_preset_offset_onto_instrument() {
        let base = base_with_one_voice();
        let cache = VoiceCache::from_sf2_preset(&base, 0);
        let voices: Vec<_> = cache.matching(60, 100).collect();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].generators.get_or(gid::INITIAL_ATTENUATION, 0), 60);
    }

    #[test]
    fn every_cached_voice_has_low_le_high_ranges() {
        let base = base_with_one_voice();
        let cache = VoiceCache::from_sf2_preset(&base, 0);
        for voice in cache.voices() {
            assert!(voice.note_range.low <= voice.note_range.high);
            assert!(voice.velocity_range.low <= voice.velocity_range.high);
        }
    }

    #[test]
    fn out_of_range_key_is_excluded() {
        let mut base = base_with_one_voice();
        base.instruments[0].zones[0].generators.set_range(gid::KEY_RANGE, 0, 10);
        let cache = VoiceCache::from_sf2_preset(&base, 0);
        assert!(cache.matching(60, 100).next().is_none());
        assert!(cache.matching(5, 100).next().is_some());
    }

    #[test]
    fn dls_pan_articulator_maps_to_sf2_pan() {
        let mut base = Base::new();
        let mut zone = InstZone::default();
        zone.sample_ref = Some(0);
        zone.params.push(DlsParam { articulation: 0x0004, value: 250 });
        let inst = Instrument { zones: vec![zone], ..Default::default() };
        base.instruments.push(inst);

        let cache = VoiceCache::from_dls_instrument(&base, 0);
        let voices: Vec<_> = cache.matching(60, 100).collect();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].generators.get_or(gid::PAN, 0), 250);
    }
}
