//! The patch tree (spec.md §3.3): the common in-memory shape shared by SF2,
//! DLS2 and GIG files. Cross-references (zone→sample, preset-zone→
//! instrument, sample→stereo-mate) are modeled as plain indices into the
//! owning `Base`'s vectors rather than a reference-counted object graph
//! (spec.md §10 "Object tree with back-references" redesign note) — this
//! makes stereo link cycles trivial and keeps the tree `Send` without any
//! interior mutability at the structural level.

pub mod generator;
pub mod modulator;

use std::collections::HashMap;
use std::sync::Arc;

use crate::fourcc::FourCC;
use crate::sample::SampleData;
use generator::GenArray;
use modulator::ModulatorList;

/// Index of a [`Sample`] within its `Base`'s `samples` vector.
pub type SampleIdx = usize;
/// Index of an [`Instrument`] within its `Base`'s `instruments` vector.
pub type InstIdx = usize;

/// An inclusive `(low, high)` range; setters swap out-of-order arguments
/// (spec.md §3.3 "Zone note/velocity ranges use low ≤ high").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub low: u8,
    pub high: u8,
}

impl Range {
    pub fn new(low: u8, high: u8) -> Self {
        if low <= high {
            Range { low, high }
        } else {
            Range { low: high, high: low }
        }
    }

    pub fn full() -> Self {
        Range { low: 0, high: 127 }
    }

    pub fn intersect(self, other: Range) -> Option<Range> {
        let low = self.low.max(other.low);
        let high = self.high.min(other.high);
        if low <= high {
            Some(Range { low, high })
        } else {
            None
        }
    }

    pub fn contains(self, value: u8) -> bool {
        value >= self.low && value <= self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Mono,
    Left,
    Right,
    RomMono,
}

/// A sample's DLS standard-parameter array entry (DLS/Gig only, spec.md
/// §3.3 `InstZone::params[]`); kept opaque since the core never interprets
/// these beyond carrying them through read→write round trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DlsParam {
    pub articulation: u16,
    pub value: i16,
}

/// `(major, minor)` version with an explicit "is set" flag (spec.md §3.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub is_set: bool,
}

impl Version {
    pub fn new(major: u16, minor: u16) -> Self {
        Version { major, minor, is_set: true }
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    pub rate: u32,
    pub root_note: u8,
    pub fine_tune: i16,
    /// Frame index, inclusive.
    pub loop_start: u32,
    /// Frame index, exclusive.
    pub loop_end: u32,
    pub channel_role: ChannelRole,
    pub linked: Option<SampleIdx>,
    /// Shared so a writer that appends a freshly-written store (spec.md
    /// §4.3.2 step 6) mutates the same instance every other owner of this
    /// sample sees, with no separate splice-back step (spec.md §3.5
    /// "SampleData stays shared-owned").
    pub data: Arc<SampleData>,
    /// 16-byte DLSID, DLS/Gig only.
    pub unique_id: Option<[u8; 16]>,
    /// Proprietary wave-level chunks carried through unparsed so a writer
    /// can re-emit them verbatim (spec.md §4.4 "Writers preserve opaque
    /// proprietary byte blocks"): GIG's 60-byte sample `smpl` metadata
    /// chunk and `3gix` sample group index, keyed by chunk id.
    pub opaque_chunks: Vec<(FourCC, Vec<u8>)>,
}

impl Sample {
    pub fn frame_count(&self) -> u32 {
        self.data.frame_count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalSampleInfo {
    pub root_note: Option<u8>,
    pub fine_tune: Option<i16>,
    pub loop_start: Option<u32>,
    pub loop_end: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct InstZone {
    pub note_range: Range,
    pub velocity_range: Range,
    pub key_group: u8,
    pub layer_group: u8,
    pub phase_group: u16,
    pub channel: u8,
    /// `None` only legal as a global zone (spec.md §3.3 invariant).
    pub sample_ref: Option<SampleIdx>,
    pub local_sample_info: Option<LocalSampleInfo>,
    pub generators: GenArray,
    pub modulators: ModulatorList,
    pub params: Vec<DlsParam>,
    /// GIG's `3ewa` effect/envelope block, kept as the raw 140-byte record
    /// (spec.md §2 supplement "remaining `3ewa` fields are preserved
    /// opaquely"); [`crate::gig::effects::map_to_generators`] derives the
    /// subset the voice cache understands on demand rather than eagerly
    /// expanding it into `generators` at read time. Also holds `3ewg`/
    /// `3lnk` verbatim for zones with more than one GIG sub-region, since
    /// the common `InstZone` shape only models one sample per zone (see
    /// DESIGN.md).
    pub opaque_chunks: Vec<(FourCC, Vec<u8>)>,
    /// GIG round-robin/velocity-layer sub-regions decoded from `3lnk`
    /// (spec.md §4.4 "supports up to 32 sub-regions and 5 dimensions"),
    /// resolved to `Base::samples` indices in the same order `3lnk`'s own
    /// sample table lists them. Empty for SF2/DLS zones and for GIG zones
    /// with only the one default sub-region `sample_ref` already covers.
    pub sub_region_samples: Vec<SampleIdx>,
}

impl Default for InstZone {
    fn default() -> Self {
        InstZone {
            note_range: Range::full(),
            velocity_range: Range::full(),
            key_group: 0,
            layer_group: 0,
            phase_group: 0,
            channel: 0,
            sample_ref: None,
            local_sample_info: None,
            generators: GenArray::new(),
            modulators: ModulatorList::new(),
            params: Vec::new(),
            opaque_chunks: Vec::new(),
            sub_region_samples: Vec::new(),
        }
    }
}

impl InstZone {
    /// True for a global zone: no sample reference (spec.md §3.3).
    pub fn is_global(&self) -> bool {
        self.sample_ref.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Instrument {
    pub name: String,
    pub bank: u16,
    pub program: u8,
    pub percussion: bool,
    pub zones: Vec<InstZone>,
    pub global_generators: GenArray,
    pub global_modulators: ModulatorList,
    /// Instrument-wide DLS articulator connections (level-1 `lart`/`lar2`
    /// outside any region), analogous to an SF2 global zone but in the
    /// DLS `params` shape (spec.md §3.3 `InstZone::params[]`, generalized
    /// to the instrument level).
    pub global_params: Vec<DlsParam>,
    pub unique_id: Option<[u8; 16]>,
    /// Instrument-scoped GIG/DLS proprietary chunks preserved verbatim
    /// (`3prg`, `3ewl`).
    pub opaque_chunks: Vec<(FourCC, Vec<u8>)>,
}

impl Instrument {
    /// The zones actually contributing to synthesis, with any absorbed
    /// global zone (spec.md §3.3 "convention must be the first zone")
    /// excluded.
    pub fn sounding_zones(&self) -> impl Iterator<Item = &InstZone> {
        self.zones.iter().filter(|z| !z.is_global())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PresetZone {
    pub inst_ref: Option<InstIdx>,
    pub generators: GenArray,
    pub modulators: ModulatorList,
}

impl PresetZone {
    pub fn is_global(&self) -> bool {
        self.inst_ref.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Preset {
    pub name: String,
    pub bank: u16,
    pub program: u8,
    pub library: u32,
    pub genre: u32,
    pub morphology: u32,
    pub zones: Vec<PresetZone>,
}

impl Preset {
    pub fn sounding_zones(&self) -> impl Iterator<Item = &PresetZone> {
        self.zones.iter().filter(|z| !z.is_global())
    }

    pub fn global_zone(&self) -> Option<&PresetZone> {
        self.zones.first().filter(|z| z.is_global())
    }
}

/// The top-level container shared by SF2, DLS2, and GIG (spec.md §3.3). DLS
/// and GIG files never populate `presets` (DLS merges the preset level
/// into the instrument, per the diagram's note).
#[derive(Debug, Default)]
pub struct Base {
    pub info: HashMap<FourCC, String>,
    pub version: Version,
    pub samples: Vec<Sample>,
    pub instruments: Vec<Instrument>,
    pub presets: Vec<Preset>,
    /// 16-byte DLSID, DLS/Gig only.
    pub unique_id: Option<[u8; 16]>,
    /// File-level DLS/GIG proprietary chunks preserved verbatim (`3gri`/
    /// `3gnl`/`3gnm` sample group names, `3dnl` dimension names, `cdl `).
    pub opaque_chunks: Vec<(FourCC, Vec<u8>)>,
}

impl Base {
    pub fn new() -> Self {
        Base::default()
    }

    /// Establishes a mutual stereo link between two samples, fixing up
    /// `channel_role` to the halves implied by `(left_idx, right_idx)`
    /// order (spec.md §3.3 "A stereo link is mutual").
    pub fn link_stereo(&mut self, left_idx: SampleIdx, right_idx: SampleIdx) {
        self.samples[left_idx].channel_role = ChannelRole::Left;
        self.samples[left_idx].linked = Some(right_idx);
        self.samples[right_idx].channel_role = ChannelRole::Right;
        self.samples[right_idx].linked = Some(left_idx);
    }

    /// Finds an unused `(bank, program)` pair starting from `(bank,
    /// program)`, scanning forward through programs then banks (spec.md
    /// §3.3 "the base enforces this by searching for an unused slot").
    pub fn unused_preset_slot(&self, mut bank: u16, mut program: u8) -> (u16, u16) {
        loop {
            let taken = self.presets.iter().any(|p| p.bank == bank && p.program as u16 == program as u16);
            if !taken {
                return (bank, program as u16);
            }
            if program == 127 {
                program = 0;
                bank += 1;
            } else {
                program += 1;
            }
        }
    }

    /// Absorbs a zone found at index 0 of `zones` with no sample/instrument
    /// reference into the parent's global generator/modulator set, and
    /// removes it from the zone list (spec.md §3.3, §4.3.1 "global zone").
    pub fn absorb_global_inst_zone(zones: &mut Vec<InstZone>) -> (GenArray, ModulatorList) {
        if zones.first().map(|z| z.is_global()).unwrap_or(false) {
            let global = zones.remove(0);
            (global.generators, global.modulators)
        } else {
            (GenArray::new(), ModulatorList::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::store::{RomStore, SampleFormat};

    fn sample(name: &str) -> Sample {
        Sample {
            name: name.into(),
            rate: 44100,
            root_note: 60,
            fine_tune: 0,
            loop_start: 0,
            loop_end: 0,
            channel_role: ChannelRole::Mono,
            linked: None,
            data: Arc::new(SampleData::new(Box::new(RomStore {
                rom_offset: 0,
                format: SampleFormat::Pcm16,
                frame_count: 100,
                sample_rate: 44100,
            }))),
            unique_id: None,
            opaque_chunks: Vec::new(),
        }
    }

    #[test]
    fn stereo_link_is_mutual() {
        let mut base = Base::new();
        base.samples.push(sample("L"));
        base.samples.push(sample("R"));
        base.link_stereo(0, 1);
        assert_eq!(base.samples[0].linked, Some(1));
        assert_eq!(base.samples[1].linked, Some(0));
        assert_eq!(base.samples[0].channel_role, ChannelRole::Left);
        assert_eq!(base.samples[1].channel_role, ChannelRole::Right);
    }

    #[test]
    fn range_swaps_reversed_bounds() {
        let r = Range::new(10, 5);
        assert_eq!(r, Range { low: 5, high: 10 });
    }

    #[test]
    fn unused_preset_slot_scans_forward() {
        let mut base = Base::new();
        let mut p = Preset::default();
        p.bank = 0;
        p.program = 0;
        base.presets.push(p);
        assert_eq!(base.unused_preset_slot(0, 0), (0, 1));
    }

    #[test]
    fn global_inst_zone_is_absorbed() {
        let mut zones = vec![InstZone::default(), {
            let mut z = InstZone::default();
            z.sample_ref = Some(0);
            z
        }];
        zones[0].generators.set_scalar(generator::id::PAN, 5);
        let (gens, _) = Base::absorb_global_inst_zone(&mut zones);
        assert_eq!(zones.len(), 1);
        assert_eq!(gens.get_or(generator::id::PAN, 0), 5);
    }
}
