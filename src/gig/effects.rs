//! Mapping from GIG's `3ewa` effect/envelope block to SF2 generators
//! (spec.md §2 supplement, §4.4). `3ewa` carries GigaStudio's own DSP model
//! (three LFOs, two envelope generators, a resonant filter); only the
//! subset with a direct SF2 generator equivalent is translated here. The
//! voice cache calls this on demand rather than the reader expanding it
//! eagerly, so the raw block stays available in [`crate::tree::InstZone::opaque_chunks`]
//! for a writer to re-emit verbatim.

use crate::tree::generator::{id, GenArray};

const LFO3_FREQUENCY: usize = 0;
const EG3_ATTACK: usize = 4;
const LFO1_INTERNAL_DEPTH: usize = 8;
const LFO3_INTERNAL_DEPTH: usize = 10;
const LFO1_CONTROL_DEPTH: usize = 12;
const LFO3_CONTROL_DEPTH: usize = 14;
const EG1_ATTACK: usize = 16;
const EG1_DECAY1: usize = 20;
const EG1_SUSTAIN: usize = 24;
const EG1_RELEASE: usize = 28;
const EG1_HOLD: usize = 48;
const VCF_CUTOFF: usize = 52;
const VCF_RESONANCE: usize = 56;
const PAN_OFFSET: usize = 60;
const EG2_ATTACK: usize = 64;
const EG2_DECAY1: usize = 68;
const EG2_SUSTAIN: usize = 72;
const EG2_RELEASE: usize = 76;

fn read_i32(raw: &[u8], offset: usize) -> Option<i32> {
    raw.get(offset..offset + 4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_i16(raw: &[u8], offset: usize) -> Option<i16> {
    raw.get(offset..offset + 2).map(|b| i16::from_le_bytes([b[0], b[1]]))
}

/// Translates a raw `3ewa` block into the SF2 generators it has a direct
/// equivalent for. Fields this function doesn't recognize (the LFO depth/
/// rate controls, the secondary envelope's delay/hold stages, controller
/// routing) are left to the opaque copy; an empty or truncated `raw` slice
/// yields an empty `GenArray` rather than an error, since a malformed
/// effect block shouldn't abort the whole region.
pub fn map_to_generators(raw: &[u8]) -> GenArray {
    let mut gens = GenArray::new();

    if let Some(v) = read_i32(raw, EG1_ATTACK) {
        gens.set_scalar(id::ATTACK_VOL_ENV, time_to_timecents(v));
    }
    if let Some(v) = read_i32(raw, EG1_HOLD) {
        gens.set_scalar(id::HOLD_VOL_ENV, time_to_timecents(v));
    }
    if let Some(v) = read_i32(raw, EG1_DECAY1) {
        gens.set_scalar(id::DECAY_VOL_ENV, time_to_timecents(v));
    }
    if let Some(v) = read_i32(raw, EG1_SUSTAIN) {
        gens.set_scalar(id::SUSTAIN_VOL_ENV, percent_to_centibels(v));
    }
    if let Some(v) = read_i32(raw, EG1_RELEASE) {
        gens.set_scalar(id::RELEASE_VOL_ENV, time_to_timecents(v));
    }

    if let Some(v) = read_i32(raw, EG2_ATTACK) {
        gens.set_scalar(id::ATTACK_MOD_ENV, time_to_timecents(v));
    }
    if let Some(v) = read_i32(raw, EG2_DECAY1) {
        gens.set_scalar(id::DECAY_MOD_ENV, time_to_timecents(v));
    }
    if let Some(v) = read_i32(raw, EG2_SUSTAIN) {
        gens.set_scalar(id::SUSTAIN_MOD_ENV, percent_to_centibels(v));
    }
    if let Some(v) = read_i32(raw, EG2_RELEASE) {
        gens.set_scalar(id::RELEASE_MOD_ENV, time_to_timecents(v));
    }

    if let Some(v) = read_i32(raw, VCF_CUTOFF) {
        gens.set_scalar(id::INITIAL_FILTER_FC, hz_to_cents(v));
    }
    if let Some(v) = read_i16(raw, VCF_RESONANCE) {
        gens.set_scalar(id::INITIAL_FILTER_Q, v);
    }
    if let Some(v) = read_i16(raw, PAN_OFFSET) {
        gens.set_scalar(id::PAN, v);
    }

    let _ = (LFO3_FREQUENCY, EG3_ATTACK, LFO1_INTERNAL_DEPTH, LFO3_INTERNAL_DEPTH, LFO1_CONTROL_DEPTH, LFO3_CONTROL_DEPTH);
    gens
}

/// GigaStudio envelope times are stored as milliseconds; SF2 envelope
/// generators want timecents (`1200 * log2(seconds)`).
fn time_to_timecents(ms: i32) -> i16 {
    let seconds = (ms.max(1) as f64) / 1000.0;
    (1200.0 * seconds.log2()).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// GigaStudio sustain is a 0..=1000 permille level; SF2 sustain is an
/// attenuation in centibels from full scale.
fn percent_to_centibels(permille: i32) -> i16 {
    let level = (permille.clamp(0, 1000) as f64) / 1000.0;
    if level <= 0.0 {
        1000
    } else {
        (-200.0 * level.log10()).round().clamp(0.0, 1000.0) as i16
    }
}

/// GigaStudio filter cutoff is stored in Hz; SF2 wants absolute cents
/// referenced to 8.176 Hz.
fn hz_to_cents(hz: i32) -> i16 {
    let hz = hz.max(1) as f64;
    (1200.0 * (hz / 8.176).log2()).round().clamp(0.0, 20000.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Vec<u8> {
        let mut b = vec![0u8; super::super::fourcc::THREE_EWA_SIZE];
        b[EG1_ATTACK..EG1_ATTACK + 4].copy_from_slice(&100i32.to_le_bytes());
        b[EG1_SUSTAIN..EG1_SUSTAIN + 4].copy_from_slice(&1000i32.to_le_bytes());
        b[VCF_RESONANCE..VCF_RESONANCE + 2].copy_from_slice(&5i16.to_le_bytes());
        b
    }

    #[test]
    fn maps_recognized_fields() {
        let gens = map_to_generators(&block());
        assert!(gens.is_set(id::ATTACK_VOL_ENV));
        assert_eq!(gens.get_or(id::SUSTAIN_VOL_ENV, -1), 0);
        assert_eq!(gens.get_or(id::INITIAL_FILTER_Q, 0), 5);
    }

    #[test]
    fn truncated_block_is_not_an_error() {
        let gens = map_to_generators(&[]);
        assert_eq!(gens.len_set(), 0);
    }
}
