//! SF2 generators (spec.md §3.4): a fixed-size array of 60 16-bit values,
//! each either a plain scalar or a `(low, high)` range, plus a bitset
//! tracking which indices are explicitly set.

use std::fmt;

/// Number of generator slots in a [`GenArray`] (SF2 defines ids 0..=58,
/// with 59 reserved as a sentinel/terminator).
pub const NUM_GENERATORS: usize = 60;

/// Generator ids used by the SF2 reader/writer and voice cache. Named per
/// the SF2 2.04 specification; not exhaustive of every "reservedN" slot,
/// but every id the reader/writer/voice-cache actually branch on is here.
pub mod id {
    pub const START_ADDRS_OFFSET: u16 = 0;
    pub const END_ADDRS_OFFSET: u16 = 1;
    pub const STARTLOOP_ADDRS_OFFSET: u16 = 2;
    pub const ENDLOOP_ADDRS_OFFSET: u16 = 3;
    pub const START_ADDRS_COARSE_OFFSET: u16 = 4;
    pub const MOD_LFO_TO_PITCH: u16 = 5;
    pub const VIB_LFO_TO_PITCH: u16 = 6;
    pub const MOD_ENV_TO_PITCH: u16 = 7;
    pub const INITIAL_FILTER_FC: u16 = 8;
    pub const INITIAL_FILTER_Q: u16 = 9;
    pub const MOD_LFO_TO_FILTER_FC: u16 = 10;
    pub const MOD_ENV_TO_FILTER_FC: u16 = 11;
    pub const END_ADDRS_COARSE_OFFSET: u16 = 12;
    pub const MOD_LFO_TO_VOLUME: u16 = 13;
    pub const CHORUS_EFFECTS_SEND: u16 = 15;
    pub const REVERB_EFFECTS_SEND: u16 = 16;
    pub const PAN: u16 = 17;
    pub const DELAY_MOD_LFO: u16 = 21;
    pub const FREQ_MOD_LFO: u16 = 22;
    pub const DELAY_VIB_LFO: u16 = 23;
    pub const FREQ_VIB_LFO: u16 = 24;
    pub const DELAY_MOD_ENV: u16 = 25;
    pub const ATTACK_MOD_ENV: u16 = 26;
    pub const HOLD_MOD_ENV: u16 = 27;
    pub const DECAY_MOD_ENV: u16 = 28;
    pub const SUSTAIN_MOD_ENV: u16 = 29;
    pub const RELEASE_MOD_ENV: u16 = 30;
    pub const KEYNUM_TO_MOD_ENV_HOLD: u16 = 31;
    pub const KEYNUM_TO_MOD_ENV_DECAY: u16 = 32;
    pub const DELAY_VOL_ENV: u16 = 33;
    pub const ATTACK_VOL_ENV: u16 = 34;
    pub const HOLD_VOL_ENV: u16 = 35;
    pub const DECAY_VOL_ENV: u16 = 36;
    pub const SUSTAIN_VOL_ENV: u16 = 37;
    pub const RELEASE_VOL_ENV: u16 = 38;
    pub const KEYNUM_TO_VOL_ENV_HOLD: u16 = 39;
    pub const KEYNUM_TO_VOL_ENV_DECAY: u16 = 40;
    /// Preset-zone-only: pool index of the referenced instrument.
    pub const INSTRUMENT_ID: u16 = 41;
    pub const KEY_RANGE: u16 = 43;
    pub const VEL_RANGE: u16 = 44;
    pub const STARTLOOP_ADDRS_COARSE_OFFSET: u16 = 45;
    pub const KEYNUM: u16 = 46;
    pub const VELOCITY: u16 = 47;
    pub const INITIAL_ATTENUATION: u16 = 48;
    pub const ENDLOOP_ADDRS_COARSE_OFFSET: u16 = 50;
    pub const COARSE_TUNE: u16 = 51;
    pub const FINE_TUNE: u16 = 52;
    /// Instrument-zone-only: pool index of the referenced sample.
    pub const SAMPLE_ID: u16 = 53;
    pub const SAMPLE_MODES: u16 = 54;
    pub const SCALE_TUNING: u16 = 56;
    pub const EXCLUSIVE_CLASS: u16 = 57;
    pub const OVERRIDING_ROOT_KEY: u16 = 58;
}

/// True if `gen_id` packs two bytes `(low, high)` rather than a plain
/// scalar (spec.md §3.4).
pub fn is_range_generator(gen_id: u16) -> bool {
    matches!(gen_id, id::KEY_RANGE | id::VEL_RANGE)
}

/// True if `gen_id` is legal on a preset zone.
pub fn valid_at_preset(gen_id: u16) -> bool {
    (gen_id as usize) < NUM_GENERATORS && gen_id != id::SAMPLE_ID
}

/// True if `gen_id` is legal on an instrument zone.
pub fn valid_at_instrument(gen_id: u16) -> bool {
    (gen_id as usize) < NUM_GENERATORS && gen_id != id::INSTRUMENT_ID
}

/// A generator's value: either a signed scalar or an inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenAmount {
    Scalar(i16),
    Range { low: u8, high: u8 },
}

impl GenAmount {
    pub fn to_raw(self) -> i16 {
        match self {
            GenAmount::Scalar(v) => v,
            GenAmount::Range { low, high } => (low as i16) | ((high as i16) << 8),
        }
    }

    pub fn from_raw(gen_id: u16, raw: i16) -> Self {
        if is_range_generator(gen_id) {
            let bytes = (raw as u16).to_le_bytes();
            GenAmount::Range { low: bytes[0], high: bytes[1] }
        } else {
            GenAmount::Scalar(raw)
        }
    }

    pub fn as_scalar(self) -> Option<i16> {
        match self {
            GenAmount::Scalar(v) => Some(v),
            GenAmount::Range { .. } => None,
        }
    }

    pub fn as_range(self) -> Option<(u8, u8)> {
        match self {
            GenAmount::Range { low, high } => Some((low, high)),
            GenAmount::Scalar(_) => None,
        }
    }
}

/// A fixed 60-slot array of generator values with an explicit "is set"
/// bitset (spec.md §3.4).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GenArray {
    values: [i16; NUM_GENERATORS],
    set_mask: u64,
}

impl Default for GenArray {
    fn default() -> Self {
        GenArray { values: [0; NUM_GENERATORS], set_mask: 0 }
    }
}

impl GenArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self, gen_id: u16) -> bool {
        (gen_id as usize) < NUM_GENERATORS && (self.set_mask & (1u64 << gen_id)) != 0
    }

    pub fn get(&self, gen_id: u16) -> Option<GenAmount> {
        if self.is_set(gen_id) {
            Some(GenAmount::from_raw(gen_id, self.values[gen_id as usize]))
        } else {
            None
        }
    }

    pub fn get_or(&self, gen_id: u16, default: i16) -> i16 {
        if self.is_set(gen_id) {
            self.values[gen_id as usize]
        } else {
            default
        }
    }

    pub fn set(&mut self, gen_id: u16, amount: GenAmount) {
        assert!((gen_id as usize) < NUM_GENERATORS, "generator id out of range");
        self.values[gen_id as usize] = amount.to_raw();
        self.set_mask |= 1u64 << gen_id;
    }

    pub fn set_scalar(&mut self, gen_id: u16, value: i16) {
        self.set(gen_id, GenAmount::Scalar(value));
    }

    pub fn set_range(&mut self, gen_id: u16, low: u8, high: u8) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        self.set(gen_id, GenAmount::Range { low, high });
    }

    pub fn unset(&mut self, gen_id: u16) {
        if (gen_id as usize) < NUM_GENERATORS {
            self.set_mask &= !(1u64 << gen_id);
            self.values[gen_id as usize] = 0;
        }
    }

    /// Iterates `(id, amount)` pairs for every explicitly-set generator, in
    /// ascending id order.
    pub fn iter_set(&self) -> impl Iterator<Item = (u16, GenAmount)> + '_ {
        (0..NUM_GENERATORS as u16).filter(move |&id| self.is_set(id)).map(move |id| {
            (id, GenAmount::from_raw(id, self.values[id as usize]))
        })
    }

    pub fn len_set(&self) -> u32 {
        self.set_mask.count_ones()
    }

    /// Adds `other`'s *scalar* generators onto `self` (SF2 preset-over-
    /// instrument additive offset rule, spec.md §4.5 step 1c). Range
    /// generators are left to the caller to intersect explicitly.
    pub fn add_scalars_from(&mut self, other: &GenArray) {
        for (id, amount) in other.iter_set() {
            if is_range_generator(id) {
                continue;
            }
            if let GenAmount::Scalar(delta) = amount {
                let base = self.get_or(id, 0);
                self.set_scalar(id, base.saturating_add(delta));
            }
        }
    }

    /// Overwrites `self` with every generator explicitly set in `other`.
    pub fn overlay_from(&mut self, other: &GenArray) {
        for (id, amount) in other.iter_set() {
            self.set(id, amount);
        }
    }
}

impl fmt::Debug for GenArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter_set().map(|(id, a)| (id, a))).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_packs_and_unpacks() {
        let mut g = GenArray::new();
        g.set_range(id::KEY_RANGE, 10, 5); // reversed on purpose
        assert_eq!(g.get(id::KEY_RANGE).unwrap().as_range(), Some((5, 10)));
    }

    #[test]
    fn overlay_and_additive_offset() {
        let mut inst = GenArray::new();
        inst.set_scalar(id::INITIAL_ATTENUATION, 100);

        let mut preset = GenArray::new();
        preset.set_scalar(id::INITIAL_ATTENUATION, 10);

        let mut voice = inst;
        voice.add_scalars_from(&preset);
        assert_eq!(voice.get_or(id::INITIAL_ATTENUATION, 0), 110);
    }

    #[test]
    fn unset_generators_report_none() {
        let g = GenArray::new();
        assert!(g.get(id::PAN).is_none());
        assert_eq!(g.get_or(id::PAN, 42), 42);
    }
}
