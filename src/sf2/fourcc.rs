//! SF2-specific chunk identifiers (spec.md §4.3.1, §6.1).

use crate::fourcc::FourCC;

pub const SFBK: FourCC = FourCC::new(b"sfbk");
pub const SDTA: FourCC = FourCC::new(b"sdta");
pub const PDTA: FourCC = FourCC::new(b"pdta");

pub const SMPL: FourCC = FourCC::new(b"smpl");
pub const SM24: FourCC = FourCC::new(b"sm24");

pub const PHDR: FourCC = FourCC::new(b"phdr");
pub const PBAG: FourCC = FourCC::new(b"pbag");
pub const PMOD: FourCC = FourCC::new(b"pmod");
pub const PGEN: FourCC = FourCC::new(b"pgen");
pub const INST: FourCC = FourCC::new(b"inst");
pub const IBAG: FourCC = FourCC::new(b"ibag");
pub const IMOD: FourCC = FourCC::new(b"imod");
pub const IGEN: FourCC = FourCC::new(b"igen");
pub const SHDR: FourCC = FourCC::new(b"shdr");

/// Fixed record sizes, in bytes (spec.md §6.1).
pub const PHDR_SIZE: usize = 38;
pub const INST_SIZE: usize = 22;
pub const SHDR_SIZE: usize = 46;
pub const BAG_SIZE: usize = 4;
pub const MOD_SIZE: usize = 10;
pub const GEN_SIZE: usize = 4;

/// `shdr.sample_type` flag bits (spec.md §6.1).
pub mod sample_type {
    pub const MONO: u16 = 1;
    pub const RIGHT: u16 = 2;
    pub const LEFT: u16 = 4;
    pub const LINKED: u16 = 8;
    pub const ROM: u16 = 0x8000;
}

/// Max payload bytes for an INFO sub-chunk id (spec.md §4.3.1, §6.1):
/// `ifil`/`iver` are 4-byte version records (not text), `ICMT` allows a
/// large comment, everything else is capped at 256.
pub fn info_max_len(id: FourCC) -> usize {
    if id == crate::fourcc::info::ICMT {
        65536
    } else {
        256
    }
}
