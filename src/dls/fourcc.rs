//! DLS-2 chunk identifiers and fixed record sizes (spec.md §4.4, §6.1).

use crate::fourcc::FourCC;

pub const DLS_FORM: FourCC = FourCC::new(b"DLS ");

pub const CDL: FourCC = FourCC::new(b"cdl ");
pub const DLID: FourCC = FourCC::new(b"dlid");
pub const VERS: FourCC = FourCC::new(b"vers");
pub const PTBL: FourCC = FourCC::new(b"ptbl");

/// `LIST` form id for the instrument list.
pub const LINS: FourCC = FourCC::new(b"lins");
/// `LIST` form id for one instrument.
pub const INS: FourCC = FourCC::new(b"ins ");
pub const INSH: FourCC = FourCC::new(b"insh");

/// `LIST` form id for a region list.
pub const LRGN: FourCC = FourCC::new(b"lrgn");
/// `LIST` form id for one region (non-layered).
pub const RGN: FourCC = FourCC::new(b"rgn ");
/// `LIST` form id for a region with a layer field in `rgnh`.
pub const RGN2: FourCC = FourCC::new(b"rgn2");
pub const RGNH: FourCC = FourCC::new(b"rgnh");
pub const WLNK: FourCC = FourCC::new(b"wlnk");
pub const WSMP: FourCC = FourCC::new(b"wsmp");

/// `LIST` form id for the articulator list (level-1 connection blocks).
pub const LART: FourCC = FourCC::new(b"lart");
/// `LIST` form id for the level-2 articulator list.
pub const LAR2: FourCC = FourCC::new(b"lar2");
pub const ART1: FourCC = FourCC::new(b"art1");
pub const ART2: FourCC = FourCC::new(b"art2");

/// `LIST` form id for the wave pool.
pub const WVPL: FourCC = FourCC::new(b"wvpl");
/// `LIST` form id for one wave.
pub const WAVE: FourCC = FourCC::new(b"wave");
pub const FMT: FourCC = FourCC::new(b"fmt ");
pub const DATA: FourCC = FourCC::new(b"data");
/// The standard RIFF synth-loop chunk (distinct from GIG's larger
/// sample-metadata `smpl`, which this crate keys identically but never
/// confuses with SF2's `smpl` sample-data chunk — different module).
pub const SMPL: FourCC = FourCC::new(b"smpl");

/// Fixed record/header sizes, in bytes (spec.md §6.1).
pub const INSH_SIZE: usize = 12;
pub const RGNH_SIZE: usize = 12;
pub const RGNH_LAYER_SIZE: usize = 14;
pub const WLNK_SIZE: usize = 12;
pub const WSMP_HEADER_SIZE: usize = 20;
pub const WSMP_LOOP_SIZE: usize = 16;
pub const ART_HEADER_SIZE: usize = 8;
pub const CONNECTION_SIZE: usize = 12;
pub const PTBL_HEADER_SIZE: usize = 8;
pub const POOL_CUE_SIZE: usize = 4;
pub const FMT_SIZE: usize = 16;

/// `insh.ulBank` bit 31 marks a percussion instrument; the real bank
/// number is masked with `0x3FFF` (spec.md §2 supplement, `IpatchDLSReader.c`).
pub const PERCUSSION_BIT: u32 = 0x8000_0000;
pub const BANK_MASK: u32 = 0x3FFF;

/// `wsmp.ulLoopType` values.
pub mod loop_type {
    pub const FORWARD: u32 = 0;
    pub const RELEASE: u32 = 1;
}

/// `wsmp.fulOptions` bits.
pub mod wsmp_options {
    pub const NO_TRUNCATION: u32 = 1;
    pub const NO_COMPRESSION: u32 = 2;
}
