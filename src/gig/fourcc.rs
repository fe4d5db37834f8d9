//! GigaSampler chunk identifiers, layered over DLS-2 (spec.md §4.4, §6.1).

use crate::fourcc::FourCC;

/// `LIST` form id for a sub-region's extra parameter list.
pub const LIST_3PRG: FourCC = FourCC::new(b"3prg");
/// `LIST` form id for a sub-region's wave-link additions.
pub const LIST_3EWL: FourCC = FourCC::new(b"3ewl");

/// Dimension-region table: sub-region count, dimension descriptors, and the
/// sample-index table (172 bytes, spec.md §4.4).
pub const THREE_LNK: FourCC = FourCC::new(b"3lnk");
/// Effect/envelope block layered on a sub-region (140 bytes).
pub const THREE_EWA: FourCC = FourCC::new(b"3ewa");
/// Dimension name list.
pub const THREE_DNL: FourCC = FourCC::new(b"3dnl");
/// `LIST` form id for the file-level sample-group table.
pub const LIST_3GRI: FourCC = FourCC::new(b"3gri");
/// `LIST` form id for the sample-group name list inside `3gri`.
pub const LIST_3GNL: FourCC = FourCC::new(b"3gnl");
/// One sample group's name.
pub const THREE_GNM: FourCC = FourCC::new(b"3gnm");
/// Wave-level sample-group index.
pub const THREE_GIX: FourCC = FourCC::new(b"3gix");

pub const THREE_LNK_SIZE: usize = 172;
pub const THREE_EWA_SIZE: usize = 140;
pub const MAX_DIMENSIONS: usize = 5;
pub const MAX_SUB_REGIONS: usize = 32;
pub const DIMENSION_DESC_SIZE: usize = 8;

/// Chunk/form ids that only ever occur in a GIG file; seeing one while
/// reading in plain-DLS mode means the file was misidentified and the
/// caller must restart in GIG mode (spec.md §4.4, §9, Scenario E).
pub fn is_gig_only(id: FourCC) -> bool {
    id == LIST_3PRG
        || id == LIST_3EWL
        || id == THREE_LNK
        || id == THREE_EWA
        || id == THREE_DNL
        || id == LIST_3GRI
        || id == LIST_3GNL
        || id == THREE_GNM
        || id == THREE_GIX
}
