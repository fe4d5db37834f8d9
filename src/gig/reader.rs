//! GigaSampler reader (spec.md §4.4): GIG keeps the plain DLS-2 skeleton
//! (`lins`/`lrgn`/`rgn2`/`wlnk`/`ptbl`) for each region's primary wave link,
//! and layers its multi-dimension sub-region table (`3lnk`) and per-
//! sub-region effect block (`3ewa`) on top as additional chunks. Structural
//! parsing is therefore delegated wholesale to [`crate::dls::reader`] in
//! [`DlsMode::Gig`], which already preserves every chunk it doesn't
//! recognize into the matching `opaque_chunks` vector (spec.md §4.4
//! "Writers preserve opaque proprietary byte blocks") — `3lnk`/`3ewa`
//! land in `InstZone::opaque_chunks`, `3prg`/`3ewl` in
//! `Instrument::opaque_chunks`, `3gri`/`3gnl`/`3dnl` in `Base::opaque_chunks`.
//!
//! A region's `sample_ref` resolves to the *first* (default) sub-region
//! addressed by the region's own `wlnk`/`ptbl` pair, per the documented
//! "one zone = one sample" scope limit (see DESIGN.md) for synthesis
//! shape; the remaining round-robin/velocity-layer sub-regions named in
//! `3lnk`'s sample table are decoded and resolved onto
//! `InstZone::sub_region_samples` by [`crate::dls::reader::read_from`]'s
//! GIG-mode post-pass, so downstream voice resolution can still reach them.

use crate::error::Result;
use crate::file::SharedFileHandle;
use crate::riff::RiffReader;
use crate::tree::Base;

use super::fourcc::{DIMENSION_DESC_SIZE, THREE_GNM, THREE_LNK_SIZE, MAX_SUB_REGIONS};

pub fn read(file: SharedFileHandle) -> Result<Base> {
    let cursor = crate::file::SharedCursor(file.clone());
    let mut r = RiffReader::new(cursor);
    crate::dls::reader::read_from(&mut r, &file, crate::dls::reader::DlsMode::Gig)
}

/// Decodes `3lnk`'s sample-index table into pool indices, skipping the
/// `0xFFFFFFFF` padding entries (spec.md §4.4, §6.1). Returns an empty
/// vector for anything shorter than the fixed 172-byte record.
pub fn decode_3lnk_sample_table(raw: &[u8]) -> Vec<u32> {
    if raw.len() < THREE_LNK_SIZE {
        return Vec::new();
    }
    let dim_count = raw[4] as usize;
    let table_start = 8 + dim_count.min(super::fourcc::MAX_DIMENSIONS) * DIMENSION_DESC_SIZE;
    let mut out = Vec::new();
    for i in 0..MAX_SUB_REGIONS {
        let off = table_start + i * 4;
        if off + 4 > raw.len() {
            break;
        }
        let idx = u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]]);
        if idx != 0xFFFF_FFFF {
            out.push(idx);
        }
    }
    out
}

/// Reads the sample-group names out of a `3gnl` list's raw bytes
/// (each a `3gnm` leaf holding a NUL-terminated name).
pub fn decode_sample_group_names(raw: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut pos = 0usize;
    while pos + 8 <= raw.len() {
        let id = crate::fourcc::FourCC::new(&[raw[pos], raw[pos + 1], raw[pos + 2], raw[pos + 3]]);
        let size = u32::from_le_bytes([raw[pos + 4], raw[pos + 5], raw[pos + 6], raw[pos + 7]]) as usize;
        let data_start = pos + 8;
        let data_end = (data_start + size).min(raw.len());
        if id == THREE_GNM {
            let bytes = &raw[data_start..data_end];
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            names.push(String::from_utf8_lossy(&bytes[..end]).into_owned());
        }
        pos = data_end + (size % 2);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_3lnk_block_decodes_to_nothing() {
        assert!(decode_3lnk_sample_table(&[]).is_empty());
    }

    #[test]
    fn decodes_padded_sample_table() {
        let mut raw = vec![0u8; THREE_LNK_SIZE];
        raw[4] = 0; // no dimensions
        raw[8..12].copy_from_slice(&3u32.to_le_bytes());
        for entry in raw[12..].chunks_mut(4) {
            entry.copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        }
        let table = decode_3lnk_sample_table(&raw);
        assert_eq!(table, vec![3]);
    }
}
