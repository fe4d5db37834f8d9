//! GigaSampler writer (spec.md §4.4): the DLS-2 skeleton GIG layers its
//! dimension chunks over is written identically either way, and every
//! GIG-specific chunk (`3lnk`, `3ewa`, `3prg`, `3ewl`, `3gri`/`3gnl`/`3dnl`)
//! already rode through the reader as a verbatim `opaque_chunks` entry
//! (spec.md §4.4 "Writers preserve opaque proprietary byte blocks"), so
//! [`crate::dls::writer`] reproduces them without any GIG-specific
//! handling here.

use std::io::{Seek, Write};

use crate::error::Result;
use crate::tree::Base;

pub fn write<W: Write + Seek>(base: &Base, out: W) -> Result<()> {
    crate::dls::writer::write(base, out)
}
