//! FOURCC chunk identifiers.
//!
//! A FOURCC is four ASCII bytes packed little-endian into a `u32`, used
//! throughout RIFF/DLS/SF2/GIG as chunk and form identifiers.

use std::fmt;

/// A four-character chunk/form identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        FourCC(*bytes)
    }

    pub fn from_u32_le(v: u32) -> Self {
        FourCC(v.to_le_bytes())
    }

    pub fn to_u32_le(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({:?})", self.as_str())
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(value: &[u8; 4]) -> Self {
        FourCC(*value)
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        FourCC(value)
    }
}

/// Declares a `pub const NAME: FourCC` table entry. Mirrors the way the
/// teacher groups its known-magic constants (`SWDLHeader::magicn`, etc.)
/// but collects them as a flat namespace per spec.md §6.1.
macro_rules! fourccs {
    ($($name:ident = $bytes:literal;)*) => {
        $(
            pub const $name: FourCC = FourCC::new($bytes);
        )*
    };
}

/// Generic RIFF-level identifiers shared by SF2, DLS and GIG.
pub mod riff {
    use super::FourCC;
    fourccs! {
        RIFF = b"RIFF";
        LIST = b"LIST";
        INFO = b"INFO";
    }
}

/// Shared `INFO` sub-chunk ids (spec.md §6.1 "DLS info IDs (shared with RIFF INFO)").
pub mod info {
    use super::FourCC;
    fourccs! {
        IARL = b"IARL";
        IART = b"IART";
        ICMS = b"ICMS";
        ICMT = b"ICMT";
        ICOP = b"ICOP";
        ICRD = b"ICRD";
        IENG = b"IENG";
        IGNR = b"IGNR";
        IKEY = b"IKEY";
        IMED = b"IMED";
        INAM = b"INAM";
        IPRD = b"IPRD";
        ISBJ = b"ISBJ";
        ISFT = b"ISFT";
        ISRC = b"ISRC";
        ISRF = b"ISRF";
        ITCH = b"ITCH";
        IFIL = b"ifil";
        IVER = b"iver";
        ISNG = b"isng";
        IROM = b"irom";
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u32() {
        let f = FourCC::new(b"RIFF");
        assert_eq!(FourCC::from_u32_le(f.to_u32_le()), f);
    }

    #[test]
    fn displays_as_ascii() {
        assert_eq!(riff::RIFF.to_string(), "RIFF");
        assert_eq!(info::ICMT.to_string(), "ICMT");
    }
}
