//! Canonical ordering of top-level properties.
//!
//! Each known head maps to a 28-bit weight. The top nibble is the
//! property's group; the low 24 bits select how the rest of the sort key
//! is derived from the list itself:
//!
//! - `0x0`: the weight itself is the key.
//! - `0x1`: the first numeric argument.
//! - `0x2`: the first numeric argument shifted left 16 bits.
//! - `0x3`: the first argument shifted left 16 bits, or-ed with the second.
//!
//! Unknown heads sort last. The sort is stable, so properties with equal
//! keys keep their original relative order.

use super::tree::{List, PlFile};

const WEIGHTS: &[(&str, u32)] = &[
    ("VTITLE", 0x0000000),
    ("DIRECTION", 0x1000000),
    ("FAMILY", 0x2000000),
    ("FACE", 0x2000000),
    ("HEADER", 0x2000001),
    ("CODINGSCHEME", 0x3000000),
    ("DESIGNSIZE", 0x4000000),
    ("DESIGNUNITS", 0x4000000),
    ("CHECKSUM", 0x5000000),
    ("SEVENBITSAFEFLAG", 0x5000000),
    ("BOUNDARYCHAR", 0x5000000),
    ("MAPFONT", 0x6000001),
    ("FONTDIMEN", 0x7000000),
    ("CODESPACE", 0x8000000),
    ("GLUEKERN", 0x9000000),
    ("LIGTABLE", 0x9000000),
    ("TYPE", 0xA000001),
    ("SUBTYPE", 0xB000003),
    ("CHARSINTYPE", 0xC000001),
    ("CHARSINSUBTYPE", 0xD000003),
    ("CHARACTER", 0xE000001),
];

const UNKNOWN_KEY: u32 = 0xFFFFFFF;

/// The canonical sort key of a top-level list.
pub fn sort_key(list: &List) -> u32 {
    let weight = match list
        .head()
        .and_then(|h| WEIGHTS.iter().find(|(name, _)| *name == h))
    {
        Some((_, w)) => *w,
        None => return UNKNOWN_KEY,
    };
    let arg = |n: usize| -> u32 {
        list.nth_value(n)
            .map(|c| c.value as u32)
            .unwrap_or_default()
    };
    let f = match weight & 0xFFFFFF {
        0x0 => return weight,
        0x1 => arg(0),
        0x2 => arg(0) << 16,
        0x3 => (arg(0) << 16) | (arg(1) & 0xFFFF),
        _ => return weight,
    };
    (weight & 0xF000000) | (f & 0xFFFFFF)
}

/// Stably sort the top-level lists into canonical order.
pub fn rearrange(file: &mut PlFile) {
    file.0.sort_by_key(sort_key);
}
