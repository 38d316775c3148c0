//! The Japanese character encoding boundary.
//!
//! Character atoms travel through the tree as external byte strings;
//! cooked `K` numbers and charlist members hold internal codepoints.
//! [`chr`] and [`ord`] convert between the two, returning `None` for
//! anything that does not round-trip.
//!
//! JIS, EUC-JP and Shift-JIS relate to the JIS 0208 code space by pure
//! byte arithmetic, and UTF-8 relates to Unicode the same way. Crossing
//! between the JIS side and the Unicode side needs a character table,
//! which is supplied externally through [`CharMap`].

use crate::Config;

/// The external (byte-side) encodings.
///
/// At this level JIS and EUC-JP coincide: the tokenizer has already
/// transposed JIS shift-envelope payloads into the high-bit range. The
/// private `XJis` mode additionally pins the codepoint side to raw JIS
/// codes so that tool output can be post-processed without re-decoding.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum External {
    Jis,
    EucJp,
    ShiftJis,
    Utf8,
    XJis,
}

/// The internal (codepoint-side) encodings.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Internal {
    Jis0208,
    Unicode,
}

/// A JIS 0208 <-> Unicode character table.
pub trait CharMap {
    fn unicode_of(&self, jis: u16) -> Option<u32>;
    fn jis_of(&self, unicode: u32) -> Option<u16>;
}

fn valid_jis(v: u32) -> Option<(u8, u8)> {
    let hi = (v >> 8) as u8;
    let lo = (v & 0xFF) as u8;
    if v <= 0xFFFF && (0x21..=0x7E).contains(&hi) && (0x21..=0x7E).contains(&lo) {
        Some((hi, lo))
    } else {
        None
    }
}

/// The internal codepoint space in effect: `XJis` forces raw JIS codes
/// regardless of the configured internal encoding.
fn internal(cfg: &Config) -> Internal {
    if cfg.external_enc == External::XJis {
        Internal::Jis0208
    } else {
        cfg.internal_enc
    }
}

fn jis_code_of(cfg: &Config, v: u32) -> Option<(u8, u8)> {
    match internal(cfg) {
        Internal::Jis0208 => valid_jis(v),
        Internal::Unicode => {
            let jis = cfg.char_map.as_ref()?.jis_of(v)?;
            valid_jis(jis as u32)
        }
    }
}

fn from_jis_code(cfg: &Config, hi: u8, lo: u8) -> Option<u32> {
    let jis = ((hi as u32) << 8) | lo as u32;
    valid_jis(jis)?;
    match internal(cfg) {
        Internal::Jis0208 => Some(jis),
        Internal::Unicode => cfg.char_map.as_ref()?.unicode_of(jis as u16),
    }
}

/// The external byte string encoding the internal codepoint `v`, or
/// `None` if `v` is not representable.
pub fn chr(cfg: &Config, v: u32) -> Option<Vec<u8>> {
    if v < 0x80 {
        return Some(vec![v as u8]);
    }
    match cfg.external_enc {
        External::Jis | External::EucJp | External::XJis => {
            let (hi, lo) = jis_code_of(cfg, v)?;
            Some(vec![hi | 0x80, lo | 0x80])
        }
        External::ShiftJis => {
            let (hi, lo) = jis_code_of(cfg, v)?;
            Some(jis_to_sjis(hi, lo).to_vec())
        }
        External::Utf8 => {
            let u = match internal(cfg) {
                Internal::Unicode => v,
                Internal::Jis0208 => {
                    cfg.char_map.as_ref()?.unicode_of(u16::try_from(v).ok()?)?
                }
            };
            let c = char::from_u32(u)?;
            let mut buf = [0_u8; 4];
            Some(c.encode_utf8(&mut buf).as_bytes().to_vec())
        }
    }
}

/// The inverse of [`chr`].
pub fn ord(cfg: &Config, bytes: &[u8]) -> Option<u32> {
    if let [u @ 0..=0x7F] = bytes {
        return Some(*u as u32);
    }
    match cfg.external_enc {
        External::Jis | External::EucJp | External::XJis => match bytes {
            [b0 @ 0xA1..=0xFE, b1 @ 0xA1..=0xFE] => {
                from_jis_code(cfg, b0 & 0x7F, b1 & 0x7F)
            }
            _ => None,
        },
        External::ShiftJis => {
            let (hi, lo) = sjis_to_jis(bytes)?;
            from_jis_code(cfg, hi, lo)
        }
        External::Utf8 => {
            let s = std::str::from_utf8(bytes).ok()?;
            let mut chars = s.chars();
            let c = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            match internal(cfg) {
                Internal::Unicode => Some(c as u32),
                Internal::Jis0208 => {
                    cfg.char_map.as_ref()?.jis_of(c as u32).map(u32::from)
                }
            }
        }
    }
}

fn jis_to_sjis(hi: u8, lo: u8) -> [u8; 2] {
    let mut s1 = ((hi - 0x21) >> 1) + 0x81;
    if s1 > 0x9F {
        s1 += 0x40;
    }
    let s2 = if hi % 2 == 1 {
        lo + 0x1F + if lo >= 0x60 { 1 } else { 0 }
    } else {
        lo + 0x7E
    };
    [s1, s2]
}

fn sjis_to_jis(bytes: &[u8]) -> Option<(u8, u8)> {
    let [s1, s2] = *bytes else {
        return None;
    };
    let row = match s1 {
        0x81..=0x9F => s1 - 0x81,
        0xE0..=0xEF => s1 - 0xC1,
        _ => return None,
    };
    let (hi, lo) = if s2 >= 0x9F {
        (row * 2 + 0x22, s2 - 0x7E)
    } else {
        let adj = if s2 >= 0x80 { 1 } else { 0 };
        match s2 {
            0x40..=0x7E | 0x80..=0x9E => (row * 2 + 0x21, s2 - 0x1F - adj),
            _ => return None,
        }
    };
    Some((hi, lo))
}
