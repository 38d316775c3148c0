//! The typed numeric prefixes of property list files.
//!
//! A number in a property list is written as a one-letter prefix followed
//! by a token, e.g. `O 7777` or `R -0.25`. Each prefix has its own token
//! grammar and legal range; on emission a value that no longer fits its
//! prefix is re-emitted under a fallback prefix instead.

use crate::{jcode, Config, Number};

/// The numeric prefixes.
///
/// `I` never appears in a file: it is an alias that resolves to `O` or
/// `H` at emission time, depending on [`Config::prefer_hex`] and
/// [`Config::forced_prefix`].
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Prefix {
    /// A printable character, e.g. `C A`.
    C,
    /// A Japanese character in the external encoding, e.g. `K あ`.
    K,
    /// An unsigned decimal no larger than 255.
    D,
    /// A three-letter face code, e.g. `F MIE`.
    F,
    /// An unsigned octal number.
    O,
    /// An unsigned hexadecimal number.
    H,
    /// The octal-or-hexadecimal alias.
    I,
    /// A real number, scaled to 2^20 fixed point.
    R,
}

impl Prefix {
    /// The prefixes that start a cooked number when they appear as a
    /// standalone token. `I` is deliberately absent.
    pub fn from_char(c: char) -> Option<Prefix> {
        match c {
            'C' | 'c' => Some(Prefix::C),
            'K' | 'k' => Some(Prefix::K),
            'D' | 'd' => Some(Prefix::D),
            'F' | 'f' => Some(Prefix::F),
            'O' | 'o' => Some(Prefix::O),
            'H' | 'h' => Some(Prefix::H),
            'R' | 'r' => Some(Prefix::R),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Prefix::C => 'C',
            Prefix::K => 'K',
            Prefix::D => 'D',
            Prefix::F => 'F',
            Prefix::O => 'O',
            Prefix::H => 'H',
            Prefix::I => 'I',
            Prefix::R => 'R',
        }
    }
}

/// Error produced by the number codec.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum NumberError {
    /// The token does not match the prefix's grammar.
    Malformed { prefix: Prefix, token: String },
    /// The token parsed but the value is outside the prefix's range.
    OutOfRange { prefix: Prefix, value: i64 },
    /// A real value fell outside the signed 32-bit fixed-point domain.
    /// Unlike the other conditions this has no fallback prefix.
    RealOutOfDomain { value: i64 },
}

impl std::error::Error for NumberError {}

impl std::fmt::Display for NumberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberError::Malformed { prefix, token } => {
                write!(f, "`{token}` is not a valid `{}` token", prefix.to_char())
            }
            NumberError::OutOfRange { prefix, value } => {
                write!(f, "{value} is out of range for prefix `{}`", prefix.to_char())
            }
            NumberError::RealOutOfDomain { value } => {
                write!(f, "{value} is outside the fixed-point domain")
            }
        }
    }
}

fn is_word_byte(u: u8) -> bool {
    u.is_ascii_alphanumeric() || u == b'_'
}

/// Parse a token under the given prefix.
///
/// The token is held as one byte per char; see [`super::lexer`].
pub fn parse(prefix: Prefix, token: &str, cfg: &Config) -> Result<i64, NumberError> {
    let malformed = || NumberError::Malformed {
        prefix,
        token: token.into(),
    };
    let check_range = |value: i64, max: i64| {
        let max = if cfg.free_number { u32::MAX as i64 } else { max };
        if value <= max {
            Ok(value)
        } else {
            Err(NumberError::OutOfRange { prefix, value })
        }
    };
    match prefix {
        Prefix::C => {
            let mut chars = token.chars();
            let c = chars.next().ok_or_else(malformed)?;
            if chars.next().is_some() || c as u32 > 0xFF {
                return Err(malformed());
            }
            if !is_word_byte(c as u8) && !cfg.free_number {
                return Err(malformed());
            }
            Ok(c as i64)
        }
        Prefix::K => {
            let bytes = super::lexer::chars_to_bytes(token).ok_or_else(malformed)?;
            let v = jcode::ord(cfg, &bytes).ok_or_else(malformed)?;
            // Only round-trippable characters are accepted.
            match jcode::chr(cfg, v) {
                Some(back) if back == bytes => Ok(v as i64),
                _ => Err(malformed()),
            }
        }
        Prefix::D => {
            let value = parse_radix(token, 10).ok_or_else(malformed)?;
            check_range(value, 255)
        }
        Prefix::F => {
            let b = token.as_bytes();
            if b.len() != 3 {
                return Err(malformed());
            }
            let weight = match b[0].to_ascii_uppercase() {
                b'M' => 0,
                b'B' => 2,
                b'L' => 4,
                _ => return Err(malformed()),
            };
            let slope = match b[1].to_ascii_uppercase() {
                b'R' => 0,
                b'I' => 1,
                _ => return Err(malformed()),
            };
            let expansion = match b[2].to_ascii_uppercase() {
                b'R' => 0,
                b'C' => 6,
                b'E' => 12,
                _ => return Err(malformed()),
            };
            Ok(weight + slope + expansion)
        }
        Prefix::O => {
            let value = parse_radix(token, 8).ok_or_else(malformed)?;
            check_range(value, u32::MAX as i64)
        }
        Prefix::H | Prefix::I => {
            let value = parse_radix(token, 16).ok_or_else(malformed)?;
            check_range(value, u32::MAX as i64)
        }
        Prefix::R => match Number::parse_decimal(token) {
            Ok(n) => Ok(n.0 as i64),
            Err(()) => Err(malformed()),
        },
    }
}

fn parse_radix(token: &str, radix: u32) -> Option<i64> {
    if token.is_empty() {
        return None;
    }
    let mut acc: i64 = 0;
    for c in token.chars() {
        let d = c.to_digit(radix)?;
        acc = acc.checked_mul(radix as i64)?.checked_add(d as i64)?;
        if acc > u32::MAX as i64 {
            return None;
        }
    }
    Some(acc)
}

/// Emit a value under a prefix, applying the fallback rules.
///
/// Returns the prefix actually used and the rendered token.
pub fn unparse(prefix: Prefix, value: i64, cfg: &Config) -> Result<(Prefix, String), NumberError> {
    let mut prefix = prefix;
    loop {
        match prefix {
            Prefix::F => {
                if !(0..=17).contains(&value) {
                    prefix = Prefix::D;
                    continue;
                }
                let weight = match (value % 6) / 2 {
                    0 => 'M',
                    1 => 'B',
                    _ => 'L',
                };
                let slope = if value % 2 == 0 { 'R' } else { 'I' };
                let expansion = match value / 6 {
                    0 => 'R',
                    1 => 'C',
                    _ => 'E',
                };
                return Ok((Prefix::F, format!("{weight}{slope}{expansion}")));
            }
            Prefix::C => {
                match u8::try_from(value) {
                    Ok(u) if is_word_byte(u) => {
                        return Ok((Prefix::C, (u as char).to_string()));
                    }
                    _ => {
                        prefix = Prefix::I;
                        continue;
                    }
                };
            }
            Prefix::K => match u32::try_from(value).ok().and_then(|v| jcode::chr(cfg, v)) {
                Some(bytes) => {
                    return Ok((Prefix::K, super::lexer::bytes_to_chars(&bytes)));
                }
                None => {
                    prefix = Prefix::H;
                    continue;
                }
            },
            Prefix::D => {
                if !(0..=255).contains(&value) {
                    prefix = Prefix::I;
                    continue;
                }
                return Ok((Prefix::D, value.to_string()));
            }
            Prefix::I => {
                prefix = match cfg.forced_prefix {
                    Some(p) if p != Prefix::I => p,
                    _ if cfg.prefer_hex => Prefix::H,
                    _ => Prefix::O,
                };
                continue;
            }
            Prefix::O => {
                return Ok((Prefix::O, format!("{:o}", value as u32)));
            }
            Prefix::H => {
                return Ok((Prefix::H, format!("{:X}", value as u32)));
            }
            Prefix::R => {
                return match i32::try_from(value) {
                    Ok(v) => Ok((Prefix::R, Number(v).to_string())),
                    Err(_) => Err(NumberError::RealOutOfDomain { value }),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    macro_rules! parse_tests {
        ( $( ($name: ident, $prefix: expr, $token: expr, $want: expr, ), )+ ) => {
            $(
                #[test]
                fn $name() {
                    assert_eq!(parse($prefix, $token, &cfg()).ok(), $want);
                }
            )+
        };
    }

    parse_tests!(
        (c_letter, Prefix::C, "A", Some(65),),
        (c_not_word, Prefix::C, "!", None,),
        (c_two_chars, Prefix::C, "AB", None,),
        (d_basic, Prefix::D, "128", Some(128),),
        (d_too_big, Prefix::D, "256", None,),
        (f_mrr, Prefix::F, "MRR", Some(0),),
        (f_bic, Prefix::F, "BIC", Some(9),),
        (f_lie, Prefix::F, "LIE", Some(17),),
        (f_bad, Prefix::F, "ABC", None,),
        (o_basic, Prefix::O, "7777777", Some(0o7777777),),
        (o_max, Prefix::O, "37777777777", Some(u32::MAX as i64),),
        (o_too_big, Prefix::O, "40000000000", None,),
        (o_bad_digit, Prefix::O, "778", None,),
        (h_basic, Prefix::H, "2121", Some(0x2121),),
        (r_half, Prefix::R, "0.5", Some(1 << 19),),
        (r_unity, Prefix::R, "1.0", Some(1 << 20),),
        (r_too_big, Prefix::R, "3000", None,),
        (k_ascii_utf8, Prefix::K, "A", Some(65),),
    );

    #[test]
    fn free_number_widens_decimal() {
        let mut cfg = cfg();
        cfg.free_number = true;
        assert_eq!(parse(Prefix::D, "70000", &cfg), Ok(70000));
    }

    macro_rules! unparse_tests {
        ( $( ($name: ident, $prefix: expr, $value: expr, $want: expr, ), )+ ) => {
            $(
                #[test]
                fn $name() {
                    let (p, t) = unparse($prefix, $value, &cfg()).unwrap();
                    let want: (Prefix, &str) = $want;
                    assert_eq!((p, t.as_str()), want);
                }
            )+
        };
    }

    unparse_tests!(
        (emit_c, Prefix::C, 65, (Prefix::C, "A"),),
        (emit_c_unprintable, Prefix::C, 1, (Prefix::O, "1"),),
        (emit_c_paren, Prefix::C, 0x28, (Prefix::O, "50"),),
        (emit_d, Prefix::D, 255, (Prefix::D, "255"),),
        (emit_d_overflow, Prefix::D, 256, (Prefix::O, "400"),),
        (emit_f, Prefix::F, 9, (Prefix::F, "BIC"),),
        (emit_f_overflow, Prefix::F, 18, (Prefix::D, "18"),),
        (emit_o, Prefix::O, 0o7777, (Prefix::O, "7777"),),
        (emit_h, Prefix::H, 0xAB, (Prefix::H, "AB"),),
        (emit_i_default, Prefix::I, 256, (Prefix::O, "400"),),
        (emit_r, Prefix::R, 1 << 19, (Prefix::R, "0.5"),),
        (emit_k_ascii, Prefix::K, 65, (Prefix::K, "A"),),
    );

    #[test]
    fn emit_i_prefers_hex_when_asked() {
        let mut cfg = cfg();
        cfg.prefer_hex = true;
        assert_eq!(
            unparse(Prefix::D, 256, &cfg),
            Ok((Prefix::H, "100".into()))
        );
    }

    #[test]
    fn emit_k_untranscodable_falls_back_to_hex() {
        // Surrogate code points have no UTF-8 form.
        assert_eq!(
            unparse(Prefix::K, 0xD800, &cfg()),
            Ok((Prefix::H, "D800".into()))
        );
    }

    #[test]
    fn emit_r_out_of_domain_is_an_error() {
        assert_eq!(
            unparse(Prefix::R, 1_i64 << 40, &cfg()),
            Err(NumberError::RealOutOfDomain { value: 1 << 40 })
        );
    }
}
