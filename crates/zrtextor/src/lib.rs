//! Parsers and emitters for TeX font metric property lists (.pl/.jpl/.opl),
//! virtual fonts (.vf) and their composite ZVP form, plus the metric
//! reduction used to build class-based Japanese font metrics (.jfm).
//!
//! The crate is organized around a single tree representation of
//! property-list files ([`pl::Node`], [`pl::List`], [`pl::PlFile`]).
//! Text parsers and the VF binary parser both produce this tree;
//! the text emitter and the VF binary emitter both consume it.
//! The [`zvp`] module splits a composite tree into its VF and JFM halves
//! and reassembles them, and [`jfm`] reduces raw per-glyph metrics into
//! the compact class table a JFM file stores.

pub mod charlist;
pub mod exec;
pub mod jcode;
pub mod jfm;
pub mod pl;
pub mod vf;
pub mod zvp;

/// Fixed-width numeric type used throughout the metric formats.
///
/// This type has 11 bits for the integer part,
/// 20 bits for the fractional part, and a single sign bit.
/// In property list files it is written as a decimal number after the
/// `R` prefix; the decimal form is non-lossy because 10^(-6) is larger
/// than 2^(-20).
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
pub struct Number(pub i32);

impl Number {
    /// Representation of the number 0.
    pub const ZERO: Number = Number(0);

    /// Representation of the number 1.
    pub const UNITY: Number = Number(1 << 20);

    /// Convert to a float, in units of the design size.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Number::UNITY.0 as f64
    }

    /// Round a float (in design-size units) to the nearest representable
    /// value, halves away from zero.
    ///
    /// Returns `None` if the scaled value does not fit in 32 bits.
    pub fn from_f64(value: f64) -> Option<Number> {
        let scaled = (value * Number::UNITY.0 as f64).abs() + 0.5;
        if scaled >= -(i32::MIN as f64) {
            return None;
        }
        let magnitude = scaled as i64;
        let signed = if value < 0.0 { -magnitude } else { magnitude };
        i32::try_from(signed).ok().map(Number)
    }

    /// Parse the decimal notation used after the `R` prefix.
    ///
    /// The grammar is signs, an integer part, and an optional fractional
    /// part. The value is scaled by 2^20 with halves rounded away from
    /// zero. Values outside the signed 32-bit fixed-point domain are
    /// rejected.
    pub fn parse_decimal(s: &str) -> Result<Number, ()> {
        let mut chars = s.chars().peekable();
        let mut negative = false;
        let mut seen_digit = false;
        while let Some(c) = chars.peek() {
            match c {
                '+' | ' ' => (),
                '-' => negative = !negative,
                _ => break,
            }
            chars.next();
        }

        let mut integer_part: i64 = 0;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            chars.next();
            seen_digit = true;
            integer_part = integer_part * 10 + d as i64;
            if integer_part > 2048 {
                // Keep consuming so the whole token is validated, but the
                // value is already out of range.
                integer_part = 2048;
            }
        }

        // The fraction is accumulated over at most 7 digits, scaled by
        // 2^21, and then halved with rounding. Seven digits suffice
        // because 10^(-7) is below the fixed-point unit.
        let mut fractional_part: i64 = 0;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = [0_i64; 7];
            for slot in &mut digits {
                match chars.peek().and_then(|c| c.to_digit(10)) {
                    Some(d) => {
                        chars.next();
                        seen_digit = true;
                        *slot = (1_i64 << 21) * d as i64;
                    }
                    None => break,
                }
            }
            while chars.peek().and_then(|c| c.to_digit(10)).is_some() {
                chars.next();
            }
            for j in (0..7).rev() {
                fractional_part = digits[j] + fractional_part / 10;
            }
            fractional_part = (fractional_part + 10) / 20;
        }

        if !seen_digit || chars.next().is_some() {
            return Err(());
        }
        if integer_part >= 2048 || (integer_part == 2047 && fractional_part >= Number::UNITY.0 as i64)
        {
            return Err(());
        }
        let modulus = integer_part * Number::UNITY.0 as i64 + fractional_part;
        let signed = if negative { -modulus } else { modulus };
        match i32::try_from(signed) {
            Ok(v) => Ok(Number(v)),
            Err(_) => Err(()),
        }
    }
}

impl std::ops::Add for Number {
    type Output = Number;
    fn add(self, rhs: Number) -> Number {
        Number(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Number {
    type Output = Number;
    fn sub(self, rhs: Number) -> Number {
        Number(self.0 - rhs.0)
    }
}

impl std::ops::Neg for Number {
    type Output = Number;
    fn neg(self) -> Number {
        Number(-self.0)
    }
}

impl std::ops::Mul<i32> for Number {
    type Output = Number;
    fn mul(self, rhs: i32) -> Number {
        Number(self.0 * rhs)
    }
}

impl std::ops::Div<i32> for Number {
    type Output = Number;
    fn div(self, rhs: i32) -> Number {
        Number(self.0 / rhs)
    }
}

impl std::fmt::Display for Number {
    /// Print the shortest decimal form that scales back to the same value.
    ///
    /// The fraction digits are produced by repeatedly multiplying the
    /// remainder by ten with a bias of five, stopping as soon as the
    /// accumulated remainder drops to the accumulated precision.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-")?;
        }
        let abs = (self.0 as i64).abs();
        write!(f, "{}.", abs >> 20)?;
        let mut a = (abs & 0xFFFFF) * 10 + 5;
        let mut d: i64 = 10;
        loop {
            if d > (1 << 20) {
                a += (1 << 19) - d / 2;
            }
            let digit = a >> 20;
            write!(f, "{digit}")?;
            a = (a & 0xFFFFF) * 10;
            d *= 10;
            if a <= d {
                break;
            }
        }
        Ok(())
    }
}

/// Configuration for the conversion operations.
///
/// The defaults match the conventions of the surrounding TeX toolchain;
/// tests can call any top-level operation with `Config::default()`.
#[derive(Clone)]
pub struct Config {
    /// Upgrade structural oddities (unknown properties, missing character
    /// packets, width mismatches) to hard errors. When false they become
    /// silent drops or `DIRECTHEX` fallbacks.
    pub vf_strict: bool,
    /// Encode every DVI move with the plain N-byte form instead of the
    /// `w`/`x`/`y`/`z` register forms.
    pub simple_move: bool,
    /// Emit the `I` integer alias as `H` rather than `O`.
    pub prefer_hex: bool,
    /// Minimum span (end minus start) for a run of codes to be emitted as a
    /// `CTRANGE` rather than individual characters.
    pub rangify_threshold: u32,
    /// Use the upTeX metric tools (`uppltotf`/`uptftopl`) instead of the
    /// pTeX ones.
    pub use_uptex_tool: bool,
    /// When set, overrides the resolution of the `I` integer alias.
    pub forced_prefix: Option<pl::Prefix>,
    /// Widen the non-real prefix ranges to the full signed 32-bit domain.
    pub free_number: bool,
    /// External (byte-side) Japanese encoding.
    pub external_enc: jcode::External,
    /// Internal (codepoint-side) Japanese encoding.
    pub internal_enc: jcode::Internal,
    /// Cross table between JIS 0208 and Unicode, needed only when the
    /// external and internal encodings sit on different sides of it.
    pub char_map: Option<std::sync::Arc<dyn jcode::CharMap + Send + Sync>>,
    /// Names of the external commands the tool wrappers invoke.
    pub commands: exec::CommandTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vf_strict: true,
            simple_move: false,
            prefer_hex: false,
            rangify_threshold: 8,
            use_uptex_tool: false,
            forced_prefix: None,
            free_number: false,
            external_enc: jcode::External::Utf8,
            internal_enc: jcode::Internal::Unicode,
            char_map: None,
            commands: Default::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("vf_strict", &self.vf_strict)
            .field("simple_move", &self.simple_move)
            .field("prefer_hex", &self.prefer_hex)
            .field("rangify_threshold", &self.rangify_threshold)
            .field("use_uptex_tool", &self.use_uptex_tool)
            .field("forced_prefix", &self.forced_prefix)
            .field("free_number", &self.free_number)
            .field("external_enc", &self.external_enc)
            .field("internal_enc", &self.internal_enc)
            .field("char_map", &self.char_map.as_ref().map(|_| "..."))
            .field("commands", &self.commands)
            .finish()
    }
}
