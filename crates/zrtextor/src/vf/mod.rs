//! The virtual font binary format.
//!
//! A VF file is a preamble, a run of font definitions and character
//! packets, and a postamble of padding bytes. Each character packet
//! carries a small DVI program. [`deserialize`] decodes the whole file
//! into the ZPL tree vocabulary (`VTITLE`, `MAPFONT`, `CHARACTER`,
//! `MAP`, ...); [`serialize`] is its inverse, re-deriving the compact
//! `w`/`x`/`y`/`z` move encodings as it goes.

mod deserialize;
mod serialize;

pub use deserialize::deserialize;
pub use serialize::serialize;

/// The byte identifying a VF preamble.
pub(crate) const PRE: u8 = 247;
/// The VF format identifier, one more than DVI's.
pub(crate) const ID: u8 = 202;
/// The long-form character packet opcode.
pub(crate) const LONG_CHAR: u8 = 242;
/// The first font-definition opcode.
pub(crate) const FNT_DEF_1: u8 = 243;
/// The postamble/padding byte.
pub(crate) const POST: u8 = 248;

/// Longest DVI program a short-form character packet can carry.
pub(crate) const SHORT_DVI_MAX: usize = 241;

/// Error produced by the VF codec.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// The file does not start with the preamble bytes 247 202.
    NotAVirtualFont,
    /// The file ended inside a record. The payload is the offset at which
    /// more bytes were needed.
    Truncated { position: usize },
    /// A byte that is not a valid record start appeared. The payload is
    /// the byte and its offset.
    UnexpectedByte { byte: u8, position: usize },
    /// A font definition appeared after the first character packet.
    LateFontDefinition { position: usize },
    /// Something other than padding followed the postamble byte.
    BadPostamble { position: usize },
    /// A character packet's DVI program did not parse. Only produced in
    /// strict mode; otherwise the program is preserved as `DIRECTHEX`.
    InvalidDvi { code: u32, position: usize },
    /// The title passed to the emitter exceeds 255 bytes.
    VtitleTooLong { len: usize },
    /// A top-level property the emitter does not know. Only produced in
    /// strict mode; otherwise the property is dropped.
    UnknownProperty { head: String },
    /// A `MAP` operator the emitter does not know. Only produced in
    /// strict mode.
    UnknownMapOp { head: String },
    /// A `CHARACTER` list with no code.
    MissingCharacterCode,
    /// A `POP` with no matching `PUSH`.
    PopWithoutPush,
    /// A `SETCHAR`, `SETRULE`, `MOVERIGHT` etc. without its numeric
    /// argument.
    MissingMapArgument { head: String },
    /// A `DIRECTHEX`/`SPECIALHEX` atom that is not an even run of hex
    /// digits.
    BadHex { token: String },
    /// An atom holds a char that never came from a byte, so it cannot be
    /// written to a binary file.
    NonByteAtom { token: String },
    /// A `SPECIAL` payload failed to re-serialize.
    BadSpecialPayload,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotAVirtualFont => write!(f, "the file does not start with a VF preamble"),
            Error::Truncated { position } => {
                write!(f, "the file ends inside a record (offset {position})")
            }
            Error::UnexpectedByte { byte, position } => {
                write!(f, "unexpected byte {byte} at offset {position}")
            }
            Error::LateFontDefinition { position } => {
                write!(
                    f,
                    "font definition at offset {position} after the first character packet"
                )
            }
            Error::BadPostamble { position } => {
                write!(f, "non-padding byte at offset {position} after the postamble")
            }
            Error::InvalidDvi { code, position } => {
                write!(
                    f,
                    "character {code} carries an invalid DVI program (offset {position})"
                )
            }
            Error::VtitleTooLong { len } => {
                write!(f, "the title is {len} bytes long; at most 255 fit")
            }
            Error::UnknownProperty { head } => write!(f, "unknown property `{head}`"),
            Error::UnknownMapOp { head } => write!(f, "unknown MAP operator `{head}`"),
            Error::MissingCharacterCode => write!(f, "CHARACTER list with no code"),
            Error::PopWithoutPush => write!(f, "POP with no matching PUSH"),
            Error::MissingMapArgument { head } => {
                write!(f, "`{head}` is missing its numeric argument")
            }
            Error::BadHex { token } => write!(f, "`{token}` is not an even run of hex digits"),
            Error::NonByteAtom { token } => {
                write!(f, "atom `{token}` cannot be written to a binary file")
            }
            Error::BadSpecialPayload => write!(f, "SPECIAL payload failed to re-serialize"),
        }
    }
}

/// One frame of `w`/`x`/`y`/`z` move registers. A `PUSH` opens a frame
/// with all four unset; a `POP` discards the frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Registers {
    pub w: Option<i32>,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub z: Option<i32>,
}
