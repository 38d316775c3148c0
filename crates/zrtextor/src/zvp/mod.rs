//! The composite ZVP form: one document holding both the virtual-font
//! side and the metric side of a Japanese font.
//!
//! [`divide`] splits a composite tree into the VF tree and the JFM tree,
//! relocating subtypes whose metrics disagree with their parent type;
//! [`compose`] reassembles a composite from the two halves, electing
//! each type's canonical mapping and discovering subtypes.

pub mod compose;
pub mod divide;

pub use compose::compose;
pub use divide::{divide, Divided};

use crate::charlist::CharlistError;

/// How a top-level property relates to the two halves.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Category {
    /// Belongs to the virtual font only.
    VfOnly,
    /// Belongs to the metric file only.
    JfmOnly,
    /// Copied to both halves, and checked for consistency on composition.
    Both,
    /// Carries type/subtype/character structure the divider takes apart.
    Structural,
    Unknown,
}

/// Category of a top-level head symbol.
pub fn category(head: &str) -> Category {
    match head {
        "VTITLE" | "MAPFONT" => Category::VfOnly,
        "DIRECTION" | "FAMILY" | "FACE" | "HEADER" | "CODINGSCHEME" | "DESIGNUNITS"
        | "SEVENBITSAFEFLAG" | "BOUNDARYCHAR" | "FONTDIMEN" => Category::JfmOnly,
        "DESIGNSIZE" | "CHECKSUM" => Category::Both,
        "TYPE" | "SUBTYPE" | "CHARSINTYPE" | "CHARSINSUBTYPE" | "CHARACTER" | "GLUEKERN"
        | "CODESPACE" => Category::Structural,
        _ => Category::Unknown,
    }
}

/// Error produced by division or composition.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// A top-level property neither half knows. Strict mode only.
    UnknownProperty { head: String },
    /// A structural list with no numeric index.
    MissingIndex { head: String },
    /// A `TYPE` without its `CHARSINTYPE`, for types 1 and up.
    TypeWithoutChars { ty: u8 },
    /// A `CHARSINTYPE` without its `TYPE`.
    CharsWithoutType { ty: u8 },
    /// A `SUBTYPE` without its `CHARSINSUBTYPE`.
    SubtypeWithoutChars { ty: u8, sub: u16 },
    /// A `CHARSINSUBTYPE` without its `SUBTYPE`.
    CharsWithoutSubtype { ty: u8, sub: u16 },
    /// A subtype claims a code its parent type does not hold.
    SubtypeOutsideParent { ty: u8, sub: u16, code: u32 },
    /// A code is claimed by two subtypes.
    DuplicateSubtypeAssignment { code: u32 },
    /// A non-zero type claims a code outside the codespace.
    CodeOutsideCodespace { ty: u8, code: u32 },
    /// A code is claimed by two non-zero types.
    DuplicateTypeAssignment { code: u32 },
    /// Subtype relocation ran out of type indices.
    TypesExhausted,
    /// A type is referenced but has no `TYPE` entry to take metrics from.
    MissingType { ty: u8 },
    /// The two halves disagree on a both-sided property.
    ChecksumMismatch { vf: u32, jfm: u32 },
    DesignSizeMismatch,
    /// The virtual font has no packet for a code the metric covers.
    /// Strict mode only.
    MissingCharPacket { code: u32 },
    /// A packet's width disagrees with its type's width. Strict mode
    /// only.
    WidthMismatch { code: u32 },
    /// A malformed charlist.
    Charlist(CharlistError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownProperty { head } => write!(f, "unknown property `{head}`"),
            Error::MissingIndex { head } => write!(f, "`{head}` has no numeric index"),
            Error::TypeWithoutChars { ty } => {
                write!(f, "TYPE {ty} has no CHARSINTYPE {ty}")
            }
            Error::CharsWithoutType { ty } => {
                write!(f, "CHARSINTYPE {ty} has no TYPE {ty}")
            }
            Error::SubtypeWithoutChars { ty, sub } => {
                write!(f, "SUBTYPE {ty} {sub} has no CHARSINSUBTYPE {ty} {sub}")
            }
            Error::CharsWithoutSubtype { ty, sub } => {
                write!(f, "CHARSINSUBTYPE {ty} {sub} has no SUBTYPE {ty} {sub}")
            }
            Error::SubtypeOutsideParent { ty, sub, code } => write!(
                f,
                "SUBTYPE {ty} {sub} claims code {code:#X} outside its parent type"
            ),
            Error::DuplicateSubtypeAssignment { code } => {
                write!(f, "code {code:#X} is claimed by two subtypes")
            }
            Error::CodeOutsideCodespace { ty, code } => {
                write!(f, "TYPE {ty} claims code {code:#X} outside the codespace")
            }
            Error::DuplicateTypeAssignment { code } => {
                write!(f, "code {code:#X} is claimed by two types")
            }
            Error::TypesExhausted => write!(f, "no free type index left for relocation"),
            Error::MissingType { ty } => write!(f, "no TYPE {ty} to take metrics from"),
            Error::ChecksumMismatch { vf, jfm } => write!(
                f,
                "the two halves carry different checksums ({vf:o} and {jfm:o})"
            ),
            Error::DesignSizeMismatch => {
                write!(f, "the two halves carry different design sizes")
            }
            Error::MissingCharPacket { code } => {
                write!(f, "no character packet for code {code:#X}")
            }
            Error::WidthMismatch { code } => write!(
                f,
                "character packet {code:#X} disagrees with its type's width"
            ),
            Error::Charlist(e) => e.fmt(f),
        }
    }
}

impl From<CharlistError> for Error {
    fn from(e: CharlistError) -> Self {
        Error::Charlist(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_table() {
        assert_eq!(category("VTITLE"), Category::VfOnly);
        assert_eq!(category("FAMILY"), Category::JfmOnly);
        assert_eq!(category("CHECKSUM"), Category::Both);
        assert_eq!(category("GLUEKERN"), Category::Structural);
        assert_eq!(category("NONSense"), Category::Unknown);
    }
}
