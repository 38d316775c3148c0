//! Charlists: sets of code points written as characters and ranges.
//!
//! A charlist serializes as a run of character atoms (`あ`, `U3042`,
//! `J2422`, `X0028`) and `CTRANGE` sub-lists. Adjacent codes only
//! collapse into a range when the run is long enough, matching the
//! conventions of the surrounding toolchain.

use crate::pl::{Cooked, List, Node, Prefix};
use crate::{jcode, Config};
use std::collections::BTreeSet;

/// One item of a charlist.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Item {
    Code(u32),
    /// An inclusive range.
    Range(u32, u32),
}

/// An ordered sequence of codes and inclusive ranges, semantically a set.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Charlist(pub Vec<Item>);

/// Error produced while reading a charlist out of a tree.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum CharlistError {
    /// An atom is neither a known hex spelling nor a transcodable
    /// character.
    BadCharacter { token: String },
    /// A `CTRANGE` does not carry exactly two endpoints, or runs
    /// backwards.
    BadRange,
    /// An unexpected sub-list appeared among the characters.
    UnexpectedList { head: String },
}

impl std::error::Error for CharlistError {}

impl std::fmt::Display for CharlistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CharlistError::BadCharacter { token } => {
                write!(f, "`{token}` is not a character or hex spelling")
            }
            CharlistError::BadRange => write!(f, "malformed CTRANGE"),
            CharlistError::UnexpectedList { head } => {
                write!(f, "unexpected `{head}` list inside a charlist")
            }
        }
    }
}

impl Charlist {
    pub fn from_codes<I: IntoIterator<Item = u32>>(codes: I) -> Charlist {
        Charlist(codes.into_iter().map(Item::Code).collect())
    }

    /// Every code in the list, expanded and deduplicated, in ascending
    /// order.
    pub fn codes(&self) -> Vec<u32> {
        let mut set = BTreeSet::new();
        for item in &self.0 {
            match *item {
                Item::Code(c) => {
                    set.insert(c);
                }
                Item::Range(s, e) => {
                    set.extend(s..=e);
                }
            }
        }
        set.into_iter().collect()
    }

    /// Number of distinct codes.
    pub fn len(&self) -> usize {
        self.codes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, code: u32) -> bool {
        self.0.iter().any(|item| match *item {
            Item::Code(c) => c == code,
            Item::Range(s, e) => (s..=e).contains(&code),
        })
    }

    /// Normalize: sort, deduplicate, and collapse a run of consecutive
    /// codes into a range when its span reaches the threshold.
    pub fn rangify(&self, threshold: u32) -> Charlist {
        let codes = self.codes();
        let mut out = vec![];
        let mut i = 0;
        while i < codes.len() {
            let start = codes[i];
            let mut end = start;
            while i + 1 < codes.len() && codes[i + 1] == end + 1 {
                end = codes[i + 1];
                i += 1;
            }
            i += 1;
            if end - start >= threshold {
                out.push(Item::Range(start, end));
            } else {
                out.extend((start..=end).map(Item::Code));
            }
        }
        Charlist(out)
    }

    pub fn union(&self, other: &Charlist) -> Charlist {
        let mut set: BTreeSet<u32> = self.codes().into_iter().collect();
        set.extend(other.codes());
        Charlist::from_codes(set)
    }

    pub fn difference(&self, other: &Charlist) -> Charlist {
        let removed: BTreeSet<u32> = other.codes().into_iter().collect();
        Charlist::from_codes(self.codes().into_iter().filter(|c| !removed.contains(c)))
    }

    /// Read a charlist from the nodes following a list's numeric indices.
    pub fn from_nodes(nodes: &[Node], cfg: &Config) -> Result<Charlist, CharlistError> {
        let mut items = vec![];
        for node in nodes {
            match node {
                Node::Raw(w) | Node::Bareword(w) => {
                    items.push(Item::Code(atom_code(w, cfg)?));
                }
                Node::Cooked(c) => items.push(Item::Code(c.value as u32)),
                Node::List(l) if l.head() == Some("CTRANGE") => {
                    let mut ends = vec![];
                    for n in l.args() {
                        match n {
                            Node::Cooked(c) => ends.push(c.value as u32),
                            Node::Raw(w) => ends.push(atom_code(w, cfg)?),
                            _ => return Err(CharlistError::BadRange),
                        }
                    }
                    match ends[..] {
                        [s, e] if s <= e => items.push(Item::Range(s, e)),
                        _ => return Err(CharlistError::BadRange),
                    }
                }
                Node::List(l) => {
                    return Err(CharlistError::UnexpectedList {
                        head: l.head().unwrap_or_default().into(),
                    })
                }
            }
        }
        Ok(Charlist(items))
    }

    /// Serialize into nodes, after rangification. If the whole set matches
    /// a registered name, the name is emitted instead.
    pub fn to_nodes(&self, cfg: &Config) -> Vec<Node> {
        if let Some(name) = self.match_name(cfg.rangify_threshold) {
            return vec![Node::Raw(name.into())];
        }
        self.rangify(cfg.rangify_threshold)
            .0
            .iter()
            .map(|item| match *item {
                Item::Code(c) => Node::Raw(code_atom(c, cfg)),
                Item::Range(s, e) => Node::List(
                    List::new("CTRANGE")
                        .with(Node::Cooked(Cooked::new(Prefix::H, s as i64)))
                        .with(Node::Cooked(Cooked::new(Prefix::H, e as i64))),
                ),
            })
            .collect()
    }

    /// The registered name this charlist matches: same first element, same
    /// total length, same structure after rangification.
    pub fn match_name(&self, threshold: u32) -> Option<&'static str> {
        let mine = self.rangify(threshold);
        for name in NAMES {
            let registered = named(name).unwrap().rangify(threshold);
            if mine.0.first() == registered.0.first() && mine == registered {
                return Some(name);
            }
        }
        None
    }
}

const NAMES: &[&str] = &["UNICODE-BMP", "GL94DB"];

/// Look up a registered charlist by name.
pub fn named(name: &str) -> Option<Charlist> {
    match name {
        "UNICODE-BMP" => Some(Charlist(vec![Item::Range(0x0000, 0xFFFF)])),
        "GL94DB" => Some(Charlist(
            (0x21..=0x7E_u32)
                .map(|hi| Item::Range(hi << 8 | 0x21, hi << 8 | 0x7E))
                .collect(),
        )),
        _ => None,
    }
}

fn atom_code(word: &str, cfg: &Config) -> Result<u32, CharlistError> {
    let bad = || CharlistError::BadCharacter { token: word.into() };
    let hex = |w: &str| u32::from_str_radix(&w[1..], 16).map_err(|_| bad());
    let b = word.as_bytes();
    if b.len() == 5
        && matches!(b[0], b'X' | b'U' | b'J')
        && b[1..].iter().all(|c| c.is_ascii_hexdigit())
    {
        match b[0] {
            b'X' => return hex(word),
            b'U' => {
                let u = hex(word)?;
                return match cfg.internal_enc {
                    jcode::Internal::Unicode => Ok(u),
                    jcode::Internal::Jis0208 => cfg
                        .char_map
                        .as_ref()
                        .and_then(|m| m.jis_of(u))
                        .map(u32::from)
                        .ok_or_else(bad),
                };
            }
            b'J' => {
                let j = hex(word)?;
                return match cfg.internal_enc {
                    jcode::Internal::Jis0208 => Ok(j),
                    jcode::Internal::Unicode => cfg
                        .char_map
                        .as_ref()
                        .and_then(|m| m.unicode_of(j as u16))
                        .ok_or_else(bad),
                };
            }
            _ => (),
        }
    }
    let bytes = crate::pl::lexer::chars_to_bytes(word).ok_or_else(bad)?;
    jcode::ord(cfg, &bytes).ok_or_else(bad)
}

fn code_atom(code: u32, cfg: &Config) -> String {
    match jcode::chr(cfg, code) {
        Some(bytes)
            if bytes.iter().all(|&u| u >= 0x80)
                || matches!(bytes[..], [u] if u.is_ascii_alphanumeric()) =>
        {
            crate::pl::lexer::bytes_to_chars(&bytes)
        }
        _ => match cfg.internal_enc {
            jcode::Internal::Unicode => format!("U{code:04X}"),
            jcode::Internal::Jis0208 => format!("X{code:04X}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn nine_codes_collapse_at_default_threshold() {
        let list = Charlist::from_codes(0x21..=0x29);
        assert_eq!(
            list.rangify(8).0,
            vec![Item::Range(0x21, 0x29)]
        );
    }

    #[test]
    fn nine_codes_stay_individual_at_threshold_ten() {
        let list = Charlist::from_codes(0x21..=0x29);
        let got = list.rangify(10);
        assert_eq!(got.0.len(), 9);
        assert!(got.0.iter().all(|i| matches!(i, Item::Code(_))));
    }

    #[test]
    fn rangify_sorts_and_deduplicates() {
        let list = Charlist::from_codes([5, 3, 4, 3, 9]);
        assert_eq!(
            list.rangify(8).0,
            vec![Item::Code(3), Item::Code(4), Item::Code(5), Item::Code(9)]
        );
    }

    #[test]
    fn union_and_difference_are_set_operations() {
        let a = Charlist::from_codes([1, 2, 3]);
        let b = Charlist(vec![Item::Range(3, 5)]);
        assert_eq!(a.union(&b).codes(), vec![1, 2, 3, 4, 5]);
        assert_eq!(a.difference(&b).codes(), vec![1, 2]);
    }

    #[test]
    fn gl94db_has_the_full_two_byte_grid() {
        let gl = named("GL94DB").unwrap();
        assert_eq!(gl.len(), 94 * 94);
        assert!(gl.contains(0x2121));
        assert!(gl.contains(0x7E7E));
        assert!(!gl.contains(0x2120));
    }

    #[test]
    fn match_name_recognizes_the_registered_sets() {
        let bmp = Charlist::from_codes(0..=0xFFFF);
        assert_eq!(bmp.match_name(8), Some("UNICODE-BMP"));
        assert_eq!(named("GL94DB").unwrap().match_name(8), Some("GL94DB"));
        let off_by_one = Charlist::from_codes(1..=0xFFFF);
        assert_eq!(off_by_one.match_name(8), None);
    }

    #[test]
    fn nodes_round_trip() {
        let list = Charlist(vec![Item::Code(0x3042), Item::Range(0x4000, 0x4020)]);
        let cfg = cfg();
        let nodes = list.to_nodes(&cfg);
        let back = Charlist::from_nodes(&nodes, &cfg).unwrap();
        assert_eq!(back.codes(), list.codes());
    }

    #[test]
    fn hex_spellings_parse() {
        let cfg = cfg();
        let nodes = vec![
            Node::Raw("U3042".into()),
            Node::Raw("X0028".into()),
        ];
        let got = Charlist::from_nodes(&nodes, &cfg).unwrap();
        assert_eq!(got.codes(), vec![0x28, 0x3042]);
    }

    #[test]
    fn parens_escape_on_emission() {
        let list = Charlist(vec![Item::Code(0x28)]);
        let nodes = list.to_nodes(&cfg());
        assert_eq!(nodes, vec![Node::Raw("U0028".into())]);
    }

    #[test]
    fn jis_spellings_cross_through_the_char_map() {
        let cfg = Config {
            char_map: Some(std::sync::Arc::new(crate::jcode::tests::TestMap)),
            ..Default::default()
        };
        let got = Charlist::from_nodes(&[Node::Raw("J2422".into())], &cfg).unwrap();
        assert_eq!(got.codes(), vec![0x3042]);
        let unmapped = Charlist::from_nodes(&[Node::Raw("J2423".into())], &cfg);
        assert_eq!(
            unmapped,
            Err(CharlistError::BadCharacter {
                token: "J2423".into()
            })
        );
    }
}
