//! Splitting a composite ZVP tree into its VF and JFM halves.

use super::{category, Category, Error};
use crate::charlist::{self, Charlist};
use crate::pl::{rearrange, List, Node, PlFile, Prefix};
use crate::{Config, Number};
use std::collections::BTreeMap;

/// The two halves of a divided composite.
#[derive(Debug, PartialEq, Eq)]
pub struct Divided {
    pub vf: PlFile,
    pub jfm: PlFile,
}

const METRIC_HEADS: [&str; 4] = ["CHARWD", "CHARHT", "CHARDP", "CHARIC"];

/// The four metric entries of a type or subtype description.
type Quad = [Option<i64>; 4];

fn metric_quad(list: &List) -> Quad {
    METRIC_HEADS.map(|h| list.child(h).and_then(|l| l.value()).map(|c| c.value))
}

/// A subtype inherits any metric entry it does not set itself.
fn effective_quad(sub: Quad, parent: Quad) -> Quad {
    std::array::from_fn(|i| sub[i].or(parent[i]))
}

pub(crate) fn index_of(list: &List) -> Result<u8, Error> {
    let head = list.head().unwrap_or_default().to_string();
    list.value()
        .and_then(|c| u8::try_from(c.value).ok())
        .ok_or(Error::MissingIndex { head })
}

fn sub_key(list: &List) -> Result<(u8, u16), Error> {
    let head = list.head().unwrap_or_default().to_string();
    let t = list.value().and_then(|c| u8::try_from(c.value).ok());
    let u = list.nth_value(1).and_then(|c| u16::try_from(c.value).ok());
    match (t, u) {
        (Some(t), Some(u)) => Ok((t, u)),
        _ => Err(Error::MissingIndex { head }),
    }
}

pub(crate) fn parse_codespace(list: &List, cfg: &Config) -> Result<Charlist, Error> {
    if let [Node::Raw(name)] = list.args() {
        if let Some(named) = charlist::named(name) {
            return Ok(named);
        }
    }
    Ok(Charlist::from_nodes(list.args(), cfg)?)
}

pub(crate) fn code_prefix(code: u32) -> Prefix {
    if code <= 0xFF {
        Prefix::C
    } else {
        Prefix::K
    }
}

/// Divide a composite tree. See the module documentation for the shape
/// of the two outputs.
pub fn divide(z: &PlFile, cfg: &Config) -> Result<Divided, Error> {
    let mut vf = PlFile::default();
    let mut jfm = PlFile::default();
    let mut types: BTreeMap<u8, List> = BTreeMap::new();
    let mut cit: BTreeMap<u8, Charlist> = BTreeMap::new();
    let mut subs: BTreeMap<(u8, u16), List> = BTreeMap::new();
    let mut cis: BTreeMap<(u8, u16), Charlist> = BTreeMap::new();
    let mut chars: BTreeMap<u32, List> = BTreeMap::new();
    let mut gluekern: Option<&List> = None;
    let mut codespace: Option<Charlist> = None;

    for list in &z.0 {
        let head = list.head().unwrap_or_default();
        match category(head) {
            Category::Both => {
                vf.push(list.clone());
                jfm.push(list.clone());
            }
            Category::VfOnly => vf.push(list.clone()),
            Category::JfmOnly => jfm.push(list.clone()),
            Category::Structural => match head {
                "TYPE" => {
                    types.insert(index_of(list)?, list.clone());
                }
                "CHARSINTYPE" => {
                    let t = index_of(list)?;
                    let members = Charlist::from_nodes(&list.args()[1..], cfg)?;
                    let merged = match cit.remove(&t) {
                        Some(old) => old.union(&members),
                        None => members,
                    };
                    cit.insert(t, merged);
                }
                "SUBTYPE" => {
                    subs.insert(sub_key(list)?, list.clone());
                }
                "CHARSINSUBTYPE" => {
                    let key = sub_key(list)?;
                    let members = Charlist::from_nodes(&list.args()[2..], cfg)?;
                    let merged = match cis.remove(&key) {
                        Some(old) => old.union(&members),
                        None => members,
                    };
                    cis.insert(key, merged);
                }
                "CHARACTER" => {
                    let code = list
                        .value()
                        .map(|c| c.value as u32)
                        .ok_or(Error::MissingIndex { head: head.into() })?;
                    chars.insert(code, list.clone());
                }
                "GLUEKERN" => gluekern = Some(list),
                "CODESPACE" => codespace = Some(parse_codespace(list, cfg)?),
                _ => unreachable!(),
            },
            Category::Unknown => {
                if cfg.vf_strict {
                    return Err(Error::UnknownProperty { head: head.into() });
                }
            }
        }
    }
    let codespace = codespace.unwrap_or_else(|| charlist::named("GL94DB").unwrap());

    // Pairing checks: TYPE <-> CHARSINTYPE for types 1 and up, and
    // SUBTYPE <-> CHARSINSUBTYPE throughout.
    for t in types.keys() {
        if *t >= 1 && !cit.contains_key(t) {
            return Err(Error::TypeWithoutChars { ty: *t });
        }
    }
    for t in cit.keys() {
        if !types.contains_key(t) {
            return Err(Error::CharsWithoutType { ty: *t });
        }
    }
    for (t, u) in subs.keys() {
        if !cis.contains_key(&(*t, *u)) {
            return Err(Error::SubtypeWithoutChars { ty: *t, sub: *u });
        }
    }
    for (t, u) in cis.keys() {
        if !subs.contains_key(&(*t, *u)) {
            return Err(Error::CharsWithoutSubtype { ty: *t, sub: *u });
        }
    }

    // Membership maps, rejecting double assignments and codespace escapes.
    let mut code_type: BTreeMap<u32, u8> = BTreeMap::new();
    for (t, members) in &cit {
        for code in members.codes() {
            if *t >= 1 && !codespace.contains(code) {
                return Err(Error::CodeOutsideCodespace { ty: *t, code });
            }
            if code_type.insert(code, *t).is_some() {
                return Err(Error::DuplicateTypeAssignment { code });
            }
        }
    }
    let mut code_sub: BTreeMap<u32, (u8, u16)> = BTreeMap::new();
    for ((t, u), members) in &cis {
        for code in members.codes() {
            if code_type.get(&code).copied().unwrap_or(0) != *t {
                return Err(Error::SubtypeOutsideParent {
                    ty: *t,
                    sub: *u,
                    code,
                });
            }
            if code_sub.insert(code, (*t, *u)).is_some() {
                return Err(Error::DuplicateSubtypeAssignment { code });
            }
        }
    }

    // Subtype migration: a subtype that disagrees with its parent on any
    // metric entry becomes a top-level type of its own. Later migrants
    // carrying the same metrics join the first one's new type as its
    // subtypes.
    let mut groups: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
    let sub_keys: Vec<(u8, u16)> = subs.keys().copied().collect();
    for (t, u) in sub_keys {
        let parent = metric_quad(types.get(&t).ok_or(Error::MissingType { ty: t })?);
        let eff = effective_quad(metric_quad(&subs[&(t, u)]), parent);
        if eff == parent {
            continue;
        }
        let members = cis.remove(&(t, u)).expect("pairing was checked");
        let sub_list = subs.remove(&(t, u)).expect("pairing was checked");
        let reused = groups
            .get(&t)
            .and_then(|g| g.iter().copied().find(|t2| metric_quad(&types[t2]) == eff));
        let t2 = match reused {
            Some(t2) => {
                subs.insert((t2, u), sub_list);
                cis.insert((t2, u), members.clone());
                t2
            }
            None => {
                let t2 = (0..=255_u8)
                    .find(|i| !types.contains_key(i))
                    .ok_or(Error::TypesExhausted)?;
                let mut ty = List::new("TYPE").with_number(Prefix::D, t2 as i64);
                for (i, head) in METRIC_HEADS.iter().enumerate() {
                    if let Some(v) = eff[i] {
                        ty.push(Node::List(List::new(head).with_number(Prefix::R, v)));
                    }
                }
                if let Some(map) = sub_list.child("MAP") {
                    ty.push(Node::List(map.clone()));
                }
                types.insert(t2, ty);
                groups.entry(t).or_default().push(t2);
                t2
            }
        };
        if let Some(parent_members) = cit.get_mut(&t) {
            *parent_members = parent_members.difference(&members);
        }
        let merged = match cit.remove(&t2) {
            Some(old) => old.union(&members),
            None => members.clone(),
        };
        cit.insert(t2, merged);
        for code in members.codes() {
            code_type.insert(code, t2);
            if reused.is_some() {
                code_sub.insert(code, (t2, u));
            } else {
                code_sub.remove(&code);
            }
        }
    }

    // Character packet synthesis for the VF half: width from the type,
    // mapping from the most specific description available.
    for code in codespace.codes() {
        let t = code_type.get(&code).copied().unwrap_or(0);
        let ty = types.get(&t).ok_or(Error::MissingType { ty: t })?;
        let width = ty
            .child("CHARWD")
            .and_then(|l| l.value())
            .map(|c| c.real())
            .unwrap_or(Number::ZERO);
        let map = chars
            .get(&code)
            .and_then(|l| l.child("MAP"))
            .or_else(|| {
                code_sub
                    .get(&code)
                    .and_then(|k| subs.get(k))
                    .and_then(|l| l.child("MAP"))
            })
            .or_else(|| ty.child("MAP"));
        let mut packet =
            List::new("CHARACTER").with_number(code_prefix(code), code as i64);
        packet.push(Node::List(List::new("CHARWD").with_real(width)));
        if let Some(map) = map {
            packet.push(Node::List(map.clone()));
        }
        vf.push(packet);
    }

    // The JFM half: codespace, types stripped of their mappings, member
    // lists, and the recompiled glue/kern table.
    let mut cs = List::new("CODESPACE");
    for node in codespace.to_nodes(cfg) {
        cs.push(node);
    }
    jfm.push(cs);
    for (t, ty) in &types {
        let mut ty = ty.clone();
        ty.remove_child("MAP");
        jfm.push(ty);
        if *t >= 1 {
            let mut list = List::new("CHARSINTYPE").with_number(Prefix::D, *t as i64);
            if let Some(members) = cit.get(t) {
                for node in members.to_nodes(cfg) {
                    list.push(node);
                }
            }
            jfm.push(list);
        }
    }
    if let Some(gk) = gluekern {
        jfm.push(recompile_gluekern(gk, &groups));
    }

    rearrange(&mut vf);
    rearrange(&mut jfm);
    Ok(Divided { vf, jfm })
}

/// Duplicate every glue/kern row referring to a migrated type for each
/// member of its migration group. Other rows pass through unchanged.
fn recompile_gluekern(gk: &List, groups: &BTreeMap<u8, Vec<u8>>) -> List {
    let mut out = List::new("GLUEKERN");
    for node in gk.args() {
        let Node::List(row) = node else {
            out.push(node.clone());
            continue;
        };
        out.push(Node::List(row.clone()));
        if !matches!(row.head(), Some("LABEL" | "GLUE" | "KRN")) {
            continue;
        }
        let Some(target) = row.value().and_then(|c| u8::try_from(c.value).ok()) else {
            continue;
        };
        for t2 in groups.get(&target).into_iter().flatten() {
            let mut copy = row.clone();
            copy.set_value(*t2 as i64);
            out.push(Node::List(copy));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pl::{emit_list_inline, parse};

    /// No cross table is installed, so characters fall back to their
    /// `U`/`H` hex spellings, keeping the expectations printable.
    fn cfg() -> Config {
        Config {
            external_enc: crate::jcode::External::ShiftJis,
            internal_enc: crate::jcode::Internal::Unicode,
            ..Default::default()
        }
    }

    fn divide_source(source: &[u8]) -> Result<Divided, Error> {
        divide(&parse(source, &cfg()).unwrap(), &cfg())
    }

    fn lines(file: &PlFile) -> Vec<String> {
        file.0
            .iter()
            .map(|l| emit_list_inline(l, &cfg()).unwrap())
            .collect()
    }

    /// A composite with a two-code codespace, a default type and one
    /// class type.
    const SMALL: &[u8] = b"(DESIGNSIZE R 10.0)(CHECKSUM O 123)\
        (VTITLE test)(MAPFONT D 0 (FONTNAME rmlv))\
        (CODESPACE (CTRANGE H 2121 H 2124))\
        (TYPE D 0 (CHARWD R 1.0) (MAP (SETCHAR)))\
        (TYPE D 1 (CHARWD R 0.5) (MAP (SELECTFONT D 0) (SETCHAR)))\
        (CHARSINTYPE D 1 X2123 X2124)";

    #[test]
    fn both_properties_land_on_both_sides() {
        let got = divide_source(SMALL).unwrap();
        for half in [&got.vf, &got.jfm] {
            assert!(half.child("DESIGNSIZE").is_some());
            assert!(half.child("CHECKSUM").is_some());
        }
        assert!(got.vf.child("VTITLE").is_some());
        assert!(got.vf.child("MAPFONT").is_some());
        assert!(got.jfm.child("VTITLE").is_none());
        assert!(got.jfm.child("CODESPACE").is_some());
    }

    #[test]
    fn packets_take_their_width_from_their_type() {
        let got = divide_source(SMALL).unwrap();
        let packets: Vec<String> = lines(&got.vf)
            .into_iter()
            .filter(|l| l.starts_with("(CHARACTER"))
            .collect();
        assert_eq!(
            packets,
            vec![
                "(CHARACTER H 2121 (CHARWD R 1.0) (MAP (SETCHAR)))",
                "(CHARACTER H 2122 (CHARWD R 1.0) (MAP (SETCHAR)))",
                "(CHARACTER H 2123 (CHARWD R 0.5) (MAP (SELECTFONT D 0) (SETCHAR)))",
                "(CHARACTER H 2124 (CHARWD R 0.5) (MAP (SELECTFONT D 0) (SETCHAR)))",
            ]
        );
    }

    #[test]
    fn jfm_types_lose_their_mappings() {
        let got = divide_source(SMALL).unwrap();
        for ty in got.jfm.children("TYPE") {
            assert!(ty.child("MAP").is_none());
            assert!(ty.child("CHARWD").is_some());
        }
    }

    /// The migration scenario: a subtype that disagrees on width moves to
    /// a freshly allocated type, taking its characters and duplicating
    /// the glue/kern rows that name its old parent.
    const MIGRATING: &[u8] = b"(DESIGNSIZE R 10.0)\
        (CODESPACE (CTRANGE H 2121 H 2124))\
        (TYPE D 0 (CHARWD R 1.0))\
        (TYPE D 1 (CHARWD R 0.5) (MAP (SETCHAR)))\
        (CHARSINTYPE D 1 X2121 X2122 X2123)\
        (SUBTYPE D 1 D 1 (CHARWD R 0.7) (MAP (SELECTFONT D 1) (SETCHAR)))\
        (CHARSINSUBTYPE D 1 D 1 X2122 X2123)\
        (GLUEKERN (LABEL D 1) (KRN D 0 R 0.1) (STOP))";

    #[test]
    fn disagreeing_subtype_becomes_a_new_type() {
        let got = divide_source(MIGRATING).unwrap();
        let jfm = lines(&got.jfm);
        assert!(jfm.contains(&"(TYPE D 2 (CHARWD R 0.7))".to_string()));
        assert!(jfm.contains(&"(CHARSINTYPE D 1 U2121)".to_string()));
        assert!(jfm.contains(&"(CHARSINTYPE D 2 U2122 U2123)".to_string()));
    }

    #[test]
    fn migrated_characters_use_the_subtype_mapping_and_metrics() {
        let got = divide_source(MIGRATING).unwrap();
        let packets: Vec<String> = lines(&got.vf)
            .into_iter()
            .filter(|l| l.starts_with("(CHARACTER"))
            .collect();
        assert!(packets[1].contains("(CHARWD R 0.7) (MAP (SELECTFONT D 1) (SETCHAR))"));
        assert!(packets[2].contains("(CHARWD R 0.7)"));
    }

    #[test]
    fn gluekern_rows_naming_a_migrated_type_are_duplicated() {
        let got = divide_source(MIGRATING).unwrap();
        let gk = got.jfm.child("GLUEKERN").unwrap();
        let rows: Vec<String> = gk
            .args()
            .iter()
            .filter_map(|n| match n {
                Node::List(l) => Some(emit_list_inline(l, &cfg()).unwrap()),
                _ => None,
            })
            .collect();
        assert_eq!(
            rows,
            vec!["(LABEL D 1)", "(LABEL D 2)", "(KRN D 0 R 0.1)", "(STOP)"]
        );
    }

    #[test]
    fn second_migrant_with_same_metrics_joins_the_group() {
        let source = b"(DESIGNSIZE R 10.0)\
            (CODESPACE (CTRANGE H 2121 H 2126))\
            (TYPE D 0 (CHARWD R 1.0))\
            (TYPE D 1 (CHARWD R 0.5))\
            (CHARSINTYPE D 1 X2121 X2122 X2123)\
            (SUBTYPE D 1 D 1 (CHARWD R 0.7) (MAP (SELECTFONT D 1) (SETCHAR)))\
            (CHARSINSUBTYPE D 1 D 1 X2122)\
            (SUBTYPE D 1 D 2 (CHARWD R 0.7) (MAP (SELECTFONT D 2) (SETCHAR)))\
            (CHARSINSUBTYPE D 1 D 2 X2123)";
        let got = divide_source(source).unwrap();
        let jfm = lines(&got.jfm);
        // One new type holds both migrants' characters.
        assert!(jfm.contains(&"(TYPE D 2 (CHARWD R 0.7))".to_string()));
        assert!(jfm.contains(&"(CHARSINTYPE D 2 U2122 U2123)".to_string()));
        assert!(!jfm.iter().any(|l| l.starts_with("(TYPE D 3")));
        // Each keeps its own mapping.
        let packets: Vec<String> = lines(&got.vf)
            .into_iter()
            .filter(|l| l.starts_with("(CHARACTER"))
            .collect();
        assert!(packets[1].contains("(SELECTFONT D 1)"));
        assert!(packets[2].contains("(SELECTFONT D 2)"));
    }

    macro_rules! consistency_error_tests {
        ( $( ($name: ident, $source: expr, $want: expr, ), )+ ) => {
            $(
                #[test]
                fn $name() {
                    assert_eq!(divide_source($source).unwrap_err(), $want);
                }
            )+
        };
    }

    consistency_error_tests!(
        (
            type_without_chars,
            b"(TYPE D 0 (CHARWD R 1.0))(TYPE D 1 (CHARWD R 0.5))",
            Error::TypeWithoutChars { ty: 1 },
        ),
        (
            chars_without_type,
            b"(TYPE D 0 (CHARWD R 1.0))(CHARSINTYPE D 1 X2121)",
            Error::CharsWithoutType { ty: 1 },
        ),
        (
            subtype_outside_parent,
            b"(TYPE D 0 (CHARWD R 1.0))(TYPE D 1 (CHARWD R 0.5))\
              (CHARSINTYPE D 1 X2121)\
              (SUBTYPE D 1 D 1)(CHARSINSUBTYPE D 1 D 1 X2122)",
            Error::SubtypeOutsideParent { ty: 1, sub: 1, code: 0x2122 },
        ),
        (
            duplicate_subtype_assignment,
            b"(TYPE D 0 (CHARWD R 1.0))(TYPE D 1 (CHARWD R 0.5))\
              (CHARSINTYPE D 1 X2121)\
              (SUBTYPE D 1 D 1)(CHARSINSUBTYPE D 1 D 1 X2121)\
              (SUBTYPE D 1 D 2)(CHARSINSUBTYPE D 1 D 2 X2121)",
            Error::DuplicateSubtypeAssignment { code: 0x2121 },
        ),
        (
            code_outside_codespace,
            b"(CODESPACE (CTRANGE H 2121 H 2122))\
              (TYPE D 0 (CHARWD R 1.0))(TYPE D 1 (CHARWD R 0.5))\
              (CHARSINTYPE D 1 X3000)",
            Error::CodeOutsideCodespace { ty: 1, code: 0x3000 },
        ),
        (
            duplicate_type_assignment,
            b"(TYPE D 0 (CHARWD R 1.0))\
              (TYPE D 1 (CHARWD R 0.5))(CHARSINTYPE D 1 X2121)\
              (TYPE D 2 (CHARWD R 0.7))(CHARSINTYPE D 2 X2121)",
            Error::DuplicateTypeAssignment { code: 0x2121 },
        ),
        (
            unknown_property_is_rejected,
            b"(NOSUCH D 1)",
            Error::UnknownProperty { head: "NOSUCH".into() },
        ),
    );

    #[test]
    fn codespace_defaults_to_gl94db() {
        let source = b"(TYPE D 0 (CHARWD R 1.0))";
        let got = divide_source(source).unwrap();
        assert_eq!(got.vf.children("CHARACTER").count(), 94 * 94);
        let cs = got.jfm.child("CODESPACE").unwrap();
        assert_eq!(emit_list_inline(cs, &cfg()).unwrap(), "(CODESPACE GL94DB)");
    }
}
