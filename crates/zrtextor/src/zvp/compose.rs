//! Reassembling a composite ZVP tree from a VF half and a JFM half.

use super::{category, Category, Error};
use crate::charlist::{self, Charlist};
use crate::pl::{emit_list_inline, rearrange, List, Node, PlFile, Prefix};
use crate::Config;
use std::collections::BTreeMap;

/// Compose a VF tree and a JFM tree back into one composite.
///
/// Per type, the character packets' mappings are bucketed (after
/// contracting a `SETCHAR` of the packet's own code to a bare
/// `SETCHAR`): the most frequent mapping becomes the type's, mappings
/// shared by more than one character become subtypes, and the rest stay
/// as per-character entries.
pub fn compose(vf: &PlFile, jfm: &PlFile, cfg: &Config) -> Result<PlFile, Error> {
    let mut out = PlFile::default();
    let mut vf_checksum: Option<i64> = None;
    let mut jfm_checksum: Option<i64> = None;
    let mut vf_design: Option<i64> = None;
    let mut jfm_design: Option<i64> = None;

    let mut types: BTreeMap<u8, List> = BTreeMap::new();
    let mut cit: BTreeMap<u8, Charlist> = BTreeMap::new();
    let mut cit_lists: Vec<List> = vec![];
    let mut extras: Vec<List> = vec![];
    let mut codespace: Option<Charlist> = None;
    for list in &jfm.0 {
        let head = list.head().unwrap_or_default();
        match head {
            "CHECKSUM" => jfm_checksum = list.value().map(|c| c.value),
            "DESIGNSIZE" => jfm_design = list.value().map(|c| c.value),
            "TYPE" => {
                types.insert(super::divide::index_of(list)?, list.clone());
            }
            "CHARSINTYPE" => {
                let t = super::divide::index_of(list)?;
                let members =
                    Charlist::from_nodes(list.args().get(1..).unwrap_or(&[]), cfg)?;
                let merged = match cit.remove(&t) {
                    Some(old) => old.union(&members),
                    None => members,
                };
                cit.insert(t, merged);
                cit_lists.push(list.clone());
            }
            "GLUEKERN" => extras.push(list.clone()),
            "CODESPACE" => codespace = Some(super::divide::parse_codespace(list, cfg)?),
            _ if category(head) == Category::JfmOnly => out.push(list.clone()),
            _ if cfg.vf_strict => {
                return Err(Error::UnknownProperty { head: head.into() })
            }
            _ => (),
        }
    }

    let mut chdsc: BTreeMap<u32, &List> = BTreeMap::new();
    for list in &vf.0 {
        let head = list.head().unwrap_or_default();
        match head {
            "CHECKSUM" => vf_checksum = list.value().map(|c| c.value),
            "DESIGNSIZE" => vf_design = list.value().map(|c| c.value),
            "CHARACTER" => {
                let code = list
                    .value()
                    .map(|c| c.value as u32)
                    .ok_or(Error::MissingIndex { head: head.into() })?;
                chdsc.insert(code, list);
            }
            _ if category(head) == Category::VfOnly => out.push(list.clone()),
            _ if cfg.vf_strict => {
                return Err(Error::UnknownProperty { head: head.into() })
            }
            _ => (),
        }
    }

    // Both-sided properties must agree; a zero checksum on either side
    // defers to the other.
    let checksum = match (vf_checksum, jfm_checksum) {
        (Some(a), Some(b)) if a != b && a != 0 && b != 0 => {
            return Err(Error::ChecksumMismatch {
                vf: a as u32,
                jfm: b as u32,
            })
        }
        (a, b) => a.filter(|v| *v != 0).or(b),
    };
    if let Some(checksum) = checksum {
        out.push(List::new("CHECKSUM").with_number(Prefix::O, checksum));
    }
    let design = match (vf_design, jfm_design) {
        (Some(a), Some(b)) if a != b => return Err(Error::DesignSizeMismatch),
        (a, b) => a.or(b),
    };
    if let Some(design) = design {
        out.push(List::new("DESIGNSIZE").with_number(Prefix::R, design));
    }

    let codespace = codespace.unwrap_or_else(|| charlist::named("GL94DB").unwrap());
    let mut code_type: BTreeMap<u32, u8> = BTreeMap::new();
    for (t, members) in &cit {
        for code in members.codes() {
            if code_type.insert(code, *t).is_some() {
                return Err(Error::DuplicateTypeAssignment { code });
            }
        }
    }

    for (t, ty) in &types {
        let codes: Vec<u32> = match *t {
            0 => codespace
                .codes()
                .into_iter()
                .filter(|c| !code_type.contains_key(c))
                .collect(),
            _ => cit.get(t).map(|cl| cl.codes()).unwrap_or_default(),
        };
        let ty_width = ty.child("CHARWD").and_then(|l| l.value()).map(|c| c.value);

        // Bucket the codes by the serialized form of their mapping.
        let mut buckets: Vec<(String, Option<List>, Vec<u32>)> = vec![];
        for code in codes {
            let packet = match chdsc.get(&code) {
                Some(packet) => *packet,
                None if cfg.vf_strict => return Err(Error::MissingCharPacket { code }),
                None => continue,
            };
            let packet_width = packet
                .child("CHARWD")
                .and_then(|l| l.value())
                .map(|c| c.value);
            if let (Some(a), Some(b)) = (ty_width, packet_width) {
                if a != b {
                    if cfg.vf_strict {
                        return Err(Error::WidthMismatch { code });
                    }
                    continue;
                }
            }
            let map = packet
                .child("MAP")
                .map(|m| contract_selfcode(m, code))
                .or_else(|| packet.child("DIRECTHEX").cloned());
            let key = match &map {
                Some(m) => emit_list_inline(m, cfg).unwrap_or_default(),
                None => String::new(),
            };
            match buckets.iter_mut().find(|(k, _, _)| *k == key) {
                Some((_, _, members)) => members.push(code),
                None => buckets.push((key, map, vec![code])),
            }
        }
        buckets.sort_by_key(|(_, _, members)| std::cmp::Reverse(members.len()));

        let mut ty_out = ty.clone();
        let mut rest = buckets.into_iter();
        if let Some((_, Some(map), _)) = rest.next() {
            ty_out.push(Node::List(map));
        }
        out.push(ty_out);

        let mut sub = 1_u16;
        for (_, map, members) in rest {
            if members.len() > 1 && sub < 256 {
                let mut sub_list = List::new("SUBTYPE")
                    .with_number(Prefix::D, *t as i64)
                    .with_number(Prefix::D, sub as i64);
                if let Some(map) = &map {
                    sub_list.push(Node::List(map.clone()));
                }
                out.push(sub_list);
                let mut members_list = List::new("CHARSINSUBTYPE")
                    .with_number(Prefix::D, *t as i64)
                    .with_number(Prefix::D, sub as i64);
                for node in Charlist::from_codes(members).to_nodes(cfg) {
                    members_list.push(node);
                }
                out.push(members_list);
                sub += 1;
            } else {
                for code in members {
                    let mut packet = List::new("CHARACTER")
                        .with_number(super::divide::code_prefix(code), code as i64);
                    if let Some(map) = &map {
                        packet.push(Node::List(map.clone()));
                    }
                    out.push(packet);
                }
            }
        }
    }

    let mut cs = List::new("CODESPACE");
    for node in codespace.to_nodes(cfg) {
        cs.push(node);
    }
    out.push(cs);
    for list in cit_lists {
        out.push(list);
    }
    for list in extras {
        out.push(list);
    }
    rearrange(&mut out);
    Ok(out)
}

/// Replace a `SETCHAR` of the packet's own code with a bare `SETCHAR`.
/// Push/pop nesting is deliberately not considered.
fn contract_selfcode(map: &List, code: u32) -> List {
    let mut map = map.clone();
    for node in &mut map.0 {
        if let Node::List(op) = node {
            if op.head() == Some("SETCHAR")
                && op.value().map(|c| c.value) == Some(code as i64)
            {
                op.0.retain(|n| !matches!(n, Node::Cooked(_)));
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::super::divide::divide;
    use super::*;
    use crate::pl::parse;

    fn cfg() -> Config {
        Config {
            external_enc: crate::jcode::External::ShiftJis,
            internal_enc: crate::jcode::Internal::Unicode,
            ..Default::default()
        }
    }

    fn lines(file: &PlFile) -> Vec<String> {
        file.0
            .iter()
            .map(|l| emit_list_inline(l, &cfg()).unwrap())
            .collect()
    }

    /// A composite whose structure survives a divide/compose round trip:
    /// the type mapping is carried by most of its characters, one
    /// subtype covers two, and the subtypes agree with their parents on
    /// metrics.
    const CANONICAL: &[u8] = b"(CHECKSUM O 123)(DESIGNSIZE R 10.0)\
        (VTITLE test)(MAPFONT D 0 (FONTNAME rmlv))(MAPFONT D 1 (FONTNAME grlv))\
        (CODESPACE (CTRANGE H 2121 H 2129))\
        (TYPE D 0 (CHARWD R 1.0) (MAP (SETCHAR)))\
        (TYPE D 1 (CHARWD R 0.5) (MAP (SELECTFONT D 1) (SETCHAR)))\
        (CHARSINTYPE D 1 U2121 U2122 U2123 U2124 U2125)\
        (SUBTYPE D 1 D 1 (MAP (SELECTFONT D 1) (MOVEDOWN R 0.1) (SETCHAR)))\
        (CHARSINSUBTYPE D 1 D 1 U2124 U2125)";

    #[test]
    fn compose_inverts_divide() {
        let cfg = cfg();
        let z = parse(CANONICAL, &cfg).unwrap();
        let divided = divide(&z, &cfg).unwrap();
        let composed = compose(&divided.vf, &divided.jfm, &cfg).unwrap();
        let mut canonical = z.clone();
        rearrange(&mut canonical);
        assert_eq!(lines(&composed), lines(&canonical));
    }

    #[test]
    fn compose_is_idempotent_with_divide() {
        let cfg = cfg();
        let z = parse(CANONICAL, &cfg).unwrap();
        let divided = divide(&z, &cfg).unwrap();
        let composed = compose(&divided.vf, &divided.jfm, &cfg).unwrap();
        let divided_again = divide(&composed, &cfg).unwrap();
        assert_eq!(lines(&divided.vf), lines(&divided_again.vf));
        assert_eq!(lines(&divided.jfm), lines(&divided_again.jfm));
    }

    #[test]
    fn singleton_mappings_stay_per_character() {
        let cfg = cfg();
        let vf = parse(
            b"(CHARACTER H 2121 (CHARWD R 1.0) (MAP (SETCHAR)))\
              (CHARACTER H 2122 (CHARWD R 1.0) (MAP (SETCHAR)))\
              (CHARACTER H 2123 (CHARWD R 1.0) (MAP (SELECTFONT D 1) (SETCHAR)))",
            &cfg,
        )
        .unwrap();
        let jfm = parse(
            b"(CODESPACE (CTRANGE H 2121 H 2123))(TYPE D 0 (CHARWD R 1.0))",
            &cfg,
        )
        .unwrap();
        let got = compose(&vf, &jfm, &cfg).unwrap();
        let got = lines(&got);
        assert!(got.contains(&"(TYPE D 0 (CHARWD R 1.0) (MAP (SETCHAR)))".to_string()));
        assert!(got
            .contains(&"(CHARACTER H 2123 (MAP (SELECTFONT D 1) (SETCHAR)))".to_string()));
    }

    #[test]
    fn selfcode_contraction_merges_explicit_setchars() {
        let cfg = cfg();
        // Each packet names its own code explicitly; contraction makes
        // the mappings identical, so one type mapping covers both.
        let vf = parse(
            b"(CHARACTER H 2121 (CHARWD R 1.0) (MAP (SETCHAR H 2121)))\
              (CHARACTER H 2122 (CHARWD R 1.0) (MAP (SETCHAR H 2122)))",
            &cfg,
        )
        .unwrap();
        let jfm = parse(
            b"(CODESPACE (CTRANGE H 2121 H 2122))(TYPE D 0 (CHARWD R 1.0))",
            &cfg,
        )
        .unwrap();
        let got = compose(&vf, &jfm, &cfg).unwrap();
        let got = lines(&got);
        assert!(got.contains(&"(TYPE D 0 (CHARWD R 1.0) (MAP (SETCHAR)))".to_string()));
        assert!(!got.iter().any(|l| l.starts_with("(CHARACTER")));
    }

    #[test]
    fn checksum_zero_defers_to_the_other_side() {
        let cfg = cfg();
        let vf = parse(b"(CHECKSUM O 0)", &cfg).unwrap();
        let jfm = parse(b"(CHECKSUM O 456)(TYPE D 0 (CHARWD R 1.0))", &cfg).unwrap();
        let mut lax = cfg.clone();
        lax.vf_strict = false;
        let got = compose(&vf, &jfm, &lax).unwrap();
        assert_eq!(
            got.child("CHECKSUM").unwrap().value().unwrap().value,
            0o456
        );
    }

    #[test]
    fn conflicting_checksums_are_rejected() {
        let cfg = cfg();
        let vf = parse(b"(CHECKSUM O 1)", &cfg).unwrap();
        let jfm = parse(b"(CHECKSUM O 2)", &cfg).unwrap();
        assert_eq!(
            compose(&vf, &jfm, &cfg),
            Err(Error::ChecksumMismatch { vf: 1, jfm: 2 })
        );
    }

    #[test]
    fn width_mismatch_is_strict_error() {
        let cfg = cfg();
        let vf = parse(b"(CHARACTER H 2121 (CHARWD R 0.7))", &cfg).unwrap();
        let jfm = parse(
            b"(CODESPACE (CTRANGE H 2121 H 2121))(TYPE D 0 (CHARWD R 1.0))",
            &cfg,
        )
        .unwrap();
        assert_eq!(
            compose(&vf, &jfm, &cfg),
            Err(Error::WidthMismatch { code: 0x2121 })
        );
    }

    #[test]
    fn missing_packet_is_strict_error() {
        let cfg = cfg();
        let vf = PlFile::default();
        let jfm = parse(
            b"(CODESPACE (CTRANGE H 2121 H 2121))(TYPE D 0 (CHARWD R 1.0))",
            &cfg,
        )
        .unwrap();
        assert_eq!(
            compose(&vf, &jfm, &cfg),
            Err(Error::MissingCharPacket { code: 0x2121 })
        );
        let mut lax = cfg.clone();
        lax.vf_strict = false;
        assert!(compose(&vf, &jfm, &lax).is_ok());
    }
}
