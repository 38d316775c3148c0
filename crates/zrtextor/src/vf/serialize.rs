//! Encoding the ZPL tree back to VF bytes.

use super::{Error, Registers, FNT_DEF_1, ID, LONG_CHAR, POST, PRE, SHORT_DVI_MAX};
use crate::pl::{lexer, List, Node, PlFile};
use crate::{Config, Number};

/// Encode a virtual font file.
///
/// Character packets use the short form whenever the code fits in a
/// byte, the width in three bytes and the DVI program in 241; moves
/// compile to the compact register forms unless
/// [`Config::simple_move`] is set.
pub fn serialize(file: &PlFile, cfg: &Config) -> Result<Vec<u8>, Error> {
    let mut title: Vec<u8> = vec![];
    let mut checksum: u32 = 0;
    let mut design_size = Number::UNITY * 10;
    let mut fonts: Vec<&List> = vec![];
    let mut chars: Vec<&List> = vec![];
    for list in &file.0 {
        match list.head() {
            Some("VTITLE") => title = raw_text(list)?,
            Some("CHECKSUM") => {
                checksum = list.value().map(|c| c.value as u32).unwrap_or_default()
            }
            Some("DESIGNSIZE") => {
                design_size = list.value().map(|c| c.real()).unwrap_or(design_size)
            }
            Some("MAPFONT") => fonts.push(list),
            Some("CHARACTER") => chars.push(list),
            Some(head) if cfg.vf_strict => {
                return Err(Error::UnknownProperty { head: head.into() })
            }
            _ => (),
        }
    }
    if title.len() > 255 {
        return Err(Error::VtitleTooLong { len: title.len() });
    }

    let mut w = Writer { out: vec![] };
    w.u8(PRE);
    w.u8(ID);
    w.u8(title.len() as u8);
    w.out.extend_from_slice(&title);
    w.u32(checksum);
    w.i32(design_size.0);
    for font in fonts {
        font_def(font, &mut w)?;
    }
    for packet in chars {
        char_packet(packet, &mut w, cfg)?;
    }
    w.u8(POST);
    while w.out.len() % 4 != 0 {
        w.u8(POST);
    }
    Ok(w.out)
}

/// Join a list's word atoms back into the byte string they came from.
fn raw_text(list: &List) -> Result<Vec<u8>, Error> {
    let mut words = vec![];
    for node in list.args() {
        if let Node::Raw(word) | Node::Bareword(word) = node {
            match lexer::chars_to_bytes(word) {
                Some(bytes) => words.push(bytes),
                None => return Err(Error::NonByteAtom { token: word.clone() }),
            }
        }
    }
    Ok(words.join(&b' '))
}

fn font_def(font: &List, w: &mut Writer) -> Result<(), Error> {
    let number = font.value().map(|c| c.value as u32).unwrap_or_default();
    let name = match font.child("FONTNAME") {
        Some(l) => raw_text(l)?,
        None => vec![],
    };
    let area = match font.child("FONTAREA") {
        Some(l) => raw_text(l)?,
        None => vec![],
    };
    let checksum = font
        .child("FONTCHECKSUM")
        .and_then(|l| l.value())
        .map(|c| c.value as u32)
        .unwrap_or_default();
    let at = font
        .child("FONTAT")
        .and_then(|l| l.value())
        .map(|c| c.real())
        .unwrap_or(Number::UNITY);
    let design = font
        .child("FONTDSIZE")
        .and_then(|l| l.value())
        .map(|c| c.real())
        .unwrap_or(Number::UNITY * 10);
    w.u32_var(FNT_DEF_1, number);
    w.u32(checksum);
    w.i32(at.0);
    w.i32(design.0);
    let area_len = area.len().min(255);
    let name_len = name.len().min(255);
    w.u8(area_len as u8);
    w.u8(name_len as u8);
    w.out.extend_from_slice(&area[..area_len]);
    w.out.extend_from_slice(&name[..name_len]);
    Ok(())
}

fn char_packet(packet: &List, w: &mut Writer, cfg: &Config) -> Result<(), Error> {
    let code = match packet.value() {
        Some(c) => c.value as u32,
        None => return Err(Error::MissingCharacterCode),
    };
    let width = packet
        .child("CHARWD")
        .and_then(|l| l.value())
        .map(|c| c.real())
        .unwrap_or(Number::ZERO);
    let dvi = match (packet.child("DIRECTHEX"), packet.child("MAP")) {
        (Some(hex), _) => hex_bytes(hex)?,
        (None, Some(map)) => compile_map(map, code, cfg)?,
        (None, None) => vec![],
    };
    let short = code <= 0xFF && (0..=0xFFFFFF).contains(&width.0) && dvi.len() <= SHORT_DVI_MAX;
    if short {
        w.u8(dvi.len() as u8);
        w.u8(code as u8);
        w.out.extend_from_slice(&width.0.to_be_bytes()[1..]);
    } else {
        w.u8(LONG_CHAR);
        w.u32(dvi.len() as u32);
        w.u32(code);
        w.i32(width.0);
    }
    w.out.extend_from_slice(&dvi);
    Ok(())
}

fn hex_bytes(list: &List) -> Result<Vec<u8>, Error> {
    let mut digits = String::new();
    for node in list.args() {
        if let Node::Raw(word) | Node::Bareword(word) = node {
            digits.push_str(word);
        }
    }
    let bad = || Error::BadHex {
        token: digits.clone(),
    };
    if digits.len() % 2 != 0 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(bad());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| bad()))
        .collect()
}

/// Compile a `MAP` list into DVI bytes, tracking the move registers per
/// push/pop frame.
fn compile_map(map: &List, own_code: u32, cfg: &Config) -> Result<Vec<u8>, Error> {
    let mut w = DviWriter {
        w: Writer { out: vec![] },
        frames: vec![Registers::default()],
        cfg,
        own_code,
    };
    for node in map.args() {
        if let Node::List(op) = node {
            w.op(op)?;
        }
    }
    Ok(w.w.out)
}

struct DviWriter<'a> {
    w: Writer,
    frames: Vec<Registers>,
    cfg: &'a Config,
    own_code: u32,
}

impl DviWriter<'_> {
    fn op(&mut self, l: &List) -> Result<(), Error> {
        let head = l.head().unwrap_or_default();
        let arg = |n: usize| -> Result<Number, Error> {
            l.nth_value(n).map(|c| c.real()).ok_or(Error::MissingMapArgument {
                head: head.to_string(),
            })
        };
        match head {
            "SETCHAR" => {
                let code = l.value().map(|c| c.value as u32).unwrap_or(self.own_code);
                self.set_char(code);
            }
            "SETRULE" => {
                let height = arg(0)?;
                let width = arg(1)?;
                self.w.u8(132);
                self.w.i32(height.0);
                self.w.i32(width.0);
            }
            "PUSH" => {
                self.frames.push(Registers::default());
                self.w.u8(141);
            }
            "POP" => {
                if self.frames.len() == 1 {
                    return Err(Error::PopWithoutPush);
                }
                self.frames.pop();
                self.w.u8(142);
            }
            "MOVERIGHT" => {
                let v = arg(0)?;
                self.hmove(v.0);
            }
            "MOVELEFT" => {
                let v = arg(0)?;
                self.hmove(-v.0);
            }
            "MOVEDOWN" => {
                let v = arg(0)?;
                self.vmove(v.0);
            }
            "MOVEUP" => {
                let v = arg(0)?;
                self.vmove(-v.0);
            }
            "SELECTFONT" => {
                let n = l.value().map(|c| c.value as u32).ok_or(
                    Error::MissingMapArgument { head: head.into() },
                )?;
                match u8::try_from(n) {
                    Ok(u @ 0..=63) => self.w.u8(171 + u),
                    _ => self.w.u32_var(235, n),
                }
            }
            "SPECIAL" => {
                let mut payload = String::new();
                for node in l.args() {
                    if !payload.is_empty() {
                        payload.push(' ');
                    }
                    match node {
                        Node::List(sub) => payload.push_str(
                            &crate::pl::emit_list_inline(sub, self.cfg)
                                .map_err(|_| Error::BadSpecialPayload)?,
                        ),
                        Node::Raw(word) | Node::Bareword(word) => payload.push_str(word),
                        Node::Cooked(_) => return Err(Error::BadSpecialPayload),
                    }
                }
                let bytes = lexer::chars_to_bytes(&payload)
                    .ok_or(Error::BadSpecialPayload)?;
                self.w.u32_var(239, bytes.len() as u32);
                self.w.out.extend_from_slice(&bytes);
            }
            "SPECIALHEX" => {
                let bytes = hex_bytes(l)?;
                self.w.u32_var(239, bytes.len() as u32);
                self.w.out.extend_from_slice(&bytes);
            }
            "DIR" => {
                let n = l.value().map(|c| c.value).unwrap_or_default();
                self.w.u8(255);
                self.w.u8(n as u8);
            }
            _ if self.cfg.vf_strict => {
                return Err(Error::UnknownMapOp { head: head.into() })
            }
            _ => (),
        }
        Ok(())
    }

    fn set_char(&mut self, code: u32) {
        match u8::try_from(code) {
            Ok(u @ 0..=127) => self.w.u8(u),
            _ => self.w.u32_var(128, code),
        }
    }

    /// Pick the shortest encoding for a horizontal move: set-and-load
    /// `w` when it is unset in this frame, the one-byte reuse when it
    /// already holds the value, then the same two cases for `x`, then
    /// the plain form.
    fn hmove(&mut self, v: i32) {
        if self.cfg.simple_move {
            return self.w.i32_var(143, v);
        }
        let frame = self.frames.last_mut().unwrap();
        match frame.w {
            None => {
                frame.w = Some(v);
                self.w.i32_var(148, v);
            }
            Some(w) if w == v => self.w.u8(147),
            _ => match frame.x {
                None => {
                    frame.x = Some(v);
                    self.w.i32_var(153, v);
                }
                Some(x) if x == v => self.w.u8(152),
                _ => self.w.i32_var(143, v),
            },
        }
    }

    fn vmove(&mut self, v: i32) {
        if self.cfg.simple_move {
            return self.w.i32_var(157, v);
        }
        let frame = self.frames.last_mut().unwrap();
        match frame.y {
            None => {
                frame.y = Some(v);
                self.w.i32_var(162, v);
            }
            Some(y) if y == v => self.w.u8(161),
            _ => match frame.z {
                None => {
                    frame.z = Some(v);
                    self.w.i32_var(167, v);
                }
                Some(z) if z == v => self.w.u8(166),
                _ => self.w.i32_var(157, v),
            },
        }
    }
}

struct Writer {
    out: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, u: u8) {
        self.out.push(u);
    }
    fn u32(&mut self, u: u32) {
        self.out.extend_from_slice(&u.to_be_bytes());
    }
    fn i32(&mut self, i: i32) {
        self.out.extend_from_slice(&i.to_be_bytes());
    }
    /// The shortest 1-4 byte unsigned form, opcodes `min_op_code` up.
    fn u32_var(&mut self, min_op_code: u8, u: u32) {
        let [b1, b2, b3, b4] = u.to_be_bytes();
        let b = &mut self.out;
        if b1 != 0 {
            b.push(min_op_code + 3);
            b.push(b1);
            b.push(b2);
            b.push(b3);
        } else if b2 != 0 {
            b.push(min_op_code + 2);
            b.push(b2);
            b.push(b3);
        } else if b3 != 0 {
            b.push(min_op_code + 1);
            b.push(b3);
        } else {
            b.push(min_op_code);
        }
        b.push(b4);
    }
    /// The shortest 1-4 byte signed two's-complement form.
    fn i32_var(&mut self, min_op_code: u8, i: i32) {
        let b = &mut self.out;
        if let Ok(i) = TryInto::<i8>::try_into(i) {
            b.push(min_op_code);
            b.push(i.to_be_bytes()[0]);
            return;
        }
        if let Ok(i) = TryInto::<i16>::try_into(i) {
            b.push(min_op_code + 1);
            b.extend_from_slice(&i.to_be_bytes());
            return;
        }
        let is_3_byte = (-(1 << 23)..(1 << 23)).contains(&i);
        let [b1, b2, b3, b4] = if is_3_byte && i < 0 {
            // Fold the sign into the top of a 24-bit two's complement.
            (i as u32 - 0xFF00_0000).to_be_bytes()
        } else {
            i.to_be_bytes()
        };
        if is_3_byte {
            b.push(min_op_code + 2);
        } else {
            b.push(min_op_code + 3);
            b.push(b1);
        }
        b.push(b2);
        b.push(b3);
        b.push(b4);
    }
}

#[cfg(test)]
mod tests {
    use super::super::deserialize;
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    fn preamble(title: &[u8]) -> Vec<u8> {
        let mut b = vec![PRE, ID, title.len() as u8];
        b.extend_from_slice(title);
        b.extend(0_u32.to_be_bytes());
        b.extend((10_u32 << 20).to_be_bytes());
        b
    }

    fn pad(b: &mut Vec<u8>) {
        b.push(POST);
        while b.len() % 4 != 0 {
            b.push(POST);
        }
    }

    fn parse(source: &[u8]) -> PlFile {
        crate::pl::parse(source, &cfg()).unwrap()
    }

    #[test]
    fn preamble_and_font_definition() {
        let file = parse(
            b"(VTITLE)(CHECKSUM O 0)(DESIGNSIZE R 10.0)\
              (MAPFONT D 0 (FONTNAME foo) (FONTCHECKSUM O 0) (FONTAT R 1.0) (FONTDSIZE R 10.0))",
        );
        let mut want = preamble(b"");
        want.push(FNT_DEF_1);
        want.push(0);
        want.extend(0_u32.to_be_bytes());
        want.extend((1_u32 << 20).to_be_bytes());
        want.extend((10_u32 << 20).to_be_bytes());
        want.push(0);
        want.push(3);
        want.extend(b"foo");
        pad(&mut want);
        assert_eq!(serialize(&file, &cfg()).unwrap(), want);
    }

    #[test]
    fn moves_compile_to_register_forms() {
        let file = parse(
            b"(CHARACTER C A (CHARWD R 1.0) (MAP \
                (MOVERIGHT R 0.0) (MOVERIGHT R 0.0) \
                (MOVERIGHT R 0.5) (MOVERIGHT R 0.0) (MOVERIGHT R 0.5) \
                (SETCHAR)))",
        );
        let got = serialize(&file, &cfg()).unwrap();
        let dvi_start = preamble(b"").len() + 5;
        // w1 0; w0; x3 0.5; w0; x0; setchar(own code)
        let want = [148, 0, 147, 155, 8, 0, 0, 147, 152, 65];
        assert_eq!(&got[dvi_start..dvi_start + want.len()], &want);
    }

    #[test]
    fn push_opens_a_fresh_register_frame() {
        let file = parse(
            b"(CHARACTER C A (CHARWD R 1.0) (MAP \
                (MOVERIGHT R 0.0) (PUSH) (MOVERIGHT R 0.0) (POP) (MOVERIGHT R 0.0)))",
        );
        let got = serialize(&file, &cfg()).unwrap();
        let dvi_start = preamble(b"").len() + 5;
        // The inner frame cannot reuse the outer w.
        let want = [148, 0, 141, 148, 0, 142, 147];
        assert_eq!(&got[dvi_start..dvi_start + want.len()], &want);
    }

    #[test]
    fn simple_move_mode_forces_plain_encodings() {
        let mut cfg = cfg();
        cfg.simple_move = true;
        let file = parse(
            b"(CHARACTER C A (CHARWD R 1.0) (MAP (MOVERIGHT R 0.0) (MOVERIGHT R 0.0)))",
        );
        let got = serialize(&file, &cfg).unwrap();
        let dvi_start = preamble(b"").len() + 5;
        let want = [143, 0, 143, 0];
        assert_eq!(&got[dvi_start..dvi_start + want.len()], &want);
    }

    #[test]
    fn code_three_hundred_uses_the_long_form() {
        let file = parse(b"(CHARACTER H 12C (CHARWD R 0.5) (MAP (SETCHAR)))");
        let got = serialize(&file, &cfg()).unwrap();
        let packet = &got[preamble(b"").len()..];
        assert_eq!(packet[0], LONG_CHAR);
        assert_eq!(&packet[1..5], &3_u32.to_be_bytes());
        assert_eq!(&packet[5..9], &300_u32.to_be_bytes());
        // setchar falls back to the two-byte form for codes above 255.
        assert_eq!(&packet[13..16], &[129, 1, 44]);
    }

    #[test]
    fn negative_width_uses_the_long_form() {
        let file = parse(b"(CHARACTER C A (CHARWD R -0.5))");
        let got = serialize(&file, &cfg()).unwrap();
        assert_eq!(got[preamble(b"").len()], LONG_CHAR);
    }

    #[test]
    fn vtitle_over_255_bytes_is_an_error() {
        let mut source = b"(VTITLE ".to_vec();
        source.extend(std::iter::repeat(b'x').take(300));
        source.push(b')');
        let file = parse(&source);
        assert_eq!(
            serialize(&file, &cfg()),
            Err(Error::VtitleTooLong { len: 300 })
        );
    }

    #[test]
    fn unknown_property_is_strict_error_or_dropped() {
        let file = parse(b"(WHATEVER D 1)");
        assert_eq!(
            serialize(&file, &cfg()),
            Err(Error::UnknownProperty {
                head: "WHATEVER".into()
            })
        );
        let mut lax = cfg();
        lax.vf_strict = false;
        let got = serialize(&file, &lax).unwrap();
        assert_eq!(got.len(), preamble(b"").len() + 1);
    }

    #[test]
    fn round_trips_canonically_produced_files() {
        let mut b = preamble(b"test title");
        b.push(FNT_DEF_1);
        b.push(0);
        b.extend(0x89AB_CDEF_u32.to_be_bytes());
        b.extend((1_u32 << 20).to_be_bytes());
        b.extend((10_u32 << 20).to_be_bytes());
        b.push(0);
        b.push(4);
        b.extend(b"min8");
        // Short packet: selectfont, w moves, push/pop, setchar, dir.
        let dvi = [
            171, 148, 10, 147, 141, 162, 5, 161, 142, 132, 0, 0, 64, 0, 0, 1, 0, 0, 65, 255, 1,
        ];
        b.push(dvi.len() as u8);
        b.push(65);
        b.extend(&(1_u32 << 20).to_be_bytes()[1..]);
        b.extend(dvi);
        // Long packet with a special.
        let dvi2 = [239, 7, 40, 80, 68, 70, 32, 120, 41]; // "(PDF x)"
        b.push(LONG_CHAR);
        b.extend((dvi2.len() as u32).to_be_bytes());
        b.extend(300_u32.to_be_bytes());
        b.extend((1_u32 << 19).to_be_bytes());
        b.extend(dvi2);
        pad(&mut b);
        let tree = deserialize(&b, &cfg()).unwrap();
        assert_eq!(serialize(&tree, &cfg()).unwrap(), b);
    }
}
