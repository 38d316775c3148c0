//! Decoding VF bytes into the ZPL tree.

use super::{Error, Registers, FNT_DEF_1, ID, LONG_CHAR, POST, PRE};
use crate::pl::{lexer, Cooked, List, Node, PlFile, Prefix};
use crate::{Config, Number};

/// Decode a virtual font file.
///
/// In strict mode an undecodable DVI program is an error; otherwise it is
/// preserved as a `DIRECTHEX` atom so the packet still round-trips.
pub fn deserialize(b: &[u8], cfg: &Config) -> Result<PlFile, Error> {
    let mut r = Reader { b, position: 0 };
    let mut file = PlFile::default();

    if r.u8()? != PRE || r.u8()? != ID {
        return Err(Error::NotAVirtualFont);
    }
    let k = r.u8()? as usize;
    let title = r.bytes(k)?.to_vec();
    let checksum = r.u32()?;
    let design_size = r.u32()? as i32;

    let mut vtitle = List::new("VTITLE");
    for word in lexer::bytes_to_chars(&title).split(' ') {
        if !word.is_empty() {
            vtitle.push(Node::Raw(word.into()));
        }
    }
    file.push(vtitle);
    file.push(List::new("CHECKSUM").with_number(Prefix::O, checksum as i64));
    file.push(List::new("DESIGNSIZE").with_real(Number(design_size)));

    // Stage 1 accepts font definitions and character packets; the first
    // character packet moves to stage 2, where only packets may appear;
    // the postamble byte moves to stage 3.
    let mut seen_char = false;
    loop {
        let position = r.position;
        let op = match r.u8() {
            Ok(op) => op,
            Err(_) => return Err(Error::Truncated { position }),
        };
        match op {
            0..=241 => {
                seen_char = true;
                let pl = op as usize;
                let code = r.u8()? as u32;
                let width = r.u24()? as i32;
                let dvi = r.bytes(pl)?.to_vec();
                file.push(char_packet(code, Number(width), &dvi, position, cfg)?);
            }
            LONG_CHAR => {
                seen_char = true;
                let pl = r.u32()? as usize;
                let code = r.u32()?;
                let width = r.u32()? as i32;
                let dvi = r.bytes(pl)?.to_vec();
                file.push(char_packet(code, Number(width), &dvi, position, cfg)?);
            }
            FNT_DEF_1..=246 => {
                if seen_char {
                    return Err(Error::LateFontDefinition { position });
                }
                let number = r.unsigned((op - FNT_DEF_1 + 1) as usize)?;
                let checksum = r.u32()?;
                let at = r.u32()? as i32;
                let design = r.u32()? as i32;
                let area_len = r.u8()? as usize;
                let name_len = r.u8()? as usize;
                let area = r.bytes(area_len)?.to_vec();
                let name = r.bytes(name_len)?.to_vec();
                let mut map_font =
                    List::new("MAPFONT").with_number(Prefix::D, number as i64);
                map_font.push(Node::List(
                    List::new("FONTNAME").with_raw(&lexer::bytes_to_chars(&name)),
                ));
                if !area.is_empty() {
                    map_font.push(Node::List(
                        List::new("FONTAREA").with_raw(&lexer::bytes_to_chars(&area)),
                    ));
                }
                map_font.push(Node::List(
                    List::new("FONTCHECKSUM").with_number(Prefix::O, checksum as i64),
                ));
                map_font.push(Node::List(List::new("FONTAT").with_real(Number(at))));
                map_font.push(Node::List(List::new("FONTDSIZE").with_real(Number(design))));
                file.push(map_font);
            }
            POST => {
                while !r.done() {
                    let position = r.position;
                    if r.u8()? != POST {
                        return Err(Error::BadPostamble { position });
                    }
                }
                break;
            }
            _ => return Err(Error::UnexpectedByte { byte: op, position }),
        }
    }
    Ok(file)
}

fn char_packet(
    code: u32,
    width: Number,
    dvi: &[u8],
    position: usize,
    cfg: &Config,
) -> Result<List, Error> {
    let prefix = if code <= 0xFF { Prefix::C } else { Prefix::K };
    let mut packet = List::new("CHARACTER").with_number(prefix, code as i64);
    packet.push(Node::List(List::new("CHARWD").with_real(width)));
    match parse_dvi(dvi, cfg) {
        Ok(map) => packet.push(Node::List(map)),
        Err(()) if cfg.vf_strict => return Err(Error::InvalidDvi { code, position }),
        Err(()) => {
            packet.push(Node::List(
                List::new("DIRECTHEX").with_raw(&hex_atom(dvi)),
            ));
        }
    }
    Ok(packet)
}

fn hex_atom(bytes: &[u8]) -> String {
    bytes.iter().map(|u| format!("{u:02X}")).collect()
}

fn char_node(code: u32) -> Node {
    let prefix = if code <= 0xFF { Prefix::C } else { Prefix::K };
    Node::Cooked(Cooked::new(prefix, code as i64))
}

/// The DVI sub-parser. Rejection is reported without detail: the caller
/// either falls back to `DIRECTHEX` or reports the packet as invalid.
fn parse_dvi(dvi: &[u8], cfg: &Config) -> Result<List, ()> {
    let mut r = Reader {
        b: dvi,
        position: 0,
    };
    let mut frames = vec![Registers::default()];
    let mut map = List::new("MAP");
    while !r.done() {
        let op = r.u8().map_err(|_| ())?;
        let node = match op {
            0..=127 => List::new("SETCHAR").with(char_node(op as u32)),
            128..=131 => {
                let code = r.unsigned((op - 127) as usize).map_err(|_| ())?;
                List::new("SETCHAR").with(char_node(code))
            }
            132 => {
                let height = r.i32().map_err(|_| ())?;
                let width = r.i32().map_err(|_| ())?;
                List::new("SETRULE")
                    .with_real(Number(height))
                    .with_real(Number(width))
            }
            141 => {
                frames.push(Registers::default());
                List::new("PUSH")
            }
            142 => {
                if frames.len() == 1 {
                    return Err(());
                }
                frames.pop();
                List::new("POP")
            }
            143..=146 => {
                let v = r.signed((op - 142) as usize).map_err(|_| ())?;
                hmove(v)
            }
            147 => hmove(frames.last().unwrap().w.ok_or(())?),
            148..=151 => {
                let v = r.signed((op - 147) as usize).map_err(|_| ())?;
                frames.last_mut().unwrap().w = Some(v);
                hmove(v)
            }
            152 => hmove(frames.last().unwrap().x.ok_or(())?),
            153..=156 => {
                let v = r.signed((op - 152) as usize).map_err(|_| ())?;
                frames.last_mut().unwrap().x = Some(v);
                hmove(v)
            }
            157..=160 => {
                let v = r.signed((op - 156) as usize).map_err(|_| ())?;
                vmove(v)
            }
            161 => vmove(frames.last().unwrap().y.ok_or(())?),
            162..=165 => {
                let v = r.signed((op - 161) as usize).map_err(|_| ())?;
                frames.last_mut().unwrap().y = Some(v);
                vmove(v)
            }
            166 => vmove(frames.last().unwrap().z.ok_or(())?),
            167..=170 => {
                let v = r.signed((op - 166) as usize).map_err(|_| ())?;
                frames.last_mut().unwrap().z = Some(v);
                vmove(v)
            }
            171..=234 => {
                List::new("SELECTFONT").with_number(Prefix::D, (op - 171) as i64)
            }
            235..=238 => {
                let n = r.unsigned((op - 234) as usize).map_err(|_| ())?;
                List::new("SELECTFONT").with_number(Prefix::D, n as i64)
            }
            239..=242 => {
                let len = r.unsigned((op - 238) as usize).map_err(|_| ())? as usize;
                let body = r.bytes(len).map_err(|_| ())?;
                special(body, cfg)
            }
            255 => {
                let dir = r.u8().map_err(|_| ())?;
                List::new("DIR").with_number(Prefix::D, dir as i64)
            }
            _ => return Err(()),
        };
        map.push(Node::List(node));
    }
    Ok(map)
}

fn hmove(v: i32) -> List {
    if v < 0 {
        List::new("MOVELEFT").with_real(Number(-v))
    } else {
        List::new("MOVERIGHT").with_real(Number(v))
    }
}

fn vmove(v: i32) -> List {
    if v < 0 {
        List::new("MOVEUP").with_real(Number(-v))
    } else {
        List::new("MOVEDOWN").with_real(Number(v))
    }
}

/// A special's body is kept symbolic when it is seven-bit safe and parses
/// as property lists; anything else is preserved as hex.
fn special(body: &[u8], cfg: &Config) -> List {
    let seven_bit_safe = body
        .iter()
        .all(|&u| matches!(u, b' ' | b'\t' | b'\n' | 0x20..=0x7E));
    if seven_bit_safe {
        if let Ok(parsed) = crate::pl::parse(body, cfg) {
            if !parsed.0.is_empty() {
                let mut special = List::new("SPECIAL");
                for list in parsed.0 {
                    special.push(Node::List(list));
                }
                return special;
            }
        }
    }
    List::new("SPECIALHEX").with_raw(&hex_atom(body))
}

struct Reader<'a> {
    b: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn done(&self) -> bool {
        self.position >= self.b.len()
    }
    fn u8(&mut self) -> Result<u8, Error> {
        match self.b.get(self.position) {
            Some(&u) => {
                self.position += 1;
                Ok(u)
            }
            None => Err(Error::Truncated {
                position: self.position,
            }),
        }
    }
    fn bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        match self.b.get(self.position..self.position + n) {
            Some(s) => {
                self.position += n;
                Ok(s)
            }
            None => Err(Error::Truncated {
                position: self.position,
            }),
        }
    }
    fn unsigned(&mut self, n: usize) -> Result<u32, Error> {
        let mut acc: u32 = 0;
        for _ in 0..n {
            acc = (acc << 8) | self.u8()? as u32;
        }
        Ok(acc)
    }
    /// An n-byte two's-complement integer.
    fn signed(&mut self, n: usize) -> Result<i32, Error> {
        let first = self.u8()? as i32;
        let mut acc = if first >= 128 { first - 256 } else { first };
        for _ in 1..n {
            acc = (acc << 8) | self.u8()? as i32;
        }
        Ok(acc)
    }
    fn u24(&mut self) -> Result<u32, Error> {
        self.unsigned(3)
    }
    fn u32(&mut self) -> Result<u32, Error> {
        self.unsigned(4)
    }
    fn i32(&mut self) -> Result<i32, Error> {
        self.signed(4)
    }
}
