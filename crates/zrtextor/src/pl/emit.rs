//! Emitter: property list trees back to text.

use super::number::{self, NumberError};
use super::tree::{List, Node, PlFile};
use super::lexer;
use crate::{jcode, Config};

/// Error produced while emitting a tree.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum EmitError {
    /// A cooked number could not be rendered under any prefix.
    Number(NumberError),
    /// An atom holds a char that never came from a byte. This indicates a
    /// tree that was built by hand rather than parsed.
    NonByteChar { c: char },
}

impl std::error::Error for EmitError {}

impl std::fmt::Display for EmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitError::Number(e) => e.fmt(f),
            EmitError::NonByteChar { c } => {
                write!(f, "atom holds the non-byte char U+{:04X}", *c as u32)
            }
        }
    }
}

impl From<NumberError> for EmitError {
    fn from(e: NumberError) -> Self {
        EmitError::Number(e)
    }
}

/// Columns a packed run of character atoms may occupy before breaking.
const PACK_WIDTH: usize = 72;

/// Emit a whole file as bytes.
///
/// A non-negative `indent` produces one top-level list per line with
/// nested lists indented three further columns; a negative `indent`
/// produces a single line with no newlines at all (used to embed a list
/// inside a `SPECIAL` payload).
pub fn emit(file: &PlFile, indent: i32, cfg: &Config) -> Result<Vec<u8>, EmitError> {
    let text = emit_string(file, indent, cfg)?;
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        match u8::try_from(c as u32) {
            Ok(u) => bytes.push(u),
            Err(_) => return Err(EmitError::NonByteChar { c }),
        }
    }
    if cfg.external_enc == jcode::External::Jis {
        bytes = lexer::wrap_jis(&bytes);
    }
    Ok(bytes)
}

/// Emit a whole file in the one-char-per-byte string form.
pub fn emit_string(file: &PlFile, indent: i32, cfg: &Config) -> Result<String, EmitError> {
    let mut w = Writer {
        out: String::new(),
        column: 0,
        cfg,
    };
    let inline = indent < 0;
    for (i, list) in file.0.iter().enumerate() {
        if inline {
            if i > 0 {
                w.push_str(" ");
            }
            w.list(list, -1)?;
        } else {
            w.list(list, indent)?;
            w.push_str("\n");
        }
    }
    Ok(w.out)
}

/// Emit a single list inline, with no trailing newline.
pub fn emit_list_inline(list: &List, cfg: &Config) -> Result<String, EmitError> {
    let mut w = Writer {
        out: String::new(),
        column: 0,
        cfg,
    };
    w.list(list, -1)?;
    Ok(w.out)
}

struct Writer<'a> {
    out: String,
    column: usize,
    cfg: &'a Config,
}

/// An atom participates in the 72-column packing heuristic if it is a
/// multibyte character or one of the `J`/`U`/`X` hex spellings.
fn packable(word: &str) -> bool {
    if word.chars().any(|c| c as u32 >= 0x80) {
        return true;
    }
    let mut chars = word.chars();
    matches!(chars.next(), Some('J' | 'U' | 'X'))
        && word.len() == 5
        && chars.all(|c| c.is_ascii_hexdigit())
}

impl Writer<'_> {
    fn push_str(&mut self, s: &str) {
        for c in s.chars() {
            if c == '\n' {
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.out.push_str(s);
    }

    /// `indent` is the column of the list's opening parenthesis;
    /// negative means inline mode.
    fn list(&mut self, list: &List, indent: i32) -> Result<(), EmitError> {
        self.push_str("(");
        let mut wrote_sublist = false;
        let mut packing = false;
        for (i, node) in list.0.iter().enumerate() {
            match node {
                Node::Bareword(w) | Node::Raw(w) => {
                    if i == 0 {
                        self.push_str(w);
                    } else if packable(w) && indent >= 0 {
                        if packing && self.column + 1 + w.chars().count() > PACK_WIDTH {
                            self.push_str("\n");
                            self.push_str(&" ".repeat(indent as usize + 3));
                        } else {
                            self.push_str(" ");
                        }
                        self.push_str(w);
                        packing = true;
                        continue;
                    } else {
                        self.push_str(" ");
                        self.push_str(w);
                    }
                }
                Node::Cooked(c) => {
                    let rendered;
                    let (prefix, text) = match &c.literal {
                        Some(text) => (c.prefix, text.as_str()),
                        None => {
                            rendered = number::unparse(c.prefix, c.value, self.cfg)?;
                            (rendered.0, rendered.1.as_str())
                        }
                    };
                    self.push_str(" ");
                    self.push_str(&prefix.to_char().to_string());
                    self.push_str(" ");
                    self.push_str(text);
                }
                Node::List(sub) => {
                    if indent < 0 {
                        self.push_str(" ");
                        self.list(sub, -1)?;
                    } else {
                        self.push_str("\n");
                        self.push_str(&" ".repeat(indent as usize + 3));
                        self.list(sub, indent + 3)?;
                        wrote_sublist = true;
                    }
                }
            }
            packing = false;
        }
        if wrote_sublist {
            self.push_str("\n");
            self.push_str(&" ".repeat(indent as usize + 3));
        }
        self.push_str(")");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tree::Cooked;
    use super::*;
    use crate::pl::Prefix;

    fn emit_str(file: &PlFile, indent: i32) -> String {
        emit_string(file, indent, &Config::default()).unwrap()
    }

    #[test]
    fn character_with_nested_width() {
        let file = PlFile(vec![List(vec![
            Node::Bareword("CHARACTER".into()),
            Node::Cooked(Cooked {
                prefix: Prefix::C,
                value: 65,
                literal: None,
            }),
            Node::List(List(vec![
                Node::Bareword("CHARWD".into()),
                Node::Cooked(Cooked {
                    prefix: Prefix::R,
                    value: 1 << 19,
                    literal: None,
                }),
            ])),
        ])]);
        assert_eq!(
            emit_str(&file, 0),
            "(CHARACTER C A\n   (CHARWD R 0.5)\n   )\n"
        );
    }

    #[test]
    fn preserved_literal_emits_verbatim() {
        let file = PlFile(vec![List(vec![
            Node::Bareword("CHECKSUM".into()),
            Node::Cooked(Cooked {
                prefix: Prefix::O,
                value: 0o17,
                literal: Some("017".into()),
            }),
        ])]);
        assert_eq!(emit_str(&file, 0), "(CHECKSUM O 017)\n");
    }

    #[test]
    fn cleared_literal_reemits_from_value() {
        let file = PlFile(vec![List(vec![
            Node::Bareword("CHECKSUM".into()),
            Node::Cooked(Cooked {
                prefix: Prefix::O,
                value: 0o17,
                literal: None,
            }),
        ])]);
        assert_eq!(emit_str(&file, 0), "(CHECKSUM O 17)\n");
    }

    #[test]
    fn inline_mode_packs_everything_on_one_line() {
        let file = PlFile(vec![
            List(vec![
                Node::Bareword("MOVERIGHT".into()),
                Node::Cooked(Cooked::new(Prefix::R, 1 << 20)),
            ]),
            List(vec![Node::Bareword("SETCHAR".into())]),
        ]);
        assert_eq!(emit_str(&file, -1), "(MOVERIGHT R 1.0) (SETCHAR)");
    }

    #[test]
    fn long_character_runs_break_at_seventy_two_columns() {
        let mut list = List::new("CHARSINTYPE");
        list.push_number(Prefix::D, 1);
        for _ in 0..40 {
            list.push(Node::Raw("U00AB".into()));
        }
        let file = PlFile(vec![list]);
        let text = emit_str(&file, 0);
        for line in text.lines() {
            assert!(line.chars().count() <= PACK_WIDTH, "long line: {line}");
        }
        assert!(text.lines().count() > 2);
    }

    #[test]
    fn round_trip_through_parser() {
        let source = b"(CHARACTER C A\n   (CHARWD R 0.5)\n   )\n(CHECKSUM O 7777777)\n";
        let cfg = Config::default();
        let file = crate::pl::parse(source, &cfg).unwrap();
        let emitted = emit(&file, 0, &cfg).unwrap();
        assert_eq!(emitted, source.to_vec());
        let reparsed = crate::pl::parse(&emitted, &cfg).unwrap();
        assert_eq!(reparsed, file);
    }
}
