//! Tokenizer for property list files.
//!
//! Property list text is split on whitespace, with the two parentheses
//! treated as standalone tokens. The input is a byte string, not UTF-8:
//! Japanese atoms may carry EUC, Shift-JIS or UTF-8 payload bytes.
//! Tokens hold those bytes losslessly as one char per byte
//! ([`bytes_to_chars`]/[`chars_to_bytes`]).
//!
//! Two pre-passes run before splitting:
//!
//! - JIS shift sequences (`ESC $ @`/`ESC $ B` ... `ESC ( B`/`ESC ( J`)
//!   are unwrapped and their payload transposed into the high-bit range,
//!   so a Japanese atom stays one opaque multibyte token.
//! - Inside a `CHARSINTYPE` list, a parenthesis standing alone as a
//!   literal character is rewritten to its `X0028`/`X0029` escape, and a
//!   `U` separated from its four hex digits is joined to `Uxxxx`.

use super::error::ParseError;

/// Kind of a token.
#[derive(Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// An open parenthesis `(`.
    Open,
    /// A closed parenthesis `)`.
    Close,
    /// A single word: a maximal run of non-whitespace, non-parenthesis
    /// bytes, held one char per byte.
    Word(String),
}

/// Token in a property list file.
///
/// The second element is the byte offset at which the token starts,
/// counted in the unwrapped input.
#[derive(Debug, PartialEq, Eq)]
pub struct Token(pub TokenKind, pub usize);

/// Map raw bytes into the one-char-per-byte string form used by tokens.
pub fn bytes_to_chars(b: &[u8]) -> String {
    b.iter().map(|&u| u as char).collect()
}

/// The inverse of [`bytes_to_chars`]. Returns `None` if the string holds
/// a char that never came from a byte.
pub fn chars_to_bytes(s: &str) -> Option<Vec<u8>> {
    s.chars()
        .map(|c| u8::try_from(c as u32).ok())
        .collect()
}

/// Re-wrap high-bit byte runs into JIS shift envelopes.
///
/// This is the emission-side inverse of the unwrapping the tokenizer
/// performs; it is applied when the external encoding is JIS.
pub fn wrap_jis(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut shifted = false;
    for &u in bytes {
        if u >= 0x80 {
            if !shifted {
                out.extend_from_slice(b"\x1b$B");
                shifted = true;
            }
            out.push(u & 0x7F);
        } else {
            if shifted {
                out.extend_from_slice(b"\x1b(B");
                shifted = false;
            }
            out.push(u);
        }
    }
    if shifted {
        out.extend_from_slice(b"\x1b(B");
    }
    out
}

fn unwrap_jis(bytes: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1B
            && bytes.get(i + 1) == Some(&b'$')
            && matches!(bytes.get(i + 2), Some(b'@' | b'B'))
        {
            let start = i;
            i += 3;
            loop {
                if bytes[i..].is_empty() {
                    return Err(ParseError::UnterminatedKanjiEnvelope { position: start });
                }
                if bytes[i] == 0x1B
                    && bytes.get(i + 1) == Some(&b'(')
                    && matches!(bytes.get(i + 2), Some(b'B' | b'J'))
                {
                    i += 3;
                    break;
                }
                out.push(bytes[i] | 0x80);
                i += 1;
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn is_space(u: u8) -> bool {
    matches!(u, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_hex(u: u8) -> bool {
    u.is_ascii_hexdigit()
}

/// Rewrite literal parentheses and split `U xxxx` atoms inside
/// `CHARSINTYPE` bodies so the ordinary tokenizer stays well-formed.
fn patch_charsintype(src: &[u8]) -> Vec<u8> {
    const HEAD: &[u8] = b"(CHARSINTYPE";
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        if src[i..].starts_with(HEAD)
            && src
                .get(i + HEAD.len())
                .is_some_and(|&u| is_space(u) || u == b'(' || u == b')')
        {
            out.extend_from_slice(HEAD);
            i += HEAD.len();
            let mut depth = 1_usize;
            while i < src.len() && depth > 0 {
                let u = src[i];
                let before_is_space = i == 0 || is_space(src[i - 1]);
                let after_is_space = src.get(i + 1).map_or(true, |&n| is_space(n));
                match u {
                    b'(' | b')' if before_is_space && after_is_space => {
                        // A parenthesis surrounded by whitespace is the
                        // character itself, not structure.
                        out.extend_from_slice(if u == b'(' { b"X0028" } else { b"X0029" });
                        i += 1;
                    }
                    b'(' => {
                        depth += 1;
                        out.push(u);
                        i += 1;
                    }
                    b')' => {
                        depth -= 1;
                        out.push(u);
                        i += 1;
                    }
                    b'U' | b'u'
                        if before_is_space
                            && src.get(i + 1) == Some(&b' ')
                            && src[i + 2..].len() >= 4
                            && src[i + 2..i + 6].iter().all(|&h| is_hex(h))
                            && src.get(i + 6).map_or(true, |&n| {
                                is_space(n) || n == b'(' || n == b')'
                            }) =>
                    {
                        out.push(u);
                        out.extend_from_slice(&src[i + 2..i + 6]);
                        i += 6;
                    }
                    _ => {
                        out.push(u);
                        i += 1;
                    }
                }
            }
        } else {
            out.push(src[i]);
            i += 1;
        }
    }
    out
}

/// Split property list text into tokens.
pub fn tokenize(bytes: &[u8]) -> Result<Vec<Token>, ParseError> {
    let unwrapped = unwrap_jis(bytes)?;
    let patched = patch_charsintype(&unwrapped);
    let mut tokens = vec![];
    let mut i = 0;
    while i < patched.len() {
        let u = patched[i];
        match u {
            b'(' => {
                tokens.push(Token(TokenKind::Open, i));
                i += 1;
            }
            b')' => {
                tokens.push(Token(TokenKind::Close, i));
                i += 1;
            }
            _ if is_space(u) => {
                i += 1;
            }
            _ => {
                let start = i;
                while i < patched.len()
                    && !is_space(patched[i])
                    && patched[i] != b'('
                    && patched[i] != b')'
                {
                    i += 1;
                }
                tokens.push(Token(
                    TokenKind::Word(bytes_to_chars(&patched[start..i])),
                    start,
                ));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::TokenKind::*;
    use super::*;

    fn words(source: &[u8]) -> Vec<String> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| match t.0 {
                Open => "(".into(),
                Close => ")".into(),
                Word(w) => w,
            })
            .collect()
    }

    macro_rules! lexer_tests {
        ( $( ($name: ident, $input: expr, $want: expr, ), )+ ) => {
            $(
                #[test]
                fn $name() {
                    let want: Vec<&str> = $want;
                    assert_eq!(words($input), want);
                }
            )+
        };
    }

    lexer_tests!(
        (
            basic,
            b"(CHECKSUM O 7777777)",
            vec!["(", "CHECKSUM", "O", "7777777", ")"],
        ),
        (
            nested,
            b"(CHARACTER C A (CHARWD R 0.5))",
            vec!["(", "CHARACTER", "C", "A", "(", "CHARWD", "R", "0.5", ")", ")"],
        ),
        (
            newlines_and_tabs,
            b"(A\n\t(B 1)\r\n)",
            vec!["(", "A", "(", "B", "1", ")", ")"],
        ),
        (
            jis_envelope_is_one_token,
            b"(K \x1b$B\x24\x22\x1b(B)",
            vec!["(", "K", "\u{a4}\u{a2}", ")"],
        ),
        (
            jis_envelope_at_sign_and_j,
            b"(K \x1b$@\x24\x22\x1b(J)",
            vec!["(", "K", "\u{a4}\u{a2}", ")"],
        ),
        (
            charsintype_literal_parens,
            b"(CHARSINTYPE D 1 ( ) x)",
            vec!["(", "CHARSINTYPE", "D", "1", "X0028", "X0029", "x", ")"],
        ),
        (
            charsintype_split_u,
            b"(CHARSINTYPE D 1 U 00AB U 00CD)",
            vec!["(", "CHARSINTYPE", "D", "1", "U00AB", "U00CD", ")"],
        ),
        (
            charsintype_ctrange_is_structural,
            b"(CHARSINTYPE D 1 (CTRANGE H 21 H 29) x)",
            vec![
                "(", "CHARSINTYPE", "D", "1", "(", "CTRANGE", "H", "21", "H", "29", ")", "x", ")"
            ],
        ),
        (
            patch_is_scoped_to_charsintype,
            b"(COMMENT U 00AB)",
            vec!["(", "COMMENT", "U", "00AB", ")"],
        ),
    );

    #[test]
    fn unterminated_envelope_is_an_error() {
        assert_eq!(
            tokenize(b"(K \x1b$B\x24\x22)"),
            Err(ParseError::UnterminatedKanjiEnvelope { position: 3 })
        );
    }

    #[test]
    fn wrap_round_trips_unwrap() {
        let bytes = b"(K \xa4\xa2 \xa4\xa4)";
        let wrapped = wrap_jis(bytes);
        assert_eq!(unwrap_jis(&wrapped).unwrap(), bytes);
    }
}
