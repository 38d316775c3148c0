//! The property list tree.
//!
//! A property list file is a sequence of parenthesized lists whose first
//! element is a bareword head. The remaining elements are atoms or nested
//! lists. "Cooking" a tree interprets the typed numeric prefixes: a
//! prefix atom and the token following it collapse into one
//! [`Cooked`] node that remembers its source token, so an untouched value
//! re-emits byte for byte.

use super::error::ParseError;
use super::lexer::{Token, TokenKind};
use super::number::{self, Prefix};
use crate::Config;

/// A node in a property list tree.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Node {
    /// A symbolic identifier: the head of a list.
    Bareword(String),
    /// An uninterpreted atom.
    Raw(String),
    /// A number carrying its prefix kind.
    Cooked(Cooked),
    /// A nested list.
    List(List),
}

/// A cooked number.
#[derive(Debug, Clone)]
pub struct Cooked {
    pub prefix: Prefix,
    pub value: i64,
    /// The source token, kept so an unchanged value round-trips exactly.
    /// Mutation clears it.
    pub literal: Option<String>,
}

impl Cooked {
    pub fn new(prefix: Prefix, value: i64) -> Cooked {
        Cooked {
            prefix,
            value,
            literal: None,
        }
    }

    /// Interpret the value as a 2^20 fixed-point number.
    pub fn real(&self) -> crate::Number {
        crate::Number(self.value as i32)
    }
}

/// Two cooked numbers are the same value even when only one of them still
/// carries its source token.
impl PartialEq for Cooked {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix && self.value == other.value
    }
}

impl Eq for Cooked {}

/// A parenthesized list: a head followed by atoms and sub-lists.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct List(pub Vec<Node>);

/// A whole property list file.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct PlFile(pub Vec<List>);

impl List {
    pub fn new(head: &str) -> List {
        List(vec![Node::Bareword(head.into())])
    }

    pub fn head(&self) -> Option<&str> {
        match self.0.first() {
            Some(Node::Bareword(s)) | Some(Node::Raw(s)) => Some(s),
            _ => None,
        }
    }

    /// The elements after the head.
    pub fn args(&self) -> &[Node] {
        if self.0.is_empty() {
            &[]
        } else {
            &self.0[1..]
        }
    }

    /// The first cooked number among the arguments.
    pub fn value(&self) -> Option<&Cooked> {
        self.cooked_values().next()
    }

    /// The nth cooked number among the arguments.
    pub fn nth_value(&self, n: usize) -> Option<&Cooked> {
        self.cooked_values().nth(n)
    }

    pub fn cooked_values(&self) -> impl Iterator<Item = &Cooked> {
        self.args().iter().filter_map(|n| match n {
            Node::Cooked(c) => Some(c),
            _ => None,
        })
    }

    /// Overwrite the first cooked number's value, clearing its token.
    pub fn set_value(&mut self, value: i64) -> bool {
        if self.0.is_empty() {
            return false;
        }
        for node in &mut self.0[1..] {
            if let Node::Cooked(c) = node {
                c.value = value;
                c.literal = None;
                return true;
            }
        }
        false
    }

    /// The first sub-list with the given head.
    pub fn child<'a>(&'a self, head: &'a str) -> Option<&'a List> {
        self.children(head).next()
    }

    pub fn child_mut(&mut self, head: &str) -> Option<&mut List> {
        self.0.iter_mut().find_map(|n| match n {
            Node::List(l) if l.head() == Some(head) => Some(l),
            _ => None,
        })
    }

    pub fn children<'a, 'b>(&'a self, head: &'b str) -> impl Iterator<Item = &'a List> + 'a
    where
        'b: 'a,
    {
        self.0.iter().filter_map(move |n| match n {
            Node::List(l) if l.head() == Some(head) => Some(l),
            _ => None,
        })
    }

    /// Remove every sub-list with the given head, returning the first.
    pub fn remove_child(&mut self, head: &str) -> Option<List> {
        let mut removed = None;
        self.0.retain_mut(|n| match n {
            Node::List(l) if l.head() == Some(head) => {
                if removed.is_none() {
                    removed = Some(std::mem::take(l));
                }
                false
            }
            _ => true,
        });
        removed
    }

    pub fn push(&mut self, node: Node) {
        self.0.push(node);
    }

    pub fn with(mut self, node: Node) -> List {
        self.0.push(node);
        self
    }

    pub fn push_number(&mut self, prefix: Prefix, value: i64) {
        self.0.push(Node::Cooked(Cooked::new(prefix, value)));
    }

    pub fn with_number(mut self, prefix: Prefix, value: i64) -> List {
        self.push_number(prefix, value);
        self
    }

    pub fn push_real(&mut self, n: crate::Number) {
        self.push_number(Prefix::R, n.0 as i64);
    }

    pub fn with_real(self, n: crate::Number) -> List {
        self.with_number(Prefix::R, n.0 as i64)
    }

    pub fn with_raw(self, word: &str) -> List {
        self.with(Node::Raw(word.into()))
    }

    pub fn with_list(self, list: List) -> List {
        self.with(Node::List(list))
    }
}

impl PlFile {
    pub fn child<'a>(&'a self, head: &'a str) -> Option<&'a List> {
        self.children(head).next()
    }

    pub fn children<'a, 'b>(&'a self, head: &'b str) -> impl Iterator<Item = &'a List> + 'a
    where
        'b: 'a,
    {
        self.0.iter().filter(move |l| l.head() == Some(head))
    }

    pub fn push(&mut self, list: List) {
        self.0.push(list);
    }
}

/// Build a tree from a token vector.
///
/// The outermost level must consist of parenthesized lists only; stray
/// words and unbalanced parentheses are errors, the latter reporting the
/// nesting depth left unwound at the end of the input.
pub fn from_tokens(tokens: Vec<Token>) -> Result<PlFile, ParseError> {
    let mut top: Vec<List> = vec![];
    let mut stack: Vec<List> = vec![];
    for Token(kind, position) in tokens {
        match kind {
            TokenKind::Open => stack.push(List(vec![])),
            TokenKind::Close => match stack.pop() {
                None => return Err(ParseError::UnexpectedClosingParenthesis { position }),
                Some(done) => match stack.last_mut() {
                    None => top.push(done),
                    Some(parent) => parent.0.push(Node::List(done)),
                },
            },
            TokenKind::Word(w) => match stack.last_mut() {
                None => {
                    return Err(ParseError::StrayToken {
                        token: w,
                        position,
                    })
                }
                Some(list) => {
                    let node = if list.0.is_empty() {
                        Node::Bareword(w)
                    } else {
                        Node::Raw(w)
                    };
                    list.0.push(node);
                }
            },
        }
    }
    if !stack.is_empty() {
        return Err(ParseError::UnbalancedOpenParenthesis { depth: stack.len() });
    }
    Ok(PlFile(top))
}

/// Cook a tree in place: drop comments and interpret numeric prefixes.
pub fn cook(file: &mut PlFile, cfg: &Config) -> Result<(), ParseError> {
    file.0.retain(|l| l.head() != Some("COMMENT"));
    for list in &mut file.0 {
        cook_list(list, cfg)?;
    }
    Ok(())
}

fn cook_list(list: &mut List, cfg: &Config) -> Result<(), ParseError> {
    let old = std::mem::take(&mut list.0);
    let mut out = Vec::with_capacity(old.len());
    let mut iter = old.into_iter().peekable();
    while let Some(node) = iter.next() {
        match node {
            Node::List(l) if l.head() == Some("COMMENT") => (),
            Node::List(mut l) => {
                cook_list(&mut l, cfg)?;
                out.push(Node::List(l));
            }
            Node::Raw(w) => {
                let prefix = if w.chars().count() == 1 {
                    Prefix::from_char(w.chars().next().unwrap())
                } else {
                    None
                };
                match (prefix, iter.peek()) {
                    // A prefix atom in final position stays raw.
                    (Some(_), None) | (None, _) => out.push(Node::Raw(w)),
                    (Some(p), Some(Node::Raw(_) | Node::Bareword(_))) => {
                        let token = match iter.next() {
                            Some(Node::Raw(t) | Node::Bareword(t)) => t,
                            _ => unreachable!(),
                        };
                        let value = number::parse(p, &token, cfg).map_err(|reason| {
                            ParseError::BadNumber {
                                prefix: p,
                                token: token.clone(),
                                reason,
                            }
                        })?;
                        out.push(Node::Cooked(Cooked {
                            prefix: p,
                            value,
                            literal: Some(token),
                        }));
                    }
                    (Some(p), Some(_)) => {
                        return Err(ParseError::PrefixBeforeList {
                            prefix: p.to_char(),
                        })
                    }
                }
            }
            other => out.push(other),
        }
    }
    list.0 = out;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &[u8]) -> Result<PlFile, ParseError> {
        let mut file = from_tokens(super::super::lexer::tokenize(source)?)?;
        cook(&mut file, &Config::default())?;
        Ok(file)
    }

    fn cooked(prefix: Prefix, value: i64, literal: &str) -> Node {
        Node::Cooked(Cooked {
            prefix,
            value,
            literal: Some(literal.into()),
        })
    }

    #[test]
    fn two_lists_with_cooked_octal() {
        let got = parse(b"(FAMILY XYZ)\n(CHECKSUM O 7777777)").unwrap();
        assert_eq!(
            got,
            PlFile(vec![
                List(vec![
                    Node::Bareword("FAMILY".into()),
                    Node::Raw("XYZ".into()),
                ]),
                List(vec![
                    Node::Bareword("CHECKSUM".into()),
                    cooked(Prefix::O, 0o7777777, "7777777"),
                ]),
            ])
        );
    }

    #[test]
    fn nested_lists_cook_recursively() {
        let got = parse(b"(CHARACTER C A (CHARWD R 0.5))").unwrap();
        assert_eq!(
            got,
            PlFile(vec![List(vec![
                Node::Bareword("CHARACTER".into()),
                cooked(Prefix::C, 65, "A"),
                Node::List(List(vec![
                    Node::Bareword("CHARWD".into()),
                    cooked(Prefix::R, 1 << 19, "0.5"),
                ])),
            ])])
        );
    }

    #[test]
    fn comments_are_dropped() {
        let got = parse(b"(COMMENT top) (TYPE D 1 (COMMENT inner) (CHARWD R 1.0))").unwrap();
        assert_eq!(got.0.len(), 1);
        assert_eq!(got.0[0].children("COMMENT").count(), 0);
        assert!(got.0[0].child("CHARWD").is_some());
    }

    #[test]
    fn final_prefix_char_stays_raw() {
        let got = parse(b"(SETCHAR) (MAP R)").unwrap();
        assert_eq!(got.0[1].0[1], Node::Raw("R".into()));
    }

    #[test]
    fn consecutive_numbers_cook_pairwise() {
        let got = parse(b"(SUBTYPE D 1 D 2)").unwrap();
        assert_eq!(
            got.0[0].args().to_vec(),
            vec![cooked(Prefix::D, 1, "1"), cooked(Prefix::D, 2, "2")]
        );
    }

    macro_rules! parse_error_tests {
        ( $( ($name: ident, $input: expr, $want: expr, ), )+ ) => {
            $(
                #[test]
                fn $name() {
                    assert_eq!(parse($input).unwrap_err(), $want);
                }
            )+
        };
    }

    parse_error_tests!(
        (
            unbalanced_reports_depth,
            b"(A (B (C",
            ParseError::UnbalancedOpenParenthesis { depth: 3 },
        ),
        (
            unexpected_close,
            b"(A))",
            ParseError::UnexpectedClosingParenthesis { position: 3 },
        ),
        (
            stray_token,
            b"(A) junk",
            ParseError::StrayToken { token: "junk".into(), position: 4 },
        ),
        (
            prefix_before_list,
            b"(CHARWD R (X))",
            ParseError::PrefixBeforeList { prefix: 'R' },
        ),
        (
            bad_number_token,
            b"(CHECKSUM O 778)",
            ParseError::BadNumber {
                prefix: Prefix::O,
                token: "778".into(),
                reason: number::NumberError::Malformed {
                    prefix: Prefix::O,
                    token: "778".into(),
                },
            },
        ),
    );

    #[test]
    fn set_value_clears_literal() {
        let mut file = parse(b"(CHECKSUM O 7777777)").unwrap();
        assert!(file.0[0].set_value(42));
        let c = file.0[0].value().unwrap();
        assert_eq!(c.value, 42);
        assert_eq!(c.literal, None);
    }
}
