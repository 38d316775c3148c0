//! Property lists: tokenizing, the cooked tree, emission and
//! canonical rearrangement.

pub mod emit;
pub mod error;
pub mod lexer;
pub mod number;
pub mod rearrange;
pub mod tree;

pub use emit::{emit, emit_list_inline, emit_string, EmitError};
pub use error::ParseError;
pub use number::{NumberError, Prefix};
pub use rearrange::rearrange;
pub use tree::{Cooked, List, Node, PlFile};

use crate::Config;

/// Parse property list text into a cooked tree.
pub fn parse(bytes: &[u8], cfg: &Config) -> Result<PlFile, ParseError> {
    let tokens = lexer::tokenize(bytes)?;
    let mut file = tree::from_tokens(tokens)?;
    tree::cook(&mut file, cfg)?;
    Ok(file)
}
