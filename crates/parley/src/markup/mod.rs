//! Safe YAML loading.
//!
//! The event stream is folded straight into [`GenericValue`], so only
//! scalars, sequences and mappings can ever be constructed. Explicit tags are
//! refused instead of being resolved, and only plain scalars are typed:
//! anything quoted stays a string.

mod builder;
mod scalar;

use std::fmt::{Display, Formatter};

use serde::Serialize;
use yaml_rust2::parser::Parser;

use crate::models::GenericValue;

use self::builder::TreeBuilder;

/// Deepest collection nesting accepted. Stored records are read back through
/// a recursive decoder, so the bound keeps every parsed tree readable.
pub const MAX_NESTING_DEPTH: usize = 100;
/// Total nodes that alias expansion may copy into one document.
pub const MAX_ALIAS_NODES: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    Encoding,
}

impl ParseErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Encoding => "encoding",
        }
    }
}

/// 1-based line and column of the offending input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Option<Position>,
    pub message: String,
    pub origin: String,
}

impl ParseError {
    fn syntax(origin: &str, position: Option<Position>, message: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Syntax,
            position,
            message: message.into(),
            origin: origin.to_string(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} error", self.origin, self.kind.as_str())?;
        match self.position {
            Some(position) => write!(f, " at {position}")?,
            None => f.write_str(" (position unknown)")?,
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Decodes `bytes` as UTF-8 and parses the result. `origin` names the input
/// in diagnostics only.
pub fn parse_markup_bytes(bytes: &[u8], origin: &str) -> Result<GenericValue, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|error| {
        let valid = &bytes[..error.valid_up_to()];
        ParseError {
            kind: ParseErrorKind::Encoding,
            position: Some(position_after(valid)),
            message: format!(
                "invalid UTF-8 sequence at byte offset {}",
                error.valid_up_to()
            ),
            origin: origin.to_string(),
        }
    })?;
    parse_markup(text, origin)
}

pub fn parse_markup(text: &str, origin: &str) -> Result<GenericValue, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Ok(GenericValue::Null);
    }

    let mut builder = TreeBuilder::new(origin);
    let loaded = Parser::new_from_str(text).load(&mut builder, true);
    builder.finish(loaded)
}

fn position_after(valid_prefix: &[u8]) -> Position {
    let text = String::from_utf8_lossy(valid_prefix);
    let line = text.matches('\n').count() + 1;
    let column = text
        .rsplit('\n')
        .next()
        .map_or(0, |tail| tail.chars().count())
        + 1;
    Position { line, column }
}
