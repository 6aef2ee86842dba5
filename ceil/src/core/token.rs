//! Lexical token model for CEIL.

use std::fmt;

/// Token kinds for the CEIL command language.
///
/// Keywords are case-sensitive literals. `String`, `Word` and `Block` carry a
/// payload in [`Token::value`]; every other kind carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Create,
    Patch,
    Delete,
    Run,
    FetchExternal,
    Search,
    Replace,
    String,
    Word,
    Block,
    Eof,
}

impl TokenKind {
    /// Literal spelling for keyword kinds, `None` for payload kinds and EOF.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            TokenKind::Create => Some("CREATE"),
            TokenKind::Patch => Some("PATCH"),
            TokenKind::Delete => Some("DELETE"),
            TokenKind::Run => Some("RUN"),
            TokenKind::FetchExternal => Some("FETCH_EXTERNAL"),
            TokenKind::Search => Some("SEARCH"),
            TokenKind::Replace => Some("REPLACE"),
            TokenKind::String | TokenKind::Word | TokenKind::Block | TokenKind::Eof => None,
        }
    }

    /// True for the keywords that start a command.
    pub fn starts_command(self) -> bool {
        matches!(
            self,
            TokenKind::Create
                | TokenKind::Patch
                | TokenKind::Delete
                | TokenKind::Run
                | TokenKind::FetchExternal
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::String => "STRING",
            TokenKind::Word => "WORD",
            TokenKind::Block => "BLOCK",
            TokenKind::Eof => "EOF",
            keyword => keyword.keyword().unwrap_or("?"),
        };
        f.write_str(name)
    }
}

/// Source location span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Default for Span {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            line: 1,
            column: 1,
        }
    }
}

/// A token with its kind, optional payload and source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: Option<String>,
    pub span: Span,
    /// First unrecognized character the lexer dropped between the previous
    /// token and this one.
    pub skipped_before: Option<Span>,
}

impl Token {
    pub fn new(kind: TokenKind, value: Option<String>, span: Span) -> Self {
        Self {
            kind,
            value,
            span,
            skipped_before: None,
        }
    }

    /// Payload text, or the empty string for kinds without one.
    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_kinds_display_their_literal() {
        assert_eq!(TokenKind::FetchExternal.to_string(), "FETCH_EXTERNAL");
        assert_eq!(TokenKind::Search.to_string(), "SEARCH");
        assert_eq!(TokenKind::Block.to_string(), "BLOCK");
    }

    #[test]
    fn only_verbs_start_commands() {
        assert!(TokenKind::Patch.starts_command());
        assert!(!TokenKind::Search.starts_command());
        assert!(!TokenKind::Word.starts_command());
    }
}
