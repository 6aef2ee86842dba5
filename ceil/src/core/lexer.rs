//! Tokenizer for CEIL source text.
//!
//! Matching is driven by an ordered rule table: keywords, then blocks, then
//! quoted strings, then the generic word rule. The first rule that matches at
//! the current position wins, so a keyword is never lexed as a word. Input no
//! rule accepts is skipped one character at a time.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::token::{Span, Token, TokenKind};

/// Opening marker of a verbatim block.
pub const BLOCK_OPEN: &str = "<<<";
/// Closing marker of a verbatim block.
pub const BLOCK_CLOSE: &str = ">>>";

struct Rule {
    kind: TokenKind,
    pattern: Regex,
    /// Bytes trimmed from each end of the match to form the payload.
    strip: usize,
}

impl Rule {
    fn new(kind: TokenKind, pattern: &str, strip: usize) -> Self {
        Self {
            kind,
            pattern: Regex::new(pattern).expect("lexer rule should be a valid regex"),
            strip,
        }
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(TokenKind::Create, r"\ACREATE", 0),
        Rule::new(TokenKind::Patch, r"\APATCH", 0),
        Rule::new(TokenKind::Delete, r"\ADELETE", 0),
        Rule::new(TokenKind::Run, r"\ARUN", 0),
        Rule::new(TokenKind::FetchExternal, r"\AFETCH_EXTERNAL", 0),
        Rule::new(TokenKind::Search, r"\ASEARCH", 0),
        Rule::new(TokenKind::Replace, r"\AREPLACE", 0),
        Rule::new(TokenKind::Block, r"\A<<<(?s:.*?)>>>", 3),
        Rule::new(TokenKind::String, r#"\A"[^"]*""#, 1),
        Rule::new(TokenKind::String, r"\A'[^']*'", 1),
        Rule::new(TokenKind::Word, r"\A[A-Za-z0-9_./-]+", 0),
    ]
});

/// True for characters the word rule accepts.
pub fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')
}

/// Tokenize `source` into a flat token sequence ending with [`TokenKind::Eof`].
///
/// Never fails: unrecognized characters are skipped.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}

/// Lexer state for one pass over a source string.
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    skipped: usize,
    pending_skip: Option<Span>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            skipped: 0,
            pending_skip: None,
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            if self.pos >= self.source.len() {
                break;
            }
            match self.match_rule() {
                Some(mut token) => {
                    token.skipped_before = self.pending_skip.take();
                    tokens.push(token);
                }
                None => self.skip_char(),
            }
        }

        if self.skipped > 0 {
            debug!(skipped = self.skipped, "lexer skipped unrecognized characters");
        }

        let mut eof = Token::new(TokenKind::Eof, None, self.span_here());
        eof.skipped_before = self.pending_skip.take();
        tokens.push(eof);
        tokens
    }

    fn match_rule(&mut self) -> Option<Token> {
        let rest = &self.source[self.pos..];
        for rule in RULES.iter() {
            let Some(found) = rule.pattern.find(rest) else {
                continue;
            };
            let matched = found.as_str();
            if rule.kind.keyword().is_some() && continues_word(&rest[matched.len()..]) {
                continue;
            }

            let value = match rule.kind {
                TokenKind::Block | TokenKind::String | TokenKind::Word => {
                    Some(matched[rule.strip..matched.len() - rule.strip].to_string())
                }
                _ => None,
            };
            let start = self.span_here();
            self.advance(matched.len());
            let span = Span {
                end: self.pos,
                ..start
            };
            return Some(Token::new(rule.kind, value, span));
        }
        None
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.source[self.pos..];
        let ws = rest.len() - rest.trim_start().len();
        self.advance(ws);
    }

    fn skip_char(&mut self) {
        let len = self.source[self.pos..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(1);
        self.skipped += 1;
        if self.pending_skip.is_none() {
            self.pending_skip = Some(Span {
                end: self.pos + len,
                ..self.span_here()
            });
        }
        self.advance(len);
    }

    fn advance(&mut self, bytes: usize) {
        let consumed = &self.source[self.pos..self.pos + bytes];
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos += bytes;
    }

    fn span_here(&self) -> Span {
        Span {
            start: self.pos,
            end: self.pos,
            line: self.line,
            column: self.column,
        }
    }
}

fn continues_word(rest: &str) -> bool {
    rest.chars().next().is_some_and(is_word_char)
}
