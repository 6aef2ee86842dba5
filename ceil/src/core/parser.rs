//! Keyword-driven parser for CEIL token streams.
//!
//! One pass, no backtracking. Tokens that cannot start a command are skipped,
//! which keeps the parser tolerant of prose a generator leaves around its
//! commands. A command whose keyword is present but whose operands are
//! malformed is a hard [`SyntaxError`].

use std::fmt;

use super::ast::{Command, Program};
use super::lexer::tokenize;
use super::token::{Span, Token, TokenKind};

/// A malformed command, located at the offending token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "syntax error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for SyntaxError {}

/// Parse a token stream into a [`Program`]. No partial program on error.
pub fn parse(tokens: &[Token]) -> Result<Program, SyntaxError> {
    Parser::new(tokens).parse()
}

/// Tokenize and parse `source` in one step.
pub fn parse_source(source: &str) -> Result<Program, SyntaxError> {
    parse(&tokenize(source))
}

/// Parser state over a borrowed token slice.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    eof: Token,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        let eof_span = tokens.last().map(|t| t.span).unwrap_or_default();
        Self {
            tokens,
            pos: 0,
            eof: Token::new(TokenKind::Eof, None, eof_span),
        }
    }

    pub fn parse(mut self) -> Result<Program, SyntaxError> {
        let mut commands = Vec::new();
        while !self.is_at_end() {
            let command = match self.current().kind {
                TokenKind::Create => self.parse_create()?,
                TokenKind::Patch => self.parse_patch()?,
                TokenKind::Delete => self.parse_delete()?,
                TokenKind::Run => self.parse_run()?,
                TokenKind::FetchExternal => self.parse_fetch()?,
                _ => {
                    self.advance();
                    continue;
                }
            };
            commands.push(command);
        }
        Ok(Program::new(commands))
    }

    fn parse_create(&mut self) -> Result<Command, SyntaxError> {
        self.advance();
        let file = self.expect_target("CREATE")?;
        let content = self.expect_block("CREATE content")?;
        Ok(Command::Create { file, content })
    }

    fn parse_patch(&mut self) -> Result<Command, SyntaxError> {
        self.advance();
        let file = self.expect_target("PATCH")?;
        self.expect(TokenKind::Search, "PATCH target")?;
        let search = self.expect_block("SEARCH")?;
        self.expect(TokenKind::Replace, "SEARCH block")?;
        let replace = self.expect_block("REPLACE")?;
        Ok(Command::Patch {
            file,
            search,
            replace,
        })
    }

    fn parse_delete(&mut self) -> Result<Command, SyntaxError> {
        self.advance();
        let file = self.expect_target("DELETE")?;
        Ok(Command::Delete { file })
    }

    /// `RUN` also absorbs the following words on the target's line, so a
    /// shell-style invocation does not need quoting. Words are only joined
    /// when nothing but whitespace separates them.
    fn parse_run(&mut self) -> Result<Command, SyntaxError> {
        self.advance();
        let line = self.current().span.line;
        let mut target = self.expect_target("RUN")?;
        loop {
            self.reject_skipped_on_line(line, "RUN")?;
            let token = self.current();
            if !is_target(token.kind) || token.span.line != line {
                break;
            }
            target.push(' ');
            target.push_str(token.text());
            self.advance();
        }
        Ok(Command::Run { target })
    }

    fn parse_fetch(&mut self) -> Result<Command, SyntaxError> {
        self.advance();
        let line = self.current().span.line;
        let url = self.expect_target("FETCH_EXTERNAL")?;
        self.reject_skipped_on_line(line, "FETCH_EXTERNAL")?;
        Ok(Command::FetchExternal { url })
    }

    fn expect_target(&mut self, after: &str) -> Result<String, SyntaxError> {
        let token = self.current();
        if !is_target(token.kind) {
            return Err(self.error(&format!(
                "expected a file or target after {after}, found {}",
                token.kind
            )));
        }
        let value = token.text().to_string();
        let end = token.span.end;
        self.advance();
        if let Some(skipped) = self.current().skipped_before
            && skipped.start == end
        {
            return Err(skipped_error(
                skipped,
                &format!("unrecognized character right after target {value:?} of {after}; quote the target"),
            ));
        }
        Ok(value)
    }

    /// Free-form targets lose any character the lexer dropped, so one on the
    /// target's line would silently change its meaning.
    fn reject_skipped_on_line(&self, line: usize, keyword: &str) -> Result<(), SyntaxError> {
        match self.current().skipped_before {
            Some(skipped) if skipped.line == line => Err(skipped_error(
                skipped,
                &format!("unrecognized character in {keyword} target; quote the whole target"),
            )),
            _ => Ok(()),
        }
    }

    fn expect_block(&mut self, after: &str) -> Result<String, SyntaxError> {
        let token = self.current();
        if token.kind != TokenKind::Block {
            return Err(self.error(&format!(
                "expected a <<< >>> block after {after}, found {}",
                token.kind
            )));
        }
        let value = unpad_block(token.text()).to_string();
        self.advance();
        Ok(value)
    }

    fn expect(&mut self, kind: TokenKind, after: &str) -> Result<(), SyntaxError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!(
                "expected {kind} after {after}, found {}",
                self.current().kind
            )))
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn error(&self, message: &str) -> SyntaxError {
        let Span { line, column, .. } = self.current().span;
        SyntaxError {
            message: message.to_string(),
            line,
            column,
        }
    }
}

fn skipped_error(skipped: Span, message: &str) -> SyntaxError {
    SyntaxError {
        message: message.to_string(),
        line: skipped.line,
        column: skipped.column,
    }
}

fn is_target(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::Word | TokenKind::String)
}

/// Drop at most one padding unit from each end of a raw block payload.
///
/// `<<< hello >>>` and `<<<\nhello\n>>>` both carry `hello`; any further
/// whitespace belongs to the content.
pub fn unpad_block(raw: &str) -> &str {
    let inner = ["\r\n", "\n", " ", "\t"]
        .iter()
        .find_map(|pad| raw.strip_prefix(pad))
        .unwrap_or(raw);
    ["\r\n", "\n", " ", "\t"]
        .iter()
        .find_map(|pad| inner.strip_suffix(pad))
        .unwrap_or(inner)
}
