//! Print a [`Program`] back to CEIL source.
//!
//! Output re-parses to the same program as long as no block payload is empty
//! or contains the close marker, and no target contains both quote characters.

use super::ast::{Command, Program};
use super::lexer::{BLOCK_CLOSE, BLOCK_OPEN, is_word_char};
use super::token::TokenKind;

const KEYWORDS: [TokenKind; 7] = [
    TokenKind::Create,
    TokenKind::Patch,
    TokenKind::Delete,
    TokenKind::Run,
    TokenKind::FetchExternal,
    TokenKind::Search,
    TokenKind::Replace,
];

/// Render every command on its own line.
pub fn render(program: &Program) -> String {
    let mut out = String::new();
    for command in program {
        render_command(&mut out, command);
        out.push('\n');
    }
    out
}

fn render_command(out: &mut String, command: &Command) {
    out.push_str(command.kind().as_str());
    out.push(' ');
    match command {
        Command::Create { file, content } => {
            out.push_str(&target(file));
            out.push(' ');
            out.push_str(&block(content));
        }
        Command::Patch {
            file,
            search,
            replace,
        } => {
            out.push_str(&target(file));
            out.push_str(" SEARCH ");
            out.push_str(&block(search));
            out.push_str(" REPLACE ");
            out.push_str(&block(replace));
        }
        Command::Delete { file } => out.push_str(&target(file)),
        Command::Run { target: run } => out.push_str(&target(run)),
        Command::FetchExternal { url } => out.push_str(&target(url)),
    }
}

fn target(value: &str) -> String {
    let plain = !value.is_empty()
        && value.chars().all(is_word_char)
        && !KEYWORDS.iter().any(|k| k.keyword() == Some(value));
    if plain {
        value.to_string()
    } else if value.contains('"') {
        format!("'{value}'")
    } else {
        format!("\"{value}\"")
    }
}

fn block(content: &str) -> String {
    if !content.contains('\n') {
        format!("{BLOCK_OPEN} {content} {BLOCK_CLOSE}")
    } else if content.ends_with('\r') {
        format!("{BLOCK_OPEN}\n{content} {BLOCK_CLOSE}")
    } else {
        format!("{BLOCK_OPEN}\n{content}\n{BLOCK_CLOSE}")
    }
}
