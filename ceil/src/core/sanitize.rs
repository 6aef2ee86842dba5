//! Cleanup of raw generator responses before tokenizing.
//!
//! Generators wrap CEIL in prose and markdown. This pass keeps the section
//! after the last `COMMANDS` heading, turns fenced code that follows a
//! block-taking line into a `<<< >>>` block, and drops leftover fence lines.
//! Whatever it leaves behind is still lexed tolerantly.

use super::lexer::{BLOCK_CLOSE, BLOCK_OPEN};

const FENCE: &str = "```";

/// Normalize a generator response into CEIL source.
pub fn sanitize_response(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .rposition(|line| is_commands_heading(line))
        .map_or(0, |i| i + 1);
    let lines = &lines[start..];

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if is_fence(line) {
            i += 1;
            continue;
        }
        out.push(line);
        i += 1;

        if !expects_block(line) {
            continue;
        }
        let Some(open) = next_non_blank(lines, i) else {
            continue;
        };
        if !is_fence(lines[open]) {
            continue;
        }
        out.push(BLOCK_OPEN);
        i = open + 1;
        while i < lines.len() && !is_fence(lines[i]) {
            out.push(lines[i]);
            i += 1;
        }
        out.push(BLOCK_CLOSE);
        // Skip the closing fence.
        i += 1;
    }
    out.join("\n")
}

fn is_commands_heading(line: &str) -> bool {
    let heading = line
        .trim()
        .trim_start_matches('#')
        .trim()
        .trim_end_matches(':')
        .trim_matches('*')
        .trim();
    heading.eq_ignore_ascii_case("commands")
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// A `CREATE` line or a line ending in `SEARCH`/`REPLACE` that carries no
/// block of its own.
fn expects_block(line: &str) -> bool {
    if line.contains(BLOCK_OPEN) {
        return false;
    }
    let mut words = line.split_whitespace();
    let first = words.next();
    let last = words.last().or(first);
    first == Some("CREATE") || matches!(last, Some("SEARCH" | "REPLACE"))
}

fn next_non_blank(lines: &[&str], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&i| !lines[i].trim().is_empty())
}
