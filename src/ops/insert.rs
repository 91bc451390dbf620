//! Anchored insertion and block-aware append.

use crate::engine::{EditOutcome, Engine, EngineOptions, Placement, reindent};
use crate::error::SurgeonResult;
use crate::matcher::{Match, MatchOptions};
use crate::structure::{self, indentation, is_blank};

/// Insert `text` above or below every line the engine matches, indented like it.
pub fn insert(
    engine: &dyn Engine,
    content: &str,
    pattern: &str,
    text: &str,
    placement: Placement,
    opts: &EngineOptions,
) -> SurgeonResult<EditOutcome> {
    match placement {
        Placement::Before => engine.insert_before(content, pattern, text, opts),
        Placement::After => engine.insert_after(content, pattern, text, opts),
    }
}

/// Append `text` to the file, or to the end of a block.
///
/// With an empty pattern the text goes after the last line. Otherwise the
/// first match picks a line; the text lands at the end of the block that
/// line heads, indented like the block body. A closing brace that ends the
/// block stays last.
pub fn append(
    engine: &dyn Engine,
    content: &str,
    pattern: &str,
    text: &str,
    opts: &EngineOptions,
) -> SurgeonResult<EditOutcome> {
    let nl = structure::newline_of(content);
    if pattern.is_empty() {
        return Ok(append_to_end(content, text, nl));
    }

    let first_only = EngineOptions {
        matching: MatchOptions {
            limit: Some(1),
            ..opts.matching.clone()
        },
        ..opts.clone()
    };
    let Some(hit) = engine.search(content, pattern, &first_only)?.into_iter().next() else {
        return Ok(EditOutcome::unchanged(content));
    };

    let lines = structure::lines(content);
    let text_of = |i: usize| &content[lines[i].start..lines[i].end];
    let span = structure::block_span(content, &lines, structure::line_index(&lines, hit.start));

    let header_indent = indentation(text_of(span.header_line));
    let body_indent = (span.header_line + 1..=span.end_line)
        .map(text_of)
        .find(|l| !is_blank(l) && indentation(l).len() > header_indent.len())
        .map_or(header_indent, indentation);

    // Keep a closing delimiter at the header's depth below the new text.
    let closes = span.end_line > span.header_line && {
        let last = text_of(span.end_line);
        indentation(last).len() == header_indent.len() && last.trim_start().starts_with(['}', ')', ']'])
    };
    let block = reindent(text, body_indent, nl);
    let mut out = content.to_owned();
    if closes {
        out.insert_str(lines[span.end_line].start, &format!("{block}{nl}"));
    } else {
        out.insert_str(lines[span.end_line].end, &format!("{nl}{block}"));
    }

    Ok(EditOutcome {
        content: out,
        matches: vec![Match::at(content, lines[span.start_line].start, lines[span.end_line].end)],
        count: 1,
    })
}

fn append_to_end(content: &str, text: &str, nl: &str) -> EditOutcome {
    let mut out = content.to_owned();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push_str(nl);
    }
    out.push_str(text);
    if content.ends_with('\n') && !text.ends_with('\n') {
        out.push_str(nl);
    }
    let end = content.len();
    EditOutcome {
        content: out,
        matches: vec![Match::at(content, end, end)],
        count: 1,
    }
}
