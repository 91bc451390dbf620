//! Indentation block engine.
//!
//! The pattern locates a line; the match is the whole block that line heads,
//! decorators included (see [`crate::structure::block_span`]). Lines that
//! head nothing match on their own. Spans always cover whole lines.

use crate::capability::{Capability, CapabilitySet};
use crate::error::SurgeonResult;
use crate::matcher::{LiteralMatcher, Match, MatchOptions, Matcher, RegexMatcher};
use crate::structure::{self, BlockSpan, Line, indentation};

use super::{EditOutcome, Engine, EngineOptions, Placement, reindent, splice_with};

const LANGUAGES: &[&str] = &["python", "yaml", "coffeescript", "nim", "gdscript"];

#[derive(Debug, Default)]
pub struct BlockEngine {
    regex: RegexMatcher,
    literal: LiteralMatcher,
}

impl BlockEngine {
    pub fn new(cache_size: usize) -> Self {
        Self {
            regex: RegexMatcher::new(cache_size),
            literal: LiteralMatcher::new(),
        }
    }

    /// Distinct blocks headed by matching lines, in file order.
    pub fn spans(
        &self,
        content: &str,
        pattern: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<(Vec<Line>, Vec<BlockSpan>)> {
        let locate = MatchOptions {
            limit: None,
            ..opts.matching.clone()
        };
        let hits = if opts.regex {
            self.regex.find_all(content, pattern, &locate)?
        } else {
            self.literal.find_all(content, pattern, &locate)?
        };

        let lines = structure::lines(content);
        let limit = opts.matching.limit.unwrap_or(usize::MAX);
        let mut spans: Vec<BlockSpan> = Vec::new();
        for hit in hits {
            if spans.len() >= limit || lines.is_empty() {
                break;
            }
            let idx = structure::line_index(&lines, hit.start);
            if spans.last().is_some_and(|s| idx <= s.end_line) {
                continue;
            }
            spans.push(structure::block_span(content, &lines, idx));
        }
        Ok((lines, spans))
    }

    /// Insert `text` above or below whole blocks, indented like their header.
    fn insert_around(
        &self,
        content: &str,
        pattern: &str,
        text: &str,
        opts: &EngineOptions,
        placement: Placement,
    ) -> SurgeonResult<EditOutcome> {
        let (lines, spans) = self.spans(content, pattern, opts)?;
        let nl = structure::newline_of(content);
        let mut out = content.to_owned();
        for span in spans.iter().rev() {
            let header = lines[span.header_line];
            let block = reindent(text, indentation(&content[header.start..header.end]), nl);
            match placement {
                Placement::Before => out.insert_str(lines[span.start_line].start, &format!("{block}{nl}")),
                Placement::After => out.insert_str(lines[span.end_line].end, &format!("{nl}{block}")),
            }
        }
        let matches = spans
            .iter()
            .map(|s| Match::at(content, lines[s.start_line].start, lines[s.end_line].end))
            .collect();
        Ok(EditOutcome {
            content: out,
            count: spans.len(),
            matches,
        })
    }
}

impl Engine for BlockEngine {
    fn name(&self) -> &str {
        "block"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([
            Capability::StructuralSearch,
            Capability::TreeAware,
            Capability::ContextAware,
            Capability::Multiline,
            Capability::LanguageSpecific,
        ])
    }

    fn supported_languages(&self) -> &'static [&'static str] {
        LANGUAGES
    }

    fn search(&self, content: &str, pattern: &str, opts: &EngineOptions) -> SurgeonResult<Vec<Match>> {
        let (lines, spans) = self.spans(content, pattern, opts)?;
        Ok(spans
            .iter()
            .map(|span| {
                let mut m = Match::at(content, lines[span.start_line].start, lines[span.end_line].end);
                let header = lines[span.header_line];
                m.named_groups
                    .insert("header".to_owned(), content[header.start..header.end].trim().to_owned());
                m
            })
            .collect())
    }

    /// The replacement takes the indentation of the block's first line.
    fn replace(
        &self,
        content: &str,
        pattern: &str,
        replacement: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        if replacement.is_empty() {
            return self.delete(content, pattern, opts);
        }
        let matches = self.search(content, pattern, opts)?;
        let nl = structure::newline_of(content);
        let out = splice_with(content, &matches, |m| {
            let first_line = m.text.lines().next().unwrap_or_default();
            reindent(replacement, indentation(first_line), nl)
        });
        Ok(EditOutcome {
            content: out,
            count: matches.len(),
            matches,
        })
    }

    fn insert_before(
        &self,
        content: &str,
        pattern: &str,
        text: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        self.insert_around(content, pattern, text, opts, Placement::Before)
    }

    fn insert_after(
        &self,
        content: &str,
        pattern: &str,
        text: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        self.insert_around(content, pattern, text, opts, Placement::After)
    }
}
