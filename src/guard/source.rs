//! Source positions and callee rendering.

use proc_macro2::{LineColumn, Span};
use quote::ToTokens;

/// Line index over one source file, for slicing the text behind a span.
#[derive(Debug)]
pub(crate) struct SourceMap<'s> {
    text: &'s str,
    line_starts: Vec<usize>,
}

impl<'s> SourceMap<'s> {
    pub(crate) fn new(text: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, line_starts }
    }

    /// Byte offset of a span position. Lines are 1-based, columns count
    /// characters from 0.
    fn offset(&self, at: LineColumn) -> Option<usize> {
        let start = *self.line_starts.get(at.line.checked_sub(1)?)?;
        let line = &self.text[start..];
        let line = &line[..line.find('\n').unwrap_or(line.len())];
        if at.column == line.chars().count() {
            return Some(start + line.len());
        }
        line.char_indices()
            .nth(at.column)
            .map(|(byte, _)| start + byte)
    }

    pub(crate) fn slice(&self, start: LineColumn, end: LineColumn) -> Option<&'s str> {
        let (from, to) = (self.offset(start)?, self.offset(end)?);
        self.text.get(from..to).filter(|text| !text.is_empty())
    }
}

/// Renders the callee between `start` and `end` as it is written, with
/// line breaks and indentation removed. Falls back to the token stream of
/// `tokens` when the span does not map back onto the source.
pub(crate) fn render_callee(
    map: &SourceMap<'_>,
    start: Span,
    end: Span,
    tokens: &dyn ToTokens,
) -> String {
    match map.slice(start.start(), end.end()) {
        Some(text) => text.lines().map(str::trim).collect(),
        None => render_tokens(tokens),
    }
}

fn render_tokens(tokens: &dyn ToTokens) -> String {
    tokens
        .to_token_stream()
        .to_string()
        .replace(" :: ", "::")
        .replace(":: ", "::")
        .replace(" . ", ".")
        .replace(" (", "(")
}
