//! Word wrapping and range styling for the reader column.

use std::ops::Range;

use folio_core::Highlight;
use ratatui::style::Style;
use ratatui::text::Span;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// A char range inside one reflowed paragraph.
pub(crate) type Mark = (usize, Range<usize>);

/// One screen row of the reader column. `anchor` is the paragraph index and
/// the char offset of the row's first char in it; gap rows have none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Row {
    pub(crate) text: String,
    pub(crate) anchor: Option<(usize, usize)>,
}

impl Row {
    pub(crate) fn plain(text: String) -> Self {
        Self { text, anchor: None }
    }

    /// Row-local char ranges of the marks that overlap this row.
    pub(crate) fn marked(&self, marks: &[Mark]) -> Vec<Range<usize>> {
        let Some((paragraph, start)) = self.anchor else {
            return Vec::new();
        };
        let end = start + self.text.chars().count();
        marks
            .iter()
            .filter(|(p, _)| *p == paragraph)
            .filter_map(|(_, range)| {
                let (from, to) = (range.start.max(start), range.end.min(end));
                (from < to).then(|| from - start..to - start)
            })
            .collect()
    }
}

/// Byte ranges of the lines `text` wraps into.
fn wrap_ranges(text: &str, max_width: usize) -> Vec<Range<usize>> {
    if max_width == 0 {
        return vec![0..text.len()];
    }

    let mut rows = Vec::new();
    let mut row: Option<Range<usize>> = None;
    let mut row_width = 0usize;

    for word in word_ranges(text) {
        let word_width = text.get(word.clone()).map_or(0, UnicodeWidthStr::width);
        if let Some(current) = row.as_mut()
            && row_width + 1 + word_width <= max_width
        {
            current.end = word.end;
            row_width += 1 + word_width;
            continue;
        }
        rows.extend(row.take());

        if word_width <= max_width {
            row = Some(word);
            row_width = word_width;
            continue;
        }

        // Hard-split words wider than the column.
        let mut start = word.start;
        let mut width = 0usize;
        for (offset, ch) in text.get(word.clone()).unwrap_or_default().char_indices() {
            let ch_width = ch.width().unwrap_or(0);
            let at = word.start + offset;
            if width + ch_width > max_width && at > start {
                rows.push(start..at);
                start = at;
                width = 0;
            }
            width += ch_width;
        }
        row = Some(start..word.end);
        row_width = width;
    }

    rows.extend(row);
    if rows.is_empty() {
        rows.push(0..0);
    }
    rows
}

fn word_ranges(text: &str) -> Vec<Range<usize>> {
    let mut words = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(from)) => {
                words.push(from..idx);
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(from) = start {
        words.push(from..text.len());
    }
    words
}

pub(crate) fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    wrap_ranges(text, max_width)
        .into_iter()
        .map(|range| text.get(range).unwrap_or_default().to_string())
        .collect()
}

/// Wraps paragraphs into rows with one gap row between them.
pub(crate) fn wrap_page(paragraphs: &[String], max_width: usize) -> Vec<Row> {
    let mut rows = Vec::new();
    for (idx, paragraph) in paragraphs.iter().enumerate() {
        if idx > 0 {
            rows.push(Row::plain(String::new()));
        }
        for range in wrap_ranges(paragraph, max_width) {
            let start = paragraph.get(..range.start).map_or(0, |s| s.chars().count());
            rows.push(Row {
                text: paragraph.get(range).unwrap_or_default().to_string(),
                anchor: Some((idx, start)),
            });
        }
    }
    rows
}

/// Marks for the highlights whose anchored text still matches the page.
pub(crate) fn highlight_marks<'a>(
    paragraphs: &[String],
    highlights: impl IntoIterator<Item = &'a Highlight>,
) -> Vec<Mark> {
    highlights
        .into_iter()
        .filter_map(|highlight| {
            let (paragraph, range) = highlight.anchor()?;
            let text = paragraphs.get(paragraph)?;
            let found: String = text.chars().skip(range.start).take(range.len()).collect();
            (found == highlight.content).then_some((paragraph, range))
        })
        .collect()
}

/// Case-insensitive, non-overlapping occurrences of `query` per paragraph.
pub(crate) fn search_marks(paragraphs: &[String], query: &str) -> Vec<Mark> {
    let needle: Vec<char> = query.trim().chars().map(fold).collect();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut marks = Vec::new();
    for (idx, paragraph) in paragraphs.iter().enumerate() {
        let haystack: Vec<char> = paragraph.chars().map(fold).collect();
        let mut at = 0usize;
        while at + needle.len() <= haystack.len() {
            if haystack[at..at + needle.len()] == needle[..] {
                marks.push((idx, at..at + needle.len()));
                at += needle.len();
            } else {
                at += 1;
            }
        }
    }
    marks
}

/// Lowercases chars that lowercase to a single char, keeping char offsets
/// aligned with the original text.
fn fold(ch: char) -> char {
    let mut lower = ch.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        _ => ch,
    }
}

/// Splits `line` into spans: `base`, with `highlighted` over the highlight
/// ranges and `matched` over search hits. Ranges are in chars.
pub(crate) fn styled_spans(
    line: &str,
    highlights: &[Range<usize>],
    matches: &[Range<usize>],
    base: Style,
    highlighted: Style,
    matched: Style,
) -> Vec<Span<'static>> {
    let chars: Vec<char> = line.chars().collect();
    let mut styles = vec![base; chars.len()];
    for (ranges, style) in [(highlights, highlighted), (matches, matched)] {
        for range in ranges {
            if let Some(cells) = styles.get_mut(range.start..range.end.min(chars.len())) {
                cells.fill(style);
            }
        }
    }

    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut run = String::new();
    for (idx, ch) in chars.iter().enumerate() {
        if idx > 0 && styles[idx] != styles[idx - 1] {
            spans.push(Span::styled(std::mem::take(&mut run), styles[idx - 1]));
        }
        run.push(*ch);
    }
    spans.push(Span::styled(run, styles.last().copied().unwrap_or(base)));
    spans
}
