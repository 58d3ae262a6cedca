//! Page text: content-stream extraction and paragraph reflow.

use std::collections::HashMap;

use pdf::content::{Op, TextDrawAdjusted};
use pdf::font::ToUnicodeMap;
use pdf::object::{Resolve, Resources};
use pdf::primitive::{Name, PdfString};

/// `TJ` adjustments at or below this (thousandths of an em) read as a word gap.
const WORD_GAP: f32 = -180.0;
/// Baseline moves smaller than this (text space units) stay on one line.
const BASELINE_SLOP: f32 = 1.0;

/// Reflowed text of one page. Paragraph indices are what highlights anchor to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    paragraphs: Vec<String>,
}

impl PageText {
    pub fn new(paragraphs: Vec<String>) -> Self {
        Self { paragraphs }
    }

    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }
}

/// Text lines in drawing order.
pub(crate) fn extract_lines(ops: &[Op], resolver: &impl Resolve, resources: &Resources) -> Vec<String> {
    let mut fonts = Fonts {
        resolver,
        resources,
        maps: HashMap::new(),
    };
    let mut font: Option<Name> = None;
    let mut lines = LineBuilder::default();

    for op in ops {
        match op {
            Op::TextFont { name, .. } => font = Some(name.clone()),
            Op::TextDraw { text } => lines.text(&fonts.decode(font.as_ref(), text)),
            Op::TextDrawAdjusted { array } => {
                for item in array {
                    match item {
                        TextDrawAdjusted::Text(text) => {
                            lines.text(&fonts.decode(font.as_ref(), text));
                        }
                        TextDrawAdjusted::Spacing(adjust) if *adjust <= WORD_GAP => lines.gap(),
                        TextDrawAdjusted::Spacing(_) => {}
                    }
                }
            }
            Op::TextNewline => lines.break_line(),
            Op::MoveTextPosition { translation } if translation.y < 0.0 => lines.break_line(),
            Op::SetTextMatrix { matrix } => lines.baseline(matrix.f),
            _ => {}
        }
    }

    lines.finish()
}

#[derive(Default)]
struct LineBuilder {
    lines: Vec<String>,
    current: String,
    gap: bool,
    baseline: Option<f32>,
}

impl LineBuilder {
    fn text(&mut self, piece: &str) {
        let piece = sanitize(piece);
        if piece.is_empty() {
            return;
        }
        if std::mem::take(&mut self.gap)
            && !self.current.is_empty()
            && !self.current.ends_with(char::is_whitespace)
            && !piece.starts_with(char::is_whitespace)
            && !piece.starts_with([',', '.', ';', ':', '!', '?', ')', ']', '}'])
        {
            self.current.push(' ');
        }
        self.current.push_str(&piece);
    }

    fn gap(&mut self) {
        self.gap = true;
    }

    fn break_line(&mut self) {
        self.lines.push(std::mem::take(&mut self.current));
        self.gap = false;
    }

    /// A text matrix on a new baseline starts a new line.
    fn baseline(&mut self, y: f32) {
        if self
            .baseline
            .is_some_and(|prev| (prev - y).abs() > BASELINE_SLOP)
            && !self.current.is_empty()
        {
            self.break_line();
        }
        self.baseline = Some(y);
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() {
            self.lines.push(self.current);
        }
        self.lines
    }
}

/// ToUnicode maps per font resource, loaded on first use.
struct Fonts<'a, R> {
    resolver: &'a R,
    resources: &'a Resources,
    maps: HashMap<Name, Option<ToUnicodeMap>>,
}

impl<R: Resolve> Fonts<'_, R> {
    fn decode(&mut self, font: Option<&Name>, text: &PdfString) -> String {
        let Some(font) = font else {
            return text.to_string_lossy();
        };
        let (resolver, resources) = (self.resolver, self.resources);
        let map = self.maps.entry(font.clone()).or_insert_with(|| {
            resources
                .fonts
                .get(font)
                .and_then(|lazy| lazy.load(resolver).ok())
                .and_then(|loaded| loaded.to_unicode(resolver))
                .and_then(Result::ok)
        });
        map.as_ref()
            .and_then(|map| map_codes(text.as_bytes(), |code| map.get(code)))
            .unwrap_or_else(|| text.to_string_lossy())
    }
}

/// Maps glyph codes through `lookup`, reading the bytes as two-byte codes
/// when that covers at least as much of the string as single bytes. Gives
/// up when fewer than half of the codes map.
fn map_codes<'m>(bytes: &[u8], lookup: impl Fn(u16) -> Option<&'m str>) -> Option<String> {
    let narrow: Vec<u16> = bytes.iter().map(|&b| u16::from(b)).collect();
    let wide: Vec<u16> = if bytes.len().is_multiple_of(2) {
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect()
    } else {
        Vec::new()
    };
    let coverage = |codes: &[u16]| codes.iter().filter(|&&code| lookup(code).is_some()).count();

    let (narrow_hits, wide_hits) = (coverage(&narrow), coverage(&wide));
    let (codes, hits) = if !wide.is_empty() && wide_hits * narrow.len() >= narrow_hits * wide.len() {
        (wide, wide_hits)
    } else {
        (narrow, narrow_hits)
    };
    if hits == 0 || hits * 2 < codes.len() {
        return None;
    }
    Some(codes.iter().filter_map(|&code| lookup(code)).collect())
}

/// Drops what a terminal can't show: controls, replacement and soft-hyphen
/// chars, private-use and noncharacter code points. `\r` becomes `\n`.
pub(crate) fn sanitize(s: &str) -> String {
    s.chars()
        .map(|ch| if ch == '\r' { '\n' } else { ch })
        .filter(|&ch| is_printable(ch))
        .collect()
}

fn is_printable(ch: char) -> bool {
    match ch {
        '\n' | '\t' => true,
        '\u{FFFD}' | '\u{00AD}' => false,
        _ if ch.is_control() => false,
        '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{FFFFD}' | '\u{100000}'..='\u{10FFFD}' => false,
        '\u{FDD0}'..='\u{FDEF}' => false,
        _ => u32::from(ch) & 0xFFFE != 0xFFFE,
    }
}

struct SourceLine {
    text: String,
    indented: bool,
}

impl SourceLine {
    fn parse(raw: &str) -> Self {
        Self {
            text: raw.split_whitespace().collect::<Vec<_>>().join(" "),
            indented: raw.starts_with("  ") || raw.starts_with('\t'),
        }
    }

    fn width(&self) -> usize {
        self.text.chars().count()
    }

    fn ends_sentence(&self) -> bool {
        self.text
            .trim_end_matches(['"', '\'', '”', '’', ')'])
            .ends_with(['.', '!', '?', ':'])
    }

    fn is_list_item(&self) -> bool {
        let text = self.text.as_str();
        let rest = text.trim_start_matches(|ch: char| ch.is_ascii_digit());
        let after_marker = if rest.len() < text.len() {
            rest.strip_prefix(['.', ')'])
        } else {
            text.strip_prefix(['•', '◦', '-', '*', '–', '—'])
        };
        after_marker.is_some_and(|rest| rest.starts_with(' '))
    }
}

/// Joins hard-wrapped lines into paragraphs. A paragraph ends at a blank
/// line, before a list item or an indented line, and after a sentence that
/// stops well short of the widest line on the page.
pub(crate) fn reflow(raw: &str) -> Vec<String> {
    let lines: Vec<SourceLine> = sanitize(raw).lines().map(SourceLine::parse).collect();
    let widest = lines.iter().map(SourceLine::width).max().unwrap_or(0);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut prev: Option<&SourceLine> = None;

    for line in &lines {
        if line.text.is_empty() {
            close_paragraph(&mut paragraphs, &mut current);
            prev = None;
            continue;
        }
        if let Some(prev) = prev
            && (line.is_list_item()
                || line.indented
                || (prev.ends_sentence() && prev.width() * 4 < widest * 3))
        {
            close_paragraph(&mut paragraphs, &mut current);
        }
        join_line(&mut current, &line.text);
        prev = Some(line);
    }
    close_paragraph(&mut paragraphs, &mut current);
    paragraphs
}

fn close_paragraph(paragraphs: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        paragraphs.push(std::mem::take(current));
    }
}

/// `harpoon-` + `ers` rejoins the broken word; `Anglo-` + `Saxon` keeps the
/// hyphen of a compound.
fn join_line(paragraph: &mut String, line: &str) {
    if paragraph.is_empty() {
        paragraph.push_str(line);
        return;
    }
    let mut tail = paragraph.chars().rev();
    let hyphen_after_letter =
        tail.next() == Some('-') && tail.next().is_some_and(char::is_alphabetic);
    match line.chars().next() {
        Some(next) if hyphen_after_letter && next.is_lowercase() => {
            paragraph.pop();
        }
        Some(next) if hyphen_after_letter && next.is_alphabetic() => {}
        _ => paragraph.push(' '),
    }
    paragraph.push_str(line);
}
