//! Core domain types for Folio.

use std::collections::BTreeMap;
use std::ops::Range;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Record key the whole reading state is persisted under.
pub const STORAGE_KEY: &str = "book-storage";
pub const STATE_VERSION: u32 = 0;

pub const RECENT_BOOKS_LIMIT: usize = 5;
pub const ANNOTATION_COLOR: &str = "#3B82F6";
pub const HIGHLIGHT_COLOR: &str = "#FACC15";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub String);

impl BookId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the identifier.
    pub fn file_name(&self) -> &str {
        self.0
            .rsplit(['/', '\\'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.0)
    }

    /// File name without a trailing `.pdf`.
    pub fn title(&self) -> String {
        let name = self.file_name();
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".pdf") && name.len() > 4 {
            name[..name.len() - 4].to_string()
        } else {
            name.to_string()
        }
    }

    pub fn short_label(&self, max_chars: usize) -> String {
        let name = self.file_name();
        if name.chars().count() <= max_chars {
            return name.to_string();
        }
        let mut out: String = name.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub page: u32,
    pub text: String,
    pub color: String,
    /// Unix milliseconds, supplied by the caller.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// `position.y` is the paragraph index within the reflowed page and
/// `position.x` the char offset of `content` inside that paragraph, so a
/// highlight survives rewrapping at any zoom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub page: u32,
    pub content: String,
    pub color: String,
    pub position: Position,
}

impl Highlight {
    pub fn anchored(page: u32, paragraph: usize, start: usize, content: &str) -> Self {
        Self {
            page,
            content: content.to_string(),
            color: HIGHLIGHT_COLOR.to_string(),
            position: Position {
                x: start as f64,
                y: paragraph as f64,
            },
        }
    }

    /// Paragraph index and char range covered, when the position holds
    /// whole non-negative coordinates.
    pub fn anchor(&self) -> Option<(usize, Range<usize>)> {
        let whole = |v: f64| (v.is_finite() && v >= 0.0 && v.fract() == 0.0).then_some(v as usize);
        let start = whole(self.position.x)?;
        let paragraph = whole(self.position.y)?;
        Some((paragraph, start..start + self.content.chars().count()))
    }
}

/// Per-book reading record. Every field is optional because records are
/// built up by partial merges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadingProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_page: Option<u32>,
    /// Unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read: Option<i64>,
    /// Cumulative seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u64>,
}

impl ReadingProgress {
    pub fn merge(&mut self, update: &ProgressUpdate) {
        if let Some(total_pages) = update.total_pages {
            self.total_pages = Some(total_pages);
        }
        if let Some(last_page) = update.last_page {
            self.last_page = Some(last_page);
        }
        if let Some(last_read) = update.last_read {
            self.last_read = Some(last_read);
        }
        if let Some(time_spent) = update.time_spent {
            self.time_spent = Some(time_spent);
        }
    }

    /// `round(last / total * 100)`; `None` when either side is unknown or
    /// the page count is zero.
    pub fn percent(&self) -> Option<u32> {
        let last = self.last_page?;
        let total = self.total_pages?;
        if total == 0 {
            return None;
        }
        Some(((last as f64 / total as f64) * 100.0).round() as u32)
    }
}

/// Fields to overwrite in a [`ReadingProgress`]; unset fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub total_pages: Option<u32>,
    pub last_page: Option<u32>,
    pub last_read: Option<i64>,
    pub time_spent: Option<u64>,
}

impl ProgressUpdate {
    pub fn total_pages(mut self, value: u32) -> Self {
        self.total_pages = Some(value);
        self
    }

    pub fn last_page(mut self, value: u32) -> Self {
        self.last_page = Some(value);
        self
    }

    pub fn last_read(mut self, value: i64) -> Self {
        self.last_read = Some(value);
        self
    }

    pub fn time_spent(mut self, value: u64) -> Self {
        self.time_spent = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetCurrentBook(BookId),
    AddBookmark { book: BookId, page: u32 },
    RemoveBookmark { book: BookId, page: u32 },
    AddRecentBook(BookId),
    AddAnnotation { book: BookId, annotation: Annotation },
    AddHighlight { book: BookId, highlight: Highlight },
    UpdateReadingProgress { book: BookId, update: ProgressUpdate },
    ToggleDarkMode,
    SetSearchQuery(String),
    SetGeminiApiKey(String),
}

/// The complete reading state. Only [`BookState::apply`] produces new
/// snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookState {
    pub current_book: Option<BookId>,
    pub bookmarks: BTreeMap<BookId, Vec<u32>>,
    pub recent_books: Vec<BookId>,
    pub annotations: BTreeMap<BookId, Vec<Annotation>>,
    pub highlights: BTreeMap<BookId, Vec<Highlight>>,
    pub reading_progress: BTreeMap<BookId, ReadingProgress>,
    pub is_dark_mode: bool,
    pub search_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
}

impl BookState {
    pub fn apply(&self, action: &Action) -> BookState {
        let mut next = self.clone();
        match action {
            Action::SetCurrentBook(book) => {
                next.current_book = Some(book.clone());
            }
            Action::AddBookmark { book, page } => {
                next.bookmarks.entry(book.clone()).or_default().push(*page);
            }
            Action::RemoveBookmark { book, page } => {
                next.bookmarks
                    .entry(book.clone())
                    .or_default()
                    .retain(|p| p != page);
            }
            Action::AddRecentBook(book) => {
                next.recent_books.retain(|b| b != book);
                next.recent_books.insert(0, book.clone());
                next.recent_books.truncate(RECENT_BOOKS_LIMIT);
            }
            Action::AddAnnotation { book, annotation } => {
                next.annotations
                    .entry(book.clone())
                    .or_default()
                    .push(annotation.clone());
            }
            Action::AddHighlight { book, highlight } => {
                next.highlights
                    .entry(book.clone())
                    .or_default()
                    .push(highlight.clone());
            }
            Action::UpdateReadingProgress { book, update } => {
                next.reading_progress
                    .entry(book.clone())
                    .or_default()
                    .merge(update);
            }
            Action::ToggleDarkMode => {
                next.is_dark_mode = !next.is_dark_mode;
            }
            Action::SetSearchQuery(query) => {
                next.search_query = query.clone();
            }
            Action::SetGeminiApiKey(key) => {
                next.gemini_api_key = Some(key.clone());
            }
        }
        next
    }

    pub fn bookmarks_for(&self, book: &BookId) -> &[u32] {
        self.bookmarks.get(book).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn annotations_for(&self, book: &BookId) -> &[Annotation] {
        self.annotations.get(book).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn highlights_for(&self, book: &BookId) -> &[Highlight] {
        self.highlights.get(book).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn progress_for(&self, book: &BookId) -> Option<&ReadingProgress> {
        self.reading_progress.get(book)
    }

    pub fn is_bookmarked(&self, book: &BookId, page: u32) -> bool {
        self.bookmarks_for(book).contains(&page)
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<S> {
    state: S,
    version: u32,
}

pub fn encode_state(state: &BookState) -> anyhow::Result<String> {
    let envelope = Envelope {
        state,
        version: STATE_VERSION,
    };
    serde_json::to_string(&envelope).context("serialize book state")
}

pub fn decode_state(raw: &str) -> anyhow::Result<BookState> {
    let envelope: Envelope<BookState> =
        serde_json::from_str(raw).context("parse persisted book state")?;
    if envelope.version != STATE_VERSION {
        anyhow::bail!("unsupported book state version {}", envelope.version);
    }
    Ok(envelope.state)
}

/// Durable key/value record storage for serialized state.
pub trait StatePersistence {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

impl<T: StatePersistence + ?Sized> StatePersistence for std::rc::Rc<T> {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).load(key)
    }

    fn save(&self, key: &str, value: &str) -> anyhow::Result<()> {
        (**self).save(key, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("recommendation request failed: {message}")]
    Request { message: String },
    #[error("failed to parse recommendations: {message}")]
    Parse { message: String },
}

/// A service that suggests books similar to a title.
pub trait Recommender: Send + Sync {
    fn recommend(
        &self,
        title: &str,
        api_key: &str,
    ) -> Result<Vec<Recommendation>, RecommendError>;
}

pub fn recommendation_prompt(title: &str) -> String {
    format!(
        "Suggest 5 similar books to \"{title}\" with brief descriptions. Format as JSON array with title and description fields."
    )
}

pub fn format_time_spent(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{hours}h {minutes}m")
}
