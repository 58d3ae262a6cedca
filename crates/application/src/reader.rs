use folio_core::{BookId, BookState, Highlight, ProgressUpdate};

use crate::Store;

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 2.0;
pub const ZOOM_STEP: f32 = 0.1;

/// Viewing state for the book on screen. Only progress checkpoints leave
/// this struct; page, zoom and timing are session-local.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderSession {
    book: BookId,
    page: u32,
    num_pages: u32,
    zoom: f32,
    active_since_ms: i64,
}

impl ReaderSession {
    pub fn new(book: BookId, now_ms: i64) -> Self {
        Self {
            book,
            page: 1,
            num_pages: 0,
            zoom: 1.0,
            active_since_ms: now_ms,
        }
    }

    pub fn book(&self) -> &BookId {
        &self.book
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn zoom_percent(&self) -> u16 {
        (self.zoom * 100.0).round() as u16
    }

    /// Records the page count and resumes at the persisted last page.
    pub fn document_loaded(&mut self, store: &mut Store, num_pages: u32) {
        self.num_pages = num_pages;
        let resume = store
            .state()
            .progress_for(&self.book)
            .and_then(|p| p.last_page)
            .unwrap_or(1);
        self.page = resume.clamp(1, num_pages.max(1));
        store.update_reading_progress(
            self.book.clone(),
            ProgressUpdate::default()
                .total_pages(num_pages)
                .last_page(self.page),
        );
    }

    pub fn can_go_prev(&self) -> bool {
        self.page > 1
    }

    pub fn can_go_next(&self) -> bool {
        self.page < self.num_pages
    }

    /// Returns whether the page changed.
    pub fn prev_page(&mut self) -> bool {
        if !self.can_go_prev() {
            return false;
        }
        self.page -= 1;
        true
    }

    pub fn next_page(&mut self) -> bool {
        if !self.can_go_next() {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn go_to(&mut self, page: u32) -> bool {
        let target = page.clamp(1, self.num_pages.max(1));
        if target == self.page {
            return false;
        }
        self.page = target;
        true
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - ZOOM_STEP);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = 1.0;
    }

    fn set_zoom(&mut self, zoom: f32) {
        // Snap to tenths so repeated steps do not drift.
        let snapped = (zoom * 10.0).round() / 10.0;
        self.zoom = snapped.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Text column width for the available terminal width.
    pub fn column_width(&self, available: u16) -> u16 {
        let scaled = (f32::from(available) * self.zoom / MAX_ZOOM).round() as u16;
        scaled.clamp(available.min(20), available)
    }

    pub fn is_bookmarked(&self, state: &BookState) -> bool {
        state.is_bookmarked(&self.book, self.page)
    }

    /// Returns the new bookmarked flag.
    pub fn toggle_bookmark(&self, store: &mut Store) -> bool {
        if self.is_bookmarked(store.state()) {
            store.remove_bookmark(self.book.clone(), self.page);
            false
        } else {
            store.add_bookmark(self.book.clone(), self.page);
            true
        }
    }

    /// Highlights `content`, which starts at char `start` of reflowed
    /// paragraph `paragraph` on the current page.
    pub fn add_highlight(
        &self,
        store: &mut Store,
        paragraph: usize,
        start: usize,
        content: &str,
    ) -> bool {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return false;
        }
        let leading = content.chars().take_while(|ch| ch.is_whitespace()).count();
        store.add_highlight(
            self.book.clone(),
            Highlight::anchored(self.page, paragraph, start + leading, trimmed),
        );
        true
    }

    /// Folds the time since the last checkpoint into the book's cumulative
    /// reading time. Returns the seconds added.
    pub fn checkpoint(&mut self, store: &mut Store, now_ms: i64) -> u64 {
        let elapsed_secs = u64::try_from(now_ms.saturating_sub(self.active_since_ms) / 1000)
            .unwrap_or(0);
        let previous = store
            .state()
            .progress_for(&self.book)
            .and_then(|p| p.time_spent)
            .unwrap_or(0);

        let mut update = ProgressUpdate::default()
            .time_spent(previous.saturating_add(elapsed_secs))
            .last_read(now_ms);
        if self.num_pages > 0 {
            update = update.last_page(self.page);
        }
        store.update_reading_progress(self.book.clone(), update);
        self.active_since_ms = now_ms;
        tracing::debug!(book = %self.book, elapsed_secs, "reading checkpoint");
        elapsed_secs
    }
}
