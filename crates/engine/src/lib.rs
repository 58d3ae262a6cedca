//! PDF text engine and recommendation client.

mod gemini;
mod text;

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use folio_core::BookId;
use pdf::file::FileOptions;

pub use gemini::{GeminiClient, GeminiConfig, parse_recommendations, response_text};
pub use text::PageText;

pub const NO_TEXT_PLACEHOLDER: &str = "no text found";

/// Where the reader gets page counts and page text from.
pub trait PageSource {
    fn page_count(&self, book: &BookId) -> anyhow::Result<u32>;

    /// Reflowed text of a zero-based page.
    fn page_text(&self, book: &BookId, page_index: u32) -> anyhow::Result<PageText>;

    /// Drops anything cached for the previous book.
    fn invalidate(&self) {}
}

#[derive(Debug, Default)]
pub struct Engine {
    last_page: RefCell<Option<CachedPage>>,
}

#[derive(Debug, Clone)]
struct CachedPage {
    path: PathBuf,
    index: u32,
    text: PageText,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracted text of a zero-based page, as drawn in the content stream.
    pub fn raw_page_text(&self, book: &BookId, page_index: u32) -> anyhow::Result<String> {
        let path = Path::new(book.as_str());
        let file = FileOptions::cached()
            .open(path)
            .with_context(|| format!("open pdf {}", path.display()))?;
        let resolver = file.resolver();
        let page = file
            .get_page(page_index)
            .with_context(|| format!("load page {}", page_index + 1))?;
        let resources = page.resources()?;
        let Some(content) = &page.contents else {
            return Ok(NO_TEXT_PLACEHOLDER.to_string());
        };
        let ops = content.operations(&resolver)?;
        let text = text::extract_lines(&ops, &resolver, resources).join("\n");
        let text = text.trim();
        if text.is_empty() {
            Ok(NO_TEXT_PLACEHOLDER.to_string())
        } else {
            Ok(text.to_string())
        }
    }
}

impl PageSource for Engine {
    fn page_count(&self, book: &BookId) -> anyhow::Result<u32> {
        let path = Path::new(book.as_str());
        let file = FileOptions::cached()
            .open(path)
            .with_context(|| format!("open pdf {}", path.display()))?;
        Ok(file.num_pages())
    }

    /// Page text reflowed into paragraphs for the reader. A page without
    /// extractable text has no paragraphs. The last page served is cached so
    /// redraws don't reparse the file.
    fn page_text(&self, book: &BookId, page_index: u32) -> anyhow::Result<PageText> {
        let path = PathBuf::from(book.as_str());
        if let Some(cached) = self.last_page.borrow().as_ref()
            && cached.path == path
            && cached.index == page_index
        {
            return Ok(cached.text.clone());
        }

        let raw = self.raw_page_text(book, page_index)?;
        let text = if raw == NO_TEXT_PLACEHOLDER {
            PageText::default()
        } else {
            PageText::new(text::reflow(&raw))
        };
        tracing::debug!(
            book = %book,
            page = page_index + 1,
            paragraphs = text.paragraphs().len(),
            "extracted page text"
        );
        *self.last_page.borrow_mut() = Some(CachedPage {
            path,
            index: page_index,
            text: text.clone(),
        });
        Ok(text)
    }

    fn invalidate(&self) {
        self.last_page.borrow_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_path() {
        let engine = Engine::new();
        let book = BookId::new("/nonexistent/folio/missing.pdf");
        let err = engine.page_count(&book).err().map(|e| format!("{e:#}"));
        assert!(err.is_some_and(|msg| msg.contains("missing.pdf")));
    }

    #[test]
    fn page_text_errors_are_not_cached() {
        let engine = Engine::new();
        let book = BookId::new("/nonexistent/folio/missing.pdf");
        assert!(engine.page_text(&book, 0).is_err());
        assert!(engine.last_page.borrow().is_none());
    }
}
