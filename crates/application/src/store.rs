use std::cell::RefCell;
use std::collections::HashMap;

use folio_core::{
    Action, Annotation, BookId, BookState, Highlight, ProgressUpdate, STORAGE_KEY,
    StatePersistence, decode_state, encode_state,
};

/// Owns the reading state and writes the full snapshot back after every
/// transition.
pub struct Store {
    state: BookState,
    backend: Box<dyn StatePersistence>,
    persist_error: Option<String>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .field("persist_error", &self.persist_error)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Rehydrates from `backend`, falling back to defaults when the record is
    /// missing or unreadable.
    pub fn open(backend: Box<dyn StatePersistence>) -> Self {
        let state = match backend.load(STORAGE_KEY) {
            Ok(Some(raw)) => match decode_state(&raw) {
                Ok(state) => {
                    tracing::info!(
                        recent = state.recent_books.len(),
                        "rehydrated book state"
                    );
                    state
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "persisted book state unreadable; using defaults");
                    BookState::default()
                }
            },
            Ok(None) => BookState::default(),
            Err(err) => {
                tracing::warn!(error = ?err, "failed to load book state; using defaults");
                BookState::default()
            }
        };

        Self {
            state,
            backend,
            persist_error: None,
        }
    }

    pub fn state(&self) -> &BookState {
        &self.state
    }

    /// Most recent persistence failure, cleared by the next successful write.
    pub fn persist_error(&self) -> Option<&str> {
        self.persist_error.as_deref()
    }

    pub fn dispatch(&mut self, action: Action) -> &BookState {
        tracing::debug!(?action, "dispatch");
        self.state = self.state.apply(&action);
        self.persist();
        &self.state
    }

    fn persist(&mut self) {
        let result = encode_state(&self.state)
            .and_then(|raw| self.backend.save(STORAGE_KEY, &raw));
        match result {
            Ok(()) => self.persist_error = None,
            Err(err) => {
                tracing::warn!(error = ?err, "failed to persist book state");
                self.persist_error = Some(format!("{err:#}"));
            }
        }
    }

    pub fn set_current_book(&mut self, book: BookId) {
        self.dispatch(Action::SetCurrentBook(book));
    }

    pub fn add_bookmark(&mut self, book: BookId, page: u32) {
        self.dispatch(Action::AddBookmark { book, page });
    }

    pub fn remove_bookmark(&mut self, book: BookId, page: u32) {
        self.dispatch(Action::RemoveBookmark { book, page });
    }

    pub fn add_recent_book(&mut self, book: BookId) {
        self.dispatch(Action::AddRecentBook(book));
    }

    pub fn add_annotation(&mut self, book: BookId, annotation: Annotation) {
        self.dispatch(Action::AddAnnotation { book, annotation });
    }

    pub fn add_highlight(&mut self, book: BookId, highlight: Highlight) {
        self.dispatch(Action::AddHighlight { book, highlight });
    }

    pub fn update_reading_progress(&mut self, book: BookId, update: ProgressUpdate) {
        self.dispatch(Action::UpdateReadingProgress { book, update });
    }

    pub fn toggle_dark_mode(&mut self) {
        self.dispatch(Action::ToggleDarkMode);
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.dispatch(Action::SetSearchQuery(query.into()));
    }

    pub fn set_gemini_api_key(&mut self, key: impl Into<String>) {
        self.dispatch(Action::SetGeminiApiKey(key.into()));
    }

    /// Makes `book` current and moves it to the front of the recent list.
    pub fn open_book(&mut self, book: BookId) {
        tracing::info!(book = %book, "open book");
        self.set_current_book(book.clone());
        self.add_recent_book(book);
    }
}

/// Volatile backend for tests and for running without a database.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: RefCell<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(key: &str, value: &str) -> Self {
        let backend = Self::default();
        backend
            .records
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        backend
    }
}

impl StatePersistence for MemoryPersistence {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.records.borrow().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.records
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
