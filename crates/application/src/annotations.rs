use folio_core::{ANNOTATION_COLOR, Annotation, BookState};

use crate::Store;

/// Attaches a note to `page` of the current book. Empty text, or no current
/// book, is a silent no-op.
pub fn submit_annotation(store: &mut Store, page: u32, text: &str, now_ms: i64) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    let Some(book) = store.state().current_book.clone() else {
        return false;
    };

    store.add_annotation(
        book,
        Annotation {
            page,
            text: text.to_string(),
            color: ANNOTATION_COLOR.to_string(),
            timestamp: now_ms,
        },
    );
    true
}

pub fn annotations_on_page(state: &BookState, page: u32) -> Vec<&Annotation> {
    let Some(book) = state.current_book.as_ref() else {
        return Vec::new();
    };
    state
        .annotations_for(book)
        .iter()
        .filter(|a| a.page == page)
        .collect()
}

#[cfg(test)]
mod tests {
    use folio_core::BookId;

    use super::*;
    use crate::MemoryPersistence;

    #[test]
    fn rejects_blank_text_and_missing_book() {
        let mut store = Store::open(Box::new(MemoryPersistence::new()));
        assert!(!submit_annotation(&mut store, 1, "a note", 10));
        store.open_book(BookId::new("a.pdf"));
        assert!(!submit_annotation(&mut store, 1, "   ", 10));
        assert!(store.state().annotations.is_empty());
    }

    #[test]
    fn stores_trimmed_text_with_timestamp() {
        let mut store = Store::open(Box::new(MemoryPersistence::new()));
        store.open_book(BookId::new("a.pdf"));
        assert!(submit_annotation(&mut store, 4, "  remember this ", 1_700));

        let notes = annotations_on_page(store.state(), 4);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "remember this");
        assert_eq!(notes[0].timestamp, 1_700);
        assert_eq!(notes[0].color, ANNOTATION_COLOR);
    }

    #[test]
    fn filters_by_page_and_current_book() {
        let mut store = Store::open(Box::new(MemoryPersistence::new()));
        store.open_book(BookId::new("a.pdf"));
        submit_annotation(&mut store, 1, "one", 1);
        submit_annotation(&mut store, 2, "two", 2);
        submit_annotation(&mut store, 1, "uno", 3);

        let texts: Vec<_> = annotations_on_page(store.state(), 1)
            .into_iter()
            .map(|a| a.text.as_str())
            .collect();
        assert_eq!(texts, vec!["one", "uno"]);

        store.open_book(BookId::new("b.pdf"));
        assert!(annotations_on_page(store.state(), 1).is_empty());
    }
}
