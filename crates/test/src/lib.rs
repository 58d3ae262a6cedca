//! Test helpers and fixtures.

use std::rc::Rc;

use folio_application::{MemoryPersistence, Store};
use folio_core::{BookId, Recommendation};
use folio_storage::Storage;

pub fn book(id: &str) -> BookId {
    BookId::new(format!("/library/{id}.pdf"))
}

pub fn memory_store() -> Store {
    Store::open(Box::new(MemoryPersistence::new()))
}

/// A store over a shared sqlite handle, so a second store can rehydrate
/// from the same database.
pub fn sqlite_store(storage: &Rc<Storage>) -> Store {
    Store::open(Box::new(Rc::clone(storage)))
}

pub fn recommendation(title: &str) -> Recommendation {
    Recommendation {
        title: title.to_string(),
        description: format!("A book like {title}."),
    }
}

/// Deterministic xorshift sequence for property-style tests.
pub struct Sequence(u64);

impl Sequence {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_below(&mut self, bound: u64) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x % bound.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn books_are_pdf_paths() {
        assert_eq!(book("dune").as_str(), "/library/dune.pdf");
        assert_eq!(book("dune").title(), "dune");
    }

    #[test]
    fn sequence_stays_in_bounds() {
        let mut seq = Sequence::new(7);
        assert!((0..500).all(|_| seq.next_below(8) < 8));
    }

    #[test]
    fn memory_store_starts_empty() {
        let store = memory_store();
        assert!(store.state().current_book.is_none());
        assert!(store.persist_error().is_none());
    }
}
