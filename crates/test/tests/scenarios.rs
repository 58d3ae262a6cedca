use std::rc::Rc;
use std::sync::{Arc, mpsc};

use folio_application::{
    MemoryPersistence, ReaderSession, ReadingStats, RecommendationsPanel, RequestState, Store,
    submit_annotation,
};
use folio_core::{
    BookState, ProgressUpdate, RECENT_BOOKS_LIMIT, RecommendError, Recommendation, Recommender,
    STORAGE_KEY, encode_state,
};
use folio_engine::{parse_recommendations, response_text};
use folio_storage::Storage;
use folio_test::{Sequence, book, memory_store, recommendation, sqlite_store};

#[test]
fn bookmarks_stay_with_their_book() {
    let mut store = memory_store();
    let (a, b) = (book("a"), book("b"));

    store.open_book(a.clone());
    store.add_bookmark(a.clone(), 5);
    store.open_book(b.clone());
    store.add_bookmark(b.clone(), 10);

    let state = store.state();
    assert_eq!(state.bookmarks_for(&a), &[5]);
    assert_eq!(state.bookmarks_for(&b), &[10]);
    assert_eq!(state.current_book.as_ref(), Some(&b));
    assert_eq!(state.recent_books, vec![b, a]);
}

#[test]
fn sqlite_rehydrates_identical_state() -> anyhow::Result<()> {
    let storage = Rc::new(Storage::open_in_memory()?);
    let dune = book("dune");
    {
        let mut store = sqlite_store(&storage);
        store.open_book(dune.clone());
        store.add_bookmark(dune.clone(), 12);
        store.update_reading_progress(
            dune.clone(),
            ProgressUpdate::default().total_pages(400).last_page(12),
        );
        assert!(submit_annotation(&mut store, 12, "spice", 1_700_000_000_000));
        store.toggle_dark_mode();
        store.set_search_query("arrakis");
        assert!(store.persist_error().is_none());
    }

    let rehydrated = sqlite_store(&storage);
    let raw = storage.load_record(STORAGE_KEY)?.unwrap_or_default();
    assert_eq!(encode_state(rehydrated.state())?, raw);
    assert!(rehydrated.state().is_dark_mode);
    assert_eq!(rehydrated.state().search_query, "arrakis");
    assert_eq!(rehydrated.state().bookmarks_for(&dune), &[12]);
    Ok(())
}

#[test]
fn state_survives_process_restart_on_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("folio.db");
    let emma = book("emma");

    let before = {
        let mut store = Store::open(Box::new(Storage::open(&path)?));
        store.open_book(emma.clone());
        let mut session = ReaderSession::new(emma.clone(), 0);
        session.document_loaded(&mut store, 300);
        session.go_to(42);
        session.checkpoint(&mut store, 90_000);
        store.state().clone()
    };

    let mut store = Store::open(Box::new(Storage::open(&path)?));
    assert_eq!(store.state(), &before);

    let mut session = ReaderSession::new(emma.clone(), 100_000);
    session.document_loaded(&mut store, 300);
    assert_eq!(session.page(), 42);

    let progress = store.state().progress_for(&emma).cloned().unwrap_or_default();
    assert_eq!(progress.time_spent, Some(90));
    assert_eq!(progress.last_page, Some(42));
    assert_eq!(progress.total_pages, Some(300));
    Ok(())
}

#[test]
fn recent_books_hold_invariants_over_random_opens() {
    let mut store = memory_store();
    let mut seq = Sequence::new(0x5eed);
    let ids: Vec<_> = (0..8).map(|i| book(&format!("book-{i}"))).collect();

    for _ in 0..300 {
        let next = ids[seq.next_below(ids.len() as u64) as usize].clone();
        store.add_recent_book(next.clone());

        let recent = &store.state().recent_books;
        assert!(recent.len() <= RECENT_BOOKS_LIMIT);
        assert_eq!(recent.first(), Some(&next));
        let mut unique = recent.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), recent.len());
    }
}

#[test]
fn unreadable_record_falls_back_then_heals() -> anyhow::Result<()> {
    let backend = Rc::new(MemoryPersistence::with_record(STORAGE_KEY, "{not json"));
    let mut store = Store::open(Box::new(Rc::clone(&backend)));
    assert_eq!(store.state(), &BookState::default());

    store.toggle_dark_mode();
    let healed = Store::open(Box::new(backend));
    assert!(healed.state().is_dark_mode);
    Ok(())
}

#[test]
fn stats_report_quarter_progress() {
    let mut store = memory_store();
    let dune = book("dune");
    store.open_book(dune.clone());
    store.update_reading_progress(
        dune,
        ProgressUpdate::default()
            .last_page(50)
            .total_pages(200)
            .time_spent(3_720),
    );

    let stats = ReadingStats::for_current(store.state());
    assert_eq!(stats.as_ref().map(|s| s.percent), Some(Some(25)));
    assert_eq!(
        stats.as_ref().map(|s| s.time_spent.as_str()),
        Some("1h 2m")
    );
}

struct CannedRecommender {
    body: String,
}

impl Recommender for CannedRecommender {
    fn recommend(
        &self,
        _title: &str,
        api_key: &str,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        if api_key.is_empty() {
            return Err(RecommendError::MissingCredential);
        }
        let text = response_text(&self.body)?;
        parse_recommendations(&text)
    }
}

#[test]
fn recommendations_arrive_from_worker_thread() -> anyhow::Result<()> {
    let text = serde_json::to_string(&[recommendation("Hyperion"), recommendation("Solaris")])?;
    let body = serde_json::json!({
        "candidates": [{ "content": { "parts": [{ "text": format!("```json\n{text}\n```") }] } }],
    })
    .to_string();
    let recommender: Arc<dyn Recommender> = Arc::new(CannedRecommender { body });

    let store = memory_store();
    let mut panel = RecommendationsPanel::new(store.state(), Some("key".to_string()));
    let request = panel
        .request("Dune")
        .ok_or_else(|| anyhow::anyhow!("request should start"))?;

    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(&recommender);
    let handle = std::thread::spawn(move || {
        let result = worker.recommend(&request.title, &request.api_key);
        tx.send((request.ticket, result)).is_ok()
    });
    assert!(handle.join().unwrap_or(false));

    let (ticket, result) = rx.recv()?;
    assert!(panel.finish(ticket, result));
    let titles: Vec<_> = panel
        .recommendations()
        .iter()
        .map(|r| r.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Hyperion", "Solaris"]);
    Ok(())
}

#[test]
fn malformed_model_output_leaves_panel_idle() -> anyhow::Result<()> {
    let body = r#"{"candidates":[{"content":{"parts":[{"text":"I cannot help with that."}]}}]}"#;
    let recommender = CannedRecommender {
        body: body.to_string(),
    };
    let mut panel = RecommendationsPanel::new(&Default::default(), Some("key".to_string()));
    let request = panel
        .request("Dune")
        .ok_or_else(|| anyhow::anyhow!("request should start"))?;

    let result = recommender.recommend(&request.title, &request.api_key);
    assert!(matches!(result, Err(RecommendError::Parse { .. })));
    assert!(panel.finish(request.ticket, result));
    assert_eq!(panel.request_state(), &RequestState::Idle);
    Ok(())
}
