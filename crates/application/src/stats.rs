use folio_core::{BookState, format_time_spent};

/// Derived reading statistics for the current book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingStats {
    pub percent: Option<u32>,
    pub time_spent: String,
    pub last_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub last_read_ms: Option<i64>,
}

impl ReadingStats {
    pub fn for_current(state: &BookState) -> Option<Self> {
        let book = state.current_book.as_ref()?;
        let progress = state.progress_for(book)?;
        Some(Self {
            percent: progress.percent(),
            time_spent: format_time_spent(progress.time_spent.unwrap_or(0)),
            last_page: progress.last_page,
            total_pages: progress.total_pages,
            last_read_ms: progress.last_read,
        })
    }

    pub fn percent_label(&self) -> String {
        match self.percent {
            Some(percent) => format!("{percent}%"),
            None => "--%".to_string(),
        }
    }

    pub fn pages_label(&self) -> String {
        let show = |value: Option<u32>| value.map(|v| v.to_string()).unwrap_or_else(|| "?".into());
        format!("{} / {}", show(self.last_page), show(self.total_pages))
    }
}
