//! ratatui-based UI.

use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use anyhow::Context as _;
use chrono::{Local, TimeZone as _};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{event, terminal};
use folio_application::{
    Credential, ReaderSession, ReadingStats, RecommendationRequest, RecommendationsPanel,
    RequestState, Store, annotations_on_page, submit_annotation,
};
use folio_core::{BookId, RecommendError, Recommendation, Recommender};
use folio_engine::{NO_TEXT_PLACEHOLDER, PageSource, PageText};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, Paragraph, Wrap,
};

mod layout_text;

use layout_text::{Row, highlight_marks, search_marks, styled_spans, wrap_page, wrap_text};

const SIDEBAR_WIDTH: u16 = 30;
const SIDE_PANEL_WIDTH: u16 = 36;
const SIDEBAR_LABEL_CHARS: usize = 20;

type RecommendationResult = (u64, Result<Vec<Recommendation>, RecommendError>);

pub struct Ui {
    store: Store,
    pages: Box<dyn PageSource>,
    recommender: Arc<dyn Recommender>,
    clock: Box<dyn Fn() -> i64>,
    focus: Focus,
    sidebar: SidebarPanel,
    reader: Option<ReaderPanel>,
    search: SearchBar,
    goto_panel: GotoPanel,
    open_panel: OpenFilePanel,
    annotation_input: AnnotationInput,
    recommendations_open: bool,
    recommendations: RecommendationsPanel,
    results_tx: Sender<RecommendationResult>,
    results_rx: Receiver<RecommendationResult>,
    notice: Option<Notice>,
}

impl Ui {
    /// Builds the UI around an already rehydrated store. The book that was
    /// current in the last session is reopened when its file still loads.
    pub fn new(
        store: Store,
        pages: Box<dyn PageSource>,
        recommender: Arc<dyn Recommender>,
        fallback_key: Option<String>,
    ) -> Self {
        let recommendations = RecommendationsPanel::new(store.state(), fallback_key);
        let (results_tx, results_rx) = mpsc::channel();
        let mut ui = Self {
            store,
            pages,
            recommender,
            clock: Box::new(now_ms),
            focus: Focus::Sidebar,
            sidebar: SidebarPanel::default(),
            reader: None,
            search: SearchBar::default(),
            goto_panel: GotoPanel::default(),
            open_panel: OpenFilePanel::default(),
            annotation_input: AnnotationInput::default(),
            recommendations_open: false,
            recommendations,
            results_tx,
            results_rx,
            notice: None,
        };
        if let Some(err) = ui.store.persist_error() {
            ui.notice = Some(Notice::error(format!("storage: {err}")));
        }
        if let Some(book) = ui.store.state().current_book.clone() {
            ui.open_book(book);
        }
        ui
    }

    /// Validates `path` and opens it as the current book.
    pub fn open_path(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = resolve_pdf_path(&path.to_string_lossy())?;
        let book = BookId::new(path.to_string_lossy());
        if !self.open_book(book) {
            anyhow::bail!("could not open {}", path.display());
        }
        Ok(())
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut terminal = setup_terminal()?;
        terminal.clear().ok();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        let restore_result = restore_terminal(&mut terminal);
        self.shutdown();

        match (result, restore_result) {
            (Ok(Ok(())), Ok(())) => Ok(()),
            (Ok(Ok(())), Err(err)) => Err(err),
            (Ok(Err(err)), Ok(())) => Err(err),
            (Ok(Err(err)), Err(restore)) => Err(err.context(format!(
                "additionally failed to restore terminal: {restore}"
            ))),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
        let tick_rate = Duration::from_millis(250);
        let mut needs_redraw = true;

        loop {
            if self.drain_recommendations() {
                needs_redraw = true;
            }

            if needs_redraw {
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
            }

            if !event::poll(tick_rate)? {
                continue;
            }

            match event::read()? {
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }
                    needs_redraw = true;

                    let quit = if self.recommendations_open {
                        self.handle_recommendations_key(key)
                    } else if self.open_panel.open {
                        self.handle_open_panel_key(key)
                    } else if self.goto_panel.open {
                        self.handle_goto_panel_key(key)
                    } else if self.annotation_input.open {
                        self.handle_annotation_input_key(key)
                    } else if self.search.editing {
                        self.handle_search_key(key)
                    } else {
                        self.handle_main_key(key)
                    };
                    if quit {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    fn drain_recommendations(&mut self) -> bool {
        let mut changed = false;
        while let Ok((ticket, result)) = self.results_rx.try_recv() {
            changed |= self.recommendations.finish(ticket, result);
        }
        changed
    }

    fn accent_color(&self) -> Color {
        if self.store.state().is_dark_mode {
            Color::Yellow
        } else {
            Color::Blue
        }
    }

    fn base_style(&self) -> Style {
        if self.store.state().is_dark_mode {
            Style::default().fg(Color::Gray).bg(Color::Black)
        } else {
            Style::default().fg(Color::Black).bg(Color::White)
        }
    }

    fn checkpoint(&mut self) {
        let now = (self.clock)();
        if let Some(reader) = self.reader.as_mut() {
            reader.session.checkpoint(&mut self.store, now);
        }
    }

    /// Records reading time for the open book on the way out.
    fn shutdown(&mut self) {
        self.checkpoint();
        if let Some(err) = self.store.persist_error() {
            tracing::warn!(error = %err, "final state was not saved");
        }
    }

    /// Checkpoints the open book, then switches to `book`. Returns false
    /// when the file could not be loaded.
    fn open_book(&mut self, book: BookId) -> bool {
        let num_pages = match self.pages.page_count(&book) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(book = %book, error = %format!("{err:#}"), "failed to open book");
                self.notice = Some(Notice::error(format!(
                    "could not open {}: {err}",
                    book.file_name()
                )));
                return false;
            }
        };

        self.checkpoint();
        self.pages.invalidate();
        self.store.open_book(book.clone());
        let mut session = ReaderSession::new(book.clone(), (self.clock)());
        session.document_loaded(&mut self.store, num_pages);
        tracing::info!(book = %book, pages = num_pages, page = session.page(), "opened book");

        self.reader = Some(ReaderPanel {
            session,
            scroll: 0,
            rows: Vec::new(),
            error: None,
        });
        self.recommendations.reset();
        self.focus = Focus::Reader;
        self.notice = Some(Notice::info(format!("opened {}", book.file_name())));
        true
    }

    fn close_book(&mut self) {
        self.checkpoint();
        self.reader = None;
        self.recommendations.reset();
        self.focus = Focus::Sidebar;
    }

    fn turn_page(&mut self, turn: impl FnOnce(&mut ReaderSession) -> bool) {
        let now = (self.clock)();
        let Some(reader) = self.reader.as_mut() else {
            return;
        };
        if turn(&mut reader.session) {
            reader.scroll = 0;
            reader.session.checkpoint(&mut self.store, now);
        }
    }

    /// Highlights the top visible row of the reader column.
    fn highlight_top_row(&mut self) {
        let Some(reader) = self.reader.as_ref() else {
            return;
        };
        let Some((row, (paragraph, start))) = reader
            .rows
            .iter()
            .skip(reader.scroll)
            .find_map(|row| row.anchor.map(|anchor| (row, anchor)))
        else {
            return;
        };
        if reader
            .session
            .add_highlight(&mut self.store, paragraph, start, &row.text)
        {
            self.notice = Some(Notice::info("highlighted line".to_string()));
        }
    }

    fn handle_main_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Sidebar if self.reader.is_some() => Focus::Reader,
                    _ => Focus::Sidebar,
                };
            }
            KeyCode::Char('o') => {
                self.open_panel.open = true;
                self.open_panel.error = None;
            }
            KeyCode::Char('/') => {
                self.search.editing = true;
            }
            KeyCode::Char('d') => {
                self.store.toggle_dark_mode();
            }
            KeyCode::Char('r') if self.reader.is_some() => {
                self.recommendations_open = true;
            }
            _ => match self.focus {
                Focus::Sidebar => self.handle_sidebar_key(key),
                Focus::Reader => self.handle_reader_key(key),
            },
        }
        false
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        let rows = self.sidebar_rows();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.sidebar.selected = step_selectable(&rows, self.sidebar.selected, false);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.sidebar.selected = step_selectable(&rows, self.sidebar.selected, true);
            }
            KeyCode::Enter => {
                let selected = normalize_selection(&rows, self.sidebar.selected);
                match rows.get(selected) {
                    Some(SidebarRow::Book(book)) => {
                        self.open_book(book.clone());
                    }
                    Some(SidebarRow::Bookmark { book, page }) => {
                        let page = *page;
                        let same_book = self
                            .reader
                            .as_ref()
                            .is_some_and(|r| r.session.book() == book);
                        if same_book || self.open_book(book.clone()) {
                            self.turn_page(|session| session.go_to(page));
                            self.focus = Focus::Reader;
                        }
                    }
                    _ => {}
                }
            }
            KeyCode::Esc if self.reader.is_some() => {
                self.focus = Focus::Reader;
            }
            _ => {}
        }
    }

    fn handle_reader_key(&mut self, key: KeyEvent) {
        if self.reader.is_none() {
            return;
        }
        match key.code {
            KeyCode::Left | KeyCode::Char('h') | KeyCode::PageUp => {
                self.turn_page(ReaderSession::prev_page);
            }
            KeyCode::Right | KeyCode::Char('l') | KeyCode::PageDown | KeyCode::Char(' ') => {
                self.turn_page(ReaderSession::next_page);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if let Some(reader) = self.reader.as_mut() {
                    reader.scroll = reader.scroll.saturating_sub(1);
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if let Some(reader) = self.reader.as_mut() {
                    let max = reader.rows.len().saturating_sub(1);
                    reader.scroll = (reader.scroll + 1).min(max);
                }
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                if let Some(reader) = self.reader.as_mut() {
                    reader.session.zoom_in();
                    reader.scroll = 0;
                }
            }
            KeyCode::Char('-') => {
                if let Some(reader) = self.reader.as_mut() {
                    reader.session.zoom_out();
                    reader.scroll = 0;
                }
            }
            KeyCode::Char('0') => {
                if let Some(reader) = self.reader.as_mut() {
                    reader.session.reset_zoom();
                    reader.scroll = 0;
                }
            }
            KeyCode::Char('g') => {
                self.goto_panel.open = true;
                self.goto_panel.input.clear();
                self.goto_panel.error = None;
            }
            KeyCode::Char('b') => {
                if let Some(reader) = self.reader.as_ref() {
                    let marked = reader.session.toggle_bookmark(&mut self.store);
                    let page = reader.session.page();
                    self.notice = Some(Notice::info(if marked {
                        format!("bookmarked page {page}")
                    } else {
                        format!("removed bookmark on page {page}")
                    }));
                }
            }
            KeyCode::Char('v') => self.highlight_top_row(),
            KeyCode::Char('a') => {
                self.annotation_input.open = true;
                self.annotation_input.input.clear();
                self.annotation_input.error = None;
            }
            KeyCode::Esc => {
                self.close_book();
            }
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> bool {
        let mut query = self.store.state().search_query.clone();
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.search.editing = false;
                return false;
            }
            KeyCode::Backspace => {
                query.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                query.clear();
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                query.push(ch);
            }
            _ => return false,
        }
        self.store.set_search_query(query);
        false
    }

    fn handle_goto_panel_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.goto_panel.open = false;
                self.goto_panel.input.clear();
                self.goto_panel.error = None;
            }
            KeyCode::Enter => {
                let input = self.goto_panel.input.trim();
                if input.is_empty() {
                    self.goto_panel.error = Some("Enter a page number".to_string());
                    return false;
                }
                let page = match input.parse::<u32>() {
                    Ok(p) if p >= 1 => p,
                    _ => {
                        self.goto_panel.error = Some("Invalid page number".to_string());
                        return false;
                    }
                };
                let total = self
                    .reader
                    .as_ref()
                    .map(|r| r.session.num_pages())
                    .unwrap_or(0);
                if page > total {
                    self.goto_panel.error = Some(format!("Page out of range (1..={total})"));
                    return false;
                }

                self.turn_page(|session| session.go_to(page));
                self.notice = Some(Notice::info(format!("jumped to page {page}")));
                self.goto_panel.open = false;
                self.goto_panel.error = None;
            }
            KeyCode::Backspace => {
                self.goto_panel.input.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.goto_panel.input.clear();
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() => {
                self.goto_panel.input.push(ch);
            }
            _ => {}
        }
        false
    }

    fn handle_open_panel_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.open_panel.open = false;
                self.open_panel.error = None;
            }
            KeyCode::Enter => match resolve_pdf_path(&self.open_panel.input) {
                Ok(path) => {
                    if self.open_book(BookId::new(path.to_string_lossy())) {
                        self.open_panel.open = false;
                        self.open_panel.input.clear();
                        self.open_panel.error = None;
                    } else {
                        self.open_panel.error = self.notice.as_ref().map(|n| n.text.clone());
                    }
                }
                Err(err) => {
                    self.open_panel.error = Some(format!("{err:#}"));
                }
            },
            KeyCode::Backspace => {
                self.open_panel.input.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.open_panel.input.clear();
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                self.open_panel.input.push(ch);
            }
            _ => {}
        }
        false
    }

    fn handle_annotation_input_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.annotation_input.open = false;
                self.annotation_input.input.clear();
                self.annotation_input.error = None;
            }
            KeyCode::Enter => {
                let Some(page) = self.reader.as_ref().map(|r| r.session.page()) else {
                    self.annotation_input.open = false;
                    return false;
                };
                let now = (self.clock)();
                if submit_annotation(&mut self.store, page, &self.annotation_input.input, now) {
                    self.annotation_input.open = false;
                    self.annotation_input.input.clear();
                    self.annotation_input.error = None;
                    self.notice = Some(Notice::info(format!("annotated page {page}")));
                } else {
                    self.annotation_input.error = Some("Annotation cannot be empty".to_string());
                }
            }
            KeyCode::Backspace => {
                self.annotation_input.input.pop();
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                self.annotation_input.input.push(ch);
            }
            _ => {}
        }
        false
    }

    fn handle_recommendations_key(&mut self, key: KeyEvent) -> bool {
        if self.recommendations.is_editing() {
            match key.code {
                KeyCode::Esc => self.recommendations.cancel_credential_input(),
                KeyCode::Enter => {
                    if !self.recommendations.confirm_credential(&mut self.store) {
                        self.notice = Some(Notice::error("API key cannot be empty".to_string()));
                    }
                }
                KeyCode::Tab => self.recommendations.toggle_remember(),
                KeyCode::Backspace => self.recommendations.pop_char(),
                KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.recommendations.clear_input();
                }
                KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.recommendations.push_char(ch);
                }
                _ => {}
            }
            return false;
        }

        match key.code {
            KeyCode::Esc | KeyCode::Char('r') => {
                self.recommendations_open = false;
            }
            KeyCode::Char('k') => self.recommendations.begin_credential_input(),
            KeyCode::Enter => {
                let Some(title) = self.reader.as_ref().map(|r| r.session.book().title()) else {
                    return false;
                };
                if let Some(request) = self.recommendations.request(&title) {
                    self.spawn_recommendation(request);
                }
            }
            _ => {}
        }
        false
    }

    fn spawn_recommendation(&self, request: RecommendationRequest) {
        let recommender = Arc::clone(&self.recommender);
        let tx = self.results_tx.clone();
        tracing::debug!(ticket = request.ticket, title = %request.title, "spawning recommendation request");
        std::thread::spawn(move || {
            let result = recommender.recommend(&request.title, &request.api_key);
            // The receiver is gone once the UI has shut down.
            let _ = tx.send((request.ticket, result));
        });
    }

    fn sidebar_rows(&self) -> Vec<SidebarRow> {
        let state = self.store.state();
        let mut rows = vec![SidebarRow::Heading("Recent Books")];
        if state.recent_books.is_empty() {
            rows.push(SidebarRow::Empty("no books yet, press o"));
        }
        rows.extend(state.recent_books.iter().cloned().map(SidebarRow::Book));

        rows.push(SidebarRow::Spacer);
        rows.push(SidebarRow::Heading("Bookmarks"));
        let before = rows.len();
        for (book, pages) in &state.bookmarks {
            if pages.is_empty() {
                continue;
            }
            rows.push(SidebarRow::BookmarkBook(book.clone()));
            rows.extend(pages.iter().map(|&page| SidebarRow::Bookmark {
                book: book.clone(),
                page,
            }));
        }
        if rows.len() == before {
            rows.push(SidebarRow::Empty("no bookmarks"));
        }
        rows
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        frame.render_widget(Clear, area);
        frame.render_widget(Block::default().style(self.base_style()), area);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(area);

        let header = Paragraph::new(Text::from(self.header_lines()))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(header, layout[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(SIDEBAR_WIDTH),
                Constraint::Min(0),
                Constraint::Length(SIDE_PANEL_WIDTH),
            ])
            .split(layout[1]);

        self.draw_sidebar(body[0], frame);
        self.draw_reader(body[1], frame);
        self.draw_side_panels(body[2], frame);

        let footer = Paragraph::new(Text::from(self.footer_lines()))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::TOP));
        frame.render_widget(footer, layout[2]);

        if self.goto_panel.open {
            self.draw_goto_panel(area, frame);
        }
        if self.open_panel.open {
            self.draw_open_panel(area, frame);
        }
        if self.annotation_input.open {
            self.draw_annotation_input(area, frame);
        }
        if self.recommendations_open {
            self.draw_recommendations_panel(area, frame);
        }
    }

    fn header_lines(&self) -> Vec<Line<'static>> {
        let state = self.store.state();
        let title = match &self.reader {
            Some(reader) => format!("Folio — {}", reader.session.book().title()),
            None => "Folio".to_string(),
        };
        let theme = if state.is_dark_mode { "dark" } else { "light" };
        let mut spans = vec![
            Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("  ·  {theme}")),
        ];

        if self.search.editing || !state.search_query.is_empty() {
            let label = if self.search.editing { "  ·  /" } else { "  ·  search: " };
            spans.push(Span::raw(label));
            spans.push(Span::styled(
                state.search_query.clone(),
                Style::default()
                    .fg(self.accent_color())
                    .add_modifier(Modifier::BOLD),
            ));
            if self.search.editing {
                spans.push(Span::raw("█"));
            }
        }

        let mut lines = vec![Line::from(spans)];
        if let Some(err) = self.store.persist_error() {
            lines.push(Line::from(Span::styled(
                format!("not saved: {err}"),
                Style::default().fg(Color::Red),
            )));
        }
        lines
    }

    fn footer_lines(&self) -> Vec<Line<'static>> {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let key = |k: &'static str| Span::styled(k, bold);

        let mut spans = if self.search.editing {
            vec![
                key("Enter/Esc"),
                Span::raw(" done  "),
                key("Ctrl+u"),
                Span::raw(" clear"),
            ]
        } else if let Some(reader) = self.reader.as_ref().filter(|_| self.focus == Focus::Reader)
        {
            let dim = Style::default().add_modifier(Modifier::DIM);
            let prev_style = if reader.session.can_go_prev() { bold } else { dim };
            let next_style = if reader.session.can_go_next() { bold } else { dim };
            vec![
                Span::styled("←", prev_style),
                Span::raw("/"),
                Span::styled("→", next_style),
                Span::raw(" page  "),
                key("g"),
                Span::raw(" goto  "),
                key("+/-/0"),
                Span::raw(" zoom  "),
                key("b"),
                Span::raw(" bookmark  "),
                key("v"),
                Span::raw(" highlight  "),
                key("a"),
                Span::raw(" annotate  "),
                key("r"),
                Span::raw(" similar  "),
                key("Tab"),
                Span::raw(" sidebar  "),
                key("Esc"),
                Span::raw(" close"),
            ]
        } else {
            vec![
                key("↑/↓"),
                Span::raw(" move  "),
                key("Enter"),
                Span::raw(" open  "),
                key("Tab"),
                Span::raw(" reader  "),
            ]
        };
        if !self.search.editing {
            spans.extend([
                Span::raw("  "),
                key("o"),
                Span::raw(" open file  "),
                key("/"),
                Span::raw(" search  "),
                key("d"),
                Span::raw(" theme  "),
                key("q"),
                Span::raw(" quit"),
            ]);
        }

        let mut lines = vec![Line::from(spans)];
        if let Some(notice) = &self.notice {
            let color = if notice.is_error { Color::Red } else { Color::Green };
            lines.push(Line::from(Span::styled(
                notice.text.clone(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
        }
        lines
    }

    fn draw_sidebar(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let rows = self.sidebar_rows();
        self.sidebar.selected = normalize_selection(&rows, self.sidebar.selected);
        let current = self.reader.as_ref().map(|r| r.session.book().clone());
        let heading = Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
        let dim = Style::default().add_modifier(Modifier::DIM);

        let items: Vec<ListItem> = rows
            .iter()
            .map(|row| match row {
                SidebarRow::Heading(label) => ListItem::new(Line::styled(*label, heading)),
                SidebarRow::Spacer => ListItem::new(Line::raw("")),
                SidebarRow::Empty(label) => ListItem::new(Line::styled(*label, dim)),
                SidebarRow::Book(book) => {
                    let label = book.short_label(SIDEBAR_LABEL_CHARS);
                    let style = if current.as_ref() == Some(book) {
                        Style::default().fg(self.accent_color())
                    } else {
                        Style::default()
                    };
                    ListItem::new(Line::styled(label, style))
                }
                SidebarRow::BookmarkBook(book) => ListItem::new(Line::styled(
                    book.short_label(SIDEBAR_LABEL_CHARS),
                    Style::default().add_modifier(Modifier::ITALIC),
                )),
                SidebarRow::Bookmark { page, .. } => {
                    ListItem::new(Line::raw(format!("  Page {page}")))
                }
            })
            .collect();

        let border_style = if self.focus == Focus::Sidebar {
            Style::default().fg(self.accent_color())
        } else {
            Style::default()
        };
        let highlight_style = Style::default()
            .fg(Color::Black)
            .bg(self.accent_color())
            .add_modifier(Modifier::BOLD);
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(Span::styled(
                        "Library",
                        Style::default().add_modifier(Modifier::BOLD),
                    )),
            )
            .highlight_style(highlight_style)
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);

        let mut list_state = ListState::default();
        if rows.get(self.sidebar.selected).is_some_and(SidebarRow::is_selectable) {
            list_state.select(Some(self.sidebar.selected));
        }
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn draw_reader(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let accent = self.accent_color();
        let border_style = if self.focus == Focus::Reader {
            Style::default().fg(accent)
        } else {
            Style::default()
        };

        let Some(reader) = self.reader.as_mut() else {
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title("Reader");
            let welcome = Paragraph::new(Text::from(vec![
                Line::raw(""),
                Line::styled(
                    "No book open",
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Line::raw(""),
                Line::raw("Press o to open a PDF, or pick a recent book."),
            ]))
            .alignment(Alignment::Center)
            .block(block);
            frame.render_widget(welcome, area);
            return;
        };

        let session = &reader.session;
        let state = self.store.state();
        let book = session.book().clone();
        let page = session.page();
        let marker = if session.is_bookmarked(state) { " ★" } else { "" };
        let title = format!(
            "p{page}/{} · {}%{marker}",
            session.num_pages(),
            session.zoom_percent()
        );
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::styled(title, Style::default().add_modifier(Modifier::BOLD)));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let column = session.column_width(inner.width);
        let text = match self.pages.page_text(&book, page.saturating_sub(1)) {
            Ok(text) => {
                reader.error = None;
                text
            }
            Err(err) => {
                if reader.error.is_none() {
                    tracing::warn!(book = %book, page, error = %format!("{err:#}"), "page text failed");
                }
                reader.error = Some(format!("could not read page {page}: {err:#}"));
                PageText::default()
            }
        };
        let placeholder = reader.error.is_some() || text.is_empty();
        reader.rows = match &reader.error {
            Some(message) => wrap_text(message, usize::from(column))
                .into_iter()
                .map(Row::plain)
                .collect(),
            None if text.is_empty() => vec![Row::plain(format!("({NO_TEXT_PLACEHOLDER})"))],
            None => wrap_page(text.paragraphs(), usize::from(column)),
        };
        let max_scroll = reader.rows.len().saturating_sub(1);
        reader.scroll = reader.scroll.min(max_scroll);

        let query = state.search_query.as_str();
        let highlights = highlight_marks(
            text.paragraphs(),
            state.highlights_for(&book).iter().filter(|h| h.page == page),
        );
        let hits = search_marks(text.paragraphs(), query);
        let match_style = Style::default()
            .fg(Color::Black)
            .bg(accent)
            .add_modifier(Modifier::BOLD);
        let highlight_style = Style::default().bg(if state.is_dark_mode {
            Color::Rgb(92, 76, 18)
        } else {
            Color::Rgb(250, 204, 21)
        });

        let lines: Vec<Line<'static>> = reader
            .rows
            .iter()
            .skip(reader.scroll)
            .map(|row| {
                if placeholder {
                    return Line::styled(row.text.clone(), Style::default().add_modifier(Modifier::DIM));
                }
                Line::from(styled_spans(
                    &row.text,
                    &row.marked(&highlights),
                    &row.marked(&hits),
                    Style::default(),
                    highlight_style,
                    match_style,
                ))
            })
            .collect();

        let offset = inner.width.saturating_sub(column) / 2;
        let column_area = Rect {
            x: inner.x + offset,
            y: inner.y,
            width: column.min(inner.width),
            height: inner.height,
        };
        let alignment = if placeholder {
            Alignment::Center
        } else {
            Alignment::Left
        };
        frame.render_widget(Paragraph::new(Text::from(lines)).alignment(alignment), column_area);

        if !query.trim().is_empty() && inner.height > 0 {
            let count = hits.len();
            let status = format!(" {count} match{} ", if count == 1 { "" } else { "es" });
            let width = status.chars().count() as u16;
            let status_area = Rect {
                x: inner.x + inner.width.saturating_sub(width),
                y: inner.y + inner.height - 1,
                width: width.min(inner.width),
                height: 1,
            };
            frame.render_widget(
                Paragraph::new(Span::styled(status, Style::default().add_modifier(Modifier::DIM))),
                status_area,
            );
        }
    }

    fn draw_side_panels(&self, area: Rect, frame: &mut ratatui::Frame) {
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(8)])
            .split(area);
        self.draw_annotations(sections[0], frame);
        self.draw_stats(sections[1], frame);
    }

    fn draw_annotations(&self, area: Rect, frame: &mut ratatui::Frame) {
        let state = self.store.state();
        let page = self.reader.as_ref().map(|r| r.session.page());
        let title = match page {
            Some(page) => format!("Annotations · p{page}"),
            None => "Annotations".to_string(),
        };
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let width = usize::from(block.inner(area).width.max(1));

        let mut lines: Vec<Line<'static>> = Vec::new();
        let notes = page
            .map(|page| annotations_on_page(state, page))
            .unwrap_or_default();
        if notes.is_empty() {
            lines.push(Line::styled(
                "(none, press a to add)",
                Style::default().add_modifier(Modifier::DIM),
            ));
        }
        for note in notes {
            lines.push(Line::styled(
                format_timestamp(note.timestamp, "%Y-%m-%d %H:%M"),
                Style::default()
                    .fg(parse_hex_color(&note.color).unwrap_or(Color::Blue))
                    .add_modifier(Modifier::BOLD),
            ));
            lines.extend(wrap_text(&note.text, width).into_iter().map(Line::raw));
            lines.push(Line::raw(""));
        }

        frame.render_widget(
            Paragraph::new(Text::from(lines)).block(block),
            area,
        );
    }

    /// Stats for the book on screen. A current book that failed to load at
    /// startup has none.
    fn current_stats(&self) -> Option<ReadingStats> {
        let reader = self.reader.as_ref()?;
        let state = self.store.state();
        if state.current_book.as_ref() != Some(reader.session.book()) {
            return None;
        }
        ReadingStats::for_current(state)
    }

    fn draw_stats(&self, area: Rect, frame: &mut ratatui::Frame) {
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Reading Stats",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let Some(stats) = self.current_stats() else {
            frame.render_widget(block, area);
            return;
        };

        let label = Style::default().add_modifier(Modifier::BOLD);
        let last_read_ms = stats.last_read_ms.unwrap_or_else(|| (self.clock)());
        let last_read = format_timestamp(last_read_ms, "%Y-%m-%d");
        let lines = vec![
            Line::from(vec![
                Span::styled("Progress   ", label),
                Span::raw(stats.percent_label()),
            ]),
            Line::from(vec![
                Span::styled("Time spent ", label),
                Span::raw(stats.time_spent.clone()),
            ]),
            Line::from(vec![
                Span::styled("Pages      ", label),
                Span::raw(stats.pages_label()),
            ]),
            Line::from(vec![Span::styled("Last read  ", label), Span::raw(last_read)]),
        ];
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn draw_goto_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let total = self
            .reader
            .as_ref()
            .map(|r| r.session.num_pages())
            .unwrap_or(0);
        let lines = vec![
            Line::from(vec![
                Span::styled("Page: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.goto_panel.input.clone()),
            ]),
            Line::raw(""),
            Line::raw("Enter jumps, Esc cancels, Ctrl+u clears."),
        ];
        draw_prompt(
            frame,
            centered_rect(48, 28, area),
            format!("Go to page (1..={total})"),
            lines,
            self.goto_panel.error.as_deref(),
        );
    }

    fn draw_open_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let lines = vec![
            Line::from(vec![
                Span::styled("Path: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.open_panel.input.clone()),
            ]),
            Line::raw(""),
            Line::raw("A single .pdf file. Enter opens, Esc cancels, Ctrl+u clears."),
        ];
        draw_prompt(
            frame,
            centered_rect(70, 30, area),
            "Open PDF".to_string(),
            lines,
            self.open_panel.error.as_deref(),
        );
    }

    fn draw_annotation_input(&self, area: Rect, frame: &mut ratatui::Frame) {
        let page = self
            .reader
            .as_ref()
            .map(|r| r.session.page())
            .unwrap_or(1);
        let lines = vec![
            Line::from(vec![
                Span::styled("Note: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.annotation_input.input.clone()),
            ]),
            Line::raw(""),
            Line::raw("Enter saves, Esc cancels."),
        ];
        draw_prompt(
            frame,
            centered_rect(60, 30, area),
            format!("Annotate page {page}"),
            lines,
            self.annotation_input.error.as_deref(),
        );
    }

    fn draw_recommendations_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(70, 70, area);
        frame.render_widget(Clear, popup_area);
        frame.render_widget(Block::default().style(self.base_style()), popup_area);

        let book_title = self
            .reader
            .as_ref()
            .map(|r| r.session.book().title())
            .unwrap_or_default();
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            format!("Similar to {book_title}"),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let inner = block.inner(popup_area);
        frame.render_widget(block, popup_area);
        let width = usize::from(inner.width.max(1));

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let dim = Style::default().add_modifier(Modifier::DIM);
        let mut lines: Vec<Line<'static>> = Vec::new();

        match self.recommendations.credential() {
            Credential::Missing => {
                lines.push(Line::raw("A Gemini API key is needed for recommendations."));
                lines.push(Line::from(vec![
                    Span::styled("k", bold),
                    Span::raw(" enter key  "),
                    Span::styled("Esc", bold),
                    Span::raw(" close"),
                ]));
            }
            Credential::Editing {
                input, remember, ..
            } => {
                lines.push(Line::from(vec![
                    Span::styled("API key: ", bold),
                    Span::raw("*".repeat(input.chars().count())),
                ]));
                let check = if *remember { "[x]" } else { "[ ]" };
                lines.push(Line::raw(format!("{check} remember key")));
                lines.push(Line::raw(""));
                lines.push(Line::from(vec![
                    Span::styled("Enter", bold),
                    Span::raw(" save  "),
                    Span::styled("Tab", bold),
                    Span::raw(" toggle remember  "),
                    Span::styled("Esc", bold),
                    Span::raw(" cancel"),
                ]));
            }
            Credential::Ready { .. } => match self.recommendations.request_state() {
                RequestState::Idle => {
                    lines.push(Line::from(vec![
                        Span::styled("Enter", bold),
                        Span::raw(" get similar books  "),
                        Span::styled("k", bold),
                        Span::raw(" change key  "),
                        Span::styled("Esc", bold),
                        Span::raw(" close"),
                    ]));
                }
                RequestState::InFlight { .. } => {
                    lines.push(Line::styled("Loading recommendations…", dim));
                }
                RequestState::Completed(list) => {
                    if list.is_empty() {
                        lines.push(Line::styled("No recommendations returned.", dim));
                    }
                    for rec in list {
                        lines.push(Line::styled(
                            rec.title.clone(),
                            Style::default()
                                .fg(self.accent_color())
                                .add_modifier(Modifier::BOLD),
                        ));
                        lines.extend(
                            wrap_text(&rec.description, width)
                                .into_iter()
                                .map(Line::raw),
                        );
                        lines.push(Line::raw(""));
                    }
                    lines.push(Line::from(vec![
                        Span::styled("Enter", bold),
                        Span::raw(" refresh  "),
                        Span::styled("Esc", bold),
                        Span::raw(" close"),
                    ]));
                }
            },
        }

        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Sidebar,
    Reader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SidebarRow {
    Heading(&'static str),
    Spacer,
    Empty(&'static str),
    Book(BookId),
    BookmarkBook(BookId),
    Bookmark { book: BookId, page: u32 },
}

impl SidebarRow {
    fn is_selectable(&self) -> bool {
        matches!(self, Self::Book(_) | Self::Bookmark { .. })
    }
}

#[derive(Debug, Default)]
struct SidebarPanel {
    selected: usize,
}

#[derive(Debug)]
struct ReaderPanel {
    session: ReaderSession,
    scroll: usize,
    rows: Vec<Row>,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct SearchBar {
    editing: bool,
}

#[derive(Debug, Default)]
struct GotoPanel {
    open: bool,
    input: String,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct OpenFilePanel {
    open: bool,
    input: String,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct AnnotationInput {
    open: bool,
    input: String,
    error: Option<String>,
}

#[derive(Debug, Clone)]
struct Notice {
    text: String,
    is_error: bool,
}

impl Notice {
    fn info(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    fn error(text: String) -> Self {
        Self {
            text,
            is_error: true,
        }
    }
}

/// First selectable row at or after `selected`, else the last one before it.
fn normalize_selection(rows: &[SidebarRow], selected: usize) -> usize {
    if let Some(idx) = (selected..rows.len()).find(|&i| rows[i].is_selectable()) {
        return idx;
    }
    (0..selected.min(rows.len()))
        .rev()
        .find(|&i| rows[i].is_selectable())
        .unwrap_or(0)
}

fn step_selectable(rows: &[SidebarRow], selected: usize, forward: bool) -> usize {
    let selected = normalize_selection(rows, selected);
    let next = if forward {
        (selected + 1..rows.len()).find(|&i| rows[i].is_selectable())
    } else {
        (0..selected).rev().find(|&i| rows[i].is_selectable())
    };
    next.unwrap_or(selected)
}

/// Accepts one existing file with a `.pdf` extension and returns its
/// canonical path.
fn resolve_pdf_path(input: &str) -> anyhow::Result<PathBuf> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("enter a path to a .pdf file");
    }
    let path = Path::new(input);
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        anyhow::bail!("not a .pdf file: {input}");
    }
    if !path.is_file() {
        anyhow::bail!("no such file: {input}");
    }
    path.canonicalize()
        .with_context(|| format!("resolve {input}"))
}

fn draw_prompt(
    frame: &mut ratatui::Frame,
    popup_area: Rect,
    title: String,
    mut lines: Vec<Line<'static>>,
    error: Option<&str>,
) {
    frame.render_widget(Clear, popup_area);
    let block = Block::default().borders(Borders::ALL).title(Span::styled(
        title,
        Style::default().add_modifier(Modifier::BOLD),
    ));
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    if let Some(err) = error {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
    }
    let paragraph = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Left);
    frame.render_widget(paragraph, inner);
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn format_timestamp(ms: i64, fmt: &str) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(at) => at.format(fmt).to_string(),
        None => "unknown".to_string(),
    }
}

fn parse_hex_color(hex: &str) -> Option<Color> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use folio_application::MemoryPersistence;
    use folio_core::ProgressUpdate;
    use ratatui::backend::TestBackend;

    use super::*;

    const OPENING: &str =
        "It was the best of times, it was the worst of times, it was the age of wisdom";

    fn book(id: &str) -> BookId {
        BookId::new(id)
    }

    struct FakePages {
        counts: HashMap<String, u32>,
    }

    impl PageSource for FakePages {
        fn page_count(&self, book: &BookId) -> anyhow::Result<u32> {
            self.counts
                .get(book.as_str())
                .copied()
                .ok_or_else(|| anyhow::anyhow!("no such book {book}"))
        }

        fn page_text(&self, _book: &BookId, _page_index: u32) -> anyhow::Result<PageText> {
            Ok(PageText::new(vec![OPENING.to_string()]))
        }
    }

    struct NoRecommender;

    impl Recommender for NoRecommender {
        fn recommend(
            &self,
            _title: &str,
            _api_key: &str,
        ) -> Result<Vec<Recommendation>, RecommendError> {
            Ok(Vec::new())
        }
    }

    fn ui_over(store: Store, clock: &Rc<Cell<i64>>) -> Ui {
        let pages = FakePages {
            counts: HashMap::from([("/books/a.pdf".to_string(), 10), ("/books/b.pdf".to_string(), 4)]),
        };
        let mut ui = Ui::new(store, Box::new(pages), Arc::new(NoRecommender), None);
        let now = Rc::clone(clock);
        ui.clock = Box::new(move || now.get());
        ui
    }

    fn memory_store() -> Store {
        Store::open(Box::new(MemoryPersistence::new()))
    }

    fn press(ui: &mut Ui, code: KeyCode) {
        ui.handle_main_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn time_spent(ui: &Ui, id: &str) -> Option<u64> {
        ui.store.state().progress_for(&book(id)).and_then(|p| p.time_spent)
    }

    #[test]
    fn switching_books_checkpoints_the_previous_one() {
        let clock = Rc::new(Cell::new(1_000));
        let mut ui = ui_over(memory_store(), &clock);
        assert!(ui.open_book(book("/books/a.pdf")));

        clock.set(61_000);
        assert!(ui.open_book(book("/books/b.pdf")));

        let a = ui.store.state().progress_for(&book("/books/a.pdf")).cloned();
        let a = a.unwrap_or_default();
        assert_eq!(a.time_spent, Some(60));
        assert_eq!(a.last_read, Some(61_000));
        assert_eq!(time_spent(&ui, "/books/b.pdf"), None);
        assert_eq!(ui.store.state().current_book, Some(book("/books/b.pdf")));
    }

    #[test]
    fn failed_switch_keeps_reading_the_open_book() {
        let clock = Rc::new(Cell::new(0));
        let mut ui = ui_over(memory_store(), &clock);
        assert!(ui.open_book(book("/books/a.pdf")));
        clock.set(20_000);
        assert!(!ui.open_book(book("/books/missing.pdf")));
        assert_eq!(time_spent(&ui, "/books/a.pdf"), None);
        assert_eq!(ui.store.state().current_book, Some(book("/books/a.pdf")));
    }

    #[test]
    fn closing_turning_and_quitting_record_time() {
        let clock = Rc::new(Cell::new(0));
        let mut ui = ui_over(memory_store(), &clock);
        assert!(ui.open_book(book("/books/a.pdf")));

        clock.set(30_000);
        press(&mut ui, KeyCode::Esc);
        assert!(ui.reader.is_none());
        assert_eq!(time_spent(&ui, "/books/a.pdf"), Some(30));

        clock.set(40_000);
        assert!(ui.open_book(book("/books/b.pdf")));
        clock.set(50_000);
        press(&mut ui, KeyCode::Right);
        let b = ui.store.state().progress_for(&book("/books/b.pdf")).cloned();
        assert_eq!(b.as_ref().and_then(|p| p.last_page), Some(2));
        assert_eq!(time_spent(&ui, "/books/b.pdf"), Some(10));

        clock.set(65_000);
        ui.shutdown();
        let b = ui.store.state().progress_for(&book("/books/b.pdf")).cloned();
        assert_eq!(b.as_ref().and_then(|p| p.time_spent), Some(25));
        assert_eq!(b.as_ref().and_then(|p| p.last_read), Some(65_000));
    }

    #[test]
    fn stats_hidden_when_startup_book_fails_to_load() {
        let mut store = memory_store();
        let missing = book("/books/missing.pdf");
        store.open_book(missing.clone());
        store.update_reading_progress(missing, ProgressUpdate::default().total_pages(10).last_page(4));

        let clock = Rc::new(Cell::new(0));
        let mut ui = ui_over(store, &clock);
        assert!(ui.reader.is_none());
        assert!(ReadingStats::for_current(ui.store.state()).is_some());
        assert!(ui.current_stats().is_none());

        assert!(ui.open_book(book("/books/a.pdf")));
        assert_eq!(ui.current_stats().map(|s| s.last_page), Some(Some(1)));
    }

    #[test]
    fn api_key_input_ignores_control_chords() {
        let clock = Rc::new(Cell::new(0));
        let mut ui = ui_over(memory_store(), &clock);
        ui.recommendations.begin_credential_input();
        let ctrl = |ch| KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL);
        let plain = |ch| KeyEvent::new(KeyCode::Char(ch), KeyModifiers::NONE);

        for key in [plain('a'), plain('b'), ctrl('c')] {
            assert!(!ui.handle_recommendations_key(key));
        }
        assert!(matches!(ui.recommendations.credential(), Credential::Editing { input, .. } if input == "ab"));

        ui.handle_recommendations_key(ctrl('u'));
        ui.handle_recommendations_key(plain('k'));
        assert!(matches!(ui.recommendations.credential(), Credential::Editing { input, .. } if input == "k"));
    }

    #[test]
    fn highlight_still_renders_after_zoom() -> anyhow::Result<()> {
        let clock = Rc::new(Cell::new(0));
        let mut ui = ui_over(memory_store(), &clock);
        assert!(ui.open_book(book("/books/a.pdf")));
        let mut terminal = Terminal::new(TestBackend::new(120, 40))?;
        terminal.draw(|frame| ui.draw(frame.area(), frame))?;

        press(&mut ui, KeyCode::Char('v'));
        let highlights = ui.store.state().highlights_for(&book("/books/a.pdf")).to_vec();
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].anchor().map(|(p, r)| (p, r.start)), Some((0, 0)));

        press(&mut ui, KeyCode::Char('+'));
        terminal.draw(|frame| ui.draw(frame.area(), frame))?;
        let top_row = ui.reader.as_ref().and_then(|r| r.rows.first()).map(|r| r.text.clone());
        assert_ne!(top_row.as_deref(), Some(highlights[0].content.as_str()));

        let painted: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .filter(|cell| cell.bg == Color::Rgb(250, 204, 21))
            .map(|cell| cell.symbol())
            .collect();
        assert_eq!(painted, highlights[0].content);
        Ok(())
    }

    #[test]
    fn selection_skips_headings() {
        let rows = vec![
            SidebarRow::Heading("Recent Books"),
            SidebarRow::Book(book("a.pdf")),
            SidebarRow::Spacer,
            SidebarRow::Heading("Bookmarks"),
            SidebarRow::BookmarkBook(book("a.pdf")),
            SidebarRow::Bookmark {
                book: book("a.pdf"),
                page: 3,
            },
        ];
        assert_eq!(normalize_selection(&rows, 0), 1);
        assert_eq!(step_selectable(&rows, 1, true), 5);
        assert_eq!(step_selectable(&rows, 5, true), 5);
        assert_eq!(step_selectable(&rows, 5, false), 1);
        assert_eq!(normalize_selection(&rows, 42), 5);
    }

    #[test]
    fn selection_without_selectable_rows_is_zero() {
        let rows = vec![SidebarRow::Heading("Recent Books"), SidebarRow::Empty("none")];
        assert_eq!(normalize_selection(&rows, 1), 0);
        assert_eq!(step_selectable(&rows, 0, true), 0);
    }

    #[test]
    fn open_prompt_rejects_non_pdf_and_missing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "hi")?;

        assert!(resolve_pdf_path("   ").is_err());
        assert!(resolve_pdf_path(&notes.to_string_lossy()).is_err());
        let missing = dir.path().join("missing.pdf");
        assert!(resolve_pdf_path(&missing.to_string_lossy()).is_err());
        Ok(())
    }

    #[test]
    fn open_prompt_canonicalizes_uppercase_extension() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let pdf = dir.path().join("Moby.PDF");
        std::fs::write(&pdf, b"%PDF-1.4")?;

        let input = format!("  {}  ", pdf.display());
        let resolved = resolve_pdf_path(&input)?;
        assert_eq!(resolved, pdf.canonicalize()?);
        Ok(())
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("#3B82F6"), Some(Color::Rgb(0x3B, 0x82, 0xF6)));
        assert_eq!(parse_hex_color("3B82F6"), None);
        assert_eq!(parse_hex_color("#3B8"), None);
    }

    #[test]
    fn timestamps_format_in_local_time() {
        let ms = 1_700_000_000_000;
        let expected = Local
            .timestamp_millis_opt(ms)
            .single()
            .map(|at| at.format("%Y-%m-%d").to_string());
        assert_eq!(Some(format_timestamp(ms, "%Y-%m-%d")), expected);
    }
}
