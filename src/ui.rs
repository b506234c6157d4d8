use std::io::{self, Stdout};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use unicode_width::UnicodeWidthStr;

use crate::api::{CategoryError, CategorySet, FetchError, ImageDescriptor};
use crate::data::{CategoryService, ImageService};
use crate::media::Picture;
use crate::preview;
use crate::viewer::{Category, ImageResult, Selection, Viewer};

const COLOR_BG_RGB: (u8, u8, u8) = (30, 30, 46);
const COLOR_BG: Color = Color::Rgb(COLOR_BG_RGB.0, COLOR_BG_RGB.1, COLOR_BG_RGB.2);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const PICKER_WIDTH: u16 = 30;
const TICK_RATE: Duration = Duration::from_millis(120);
const FADE_TICK_RATE: Duration = Duration::from_millis(30);

#[derive(Clone)]
pub struct Options {
    pub status_message: String,
    pub category_service: Arc<dyn CategoryService>,
    pub image_service: Arc<dyn ImageService>,
    pub selection: Selection,
    pub fade: Duration,
    pub auto_fetch: bool,
}

struct PendingCategories {
    request_id: u64,
}

enum AsyncResponse {
    Categories {
        request_id: u64,
        result: std::result::Result<CategorySet, CategoryError>,
    },
    Image {
        seq: u64,
        result: std::result::Result<ImageDescriptor, FetchError>,
    },
    Picture {
        seq: u64,
        result: std::result::Result<Picture, FetchError>,
    },
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= TICK_RATE {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Model {
    viewer: Viewer,
    status_message: String,
    category_service: Arc<dyn CategoryService>,
    image_service: Arc<dyn ImageService>,
    fade: Duration,
    auto_fetch: bool,
    cursor: usize,
    pending_categories: Option<PendingCategories>,
    next_request_id: u64,
    latest_seq: Arc<AtomicU64>,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            viewer: Viewer::new(options.selection),
            status_message: options.status_message,
            category_service: options.category_service,
            image_service: options.image_service,
            fade: options.fade,
            auto_fetch: options.auto_fetch,
            cursor: 0,
            pending_categories: None,
            next_request_id: 1,
            latest_seq: Arc::new(AtomicU64::new(0)),
            response_tx,
            response_rx,
            spinner: Spinner::new(),
            needs_redraw: true,
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        self.reload_categories();
        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let tick_rate = if self.viewer.is_fading(self.fade) {
                FADE_TICK_RATE
            } else {
                TICK_RATE
            };
            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {err:#}");
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_busy() && self.spinner.advance() {
                    self.mark_dirty();
                } else if !self.is_busy() {
                    self.spinner.reset();
                }
                if self.viewer.is_fading(self.fade) {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.viewer.is_loading() || self.pending_categories.is_some()
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(-1),
            KeyCode::Char('g') | KeyCode::Home => self.cursor = 0,
            KeyCode::Char('G') | KeyCode::End => {
                self.cursor = self.viewer.visible_categories().len().saturating_sub(1);
            }
            KeyCode::Char('l') | KeyCode::Right => self.step_category(1),
            KeyCode::Char('h') | KeyCode::Left => self.step_category(-1),
            KeyCode::Enter => self.commit_cursor(),
            KeyCode::Tab | KeyCode::Char('c') => self.toggle_classification(),
            KeyCode::Char('a') => {
                self.viewer.select_category(Category::All);
                self.sync_cursor();
                self.fetch_image();
            }
            KeyCode::Char('n') | KeyCode::Char(' ') => self.fetch_image(),
            KeyCode::Char('r') => self.reload_categories(),
            KeyCode::Char('o') => self.open_current()?,
            KeyCode::Char('y') => self.copy_current()?,
            _ => return Ok(false),
        }
        self.mark_dirty();
        Ok(false)
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.viewer.visible_categories().len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, len as isize - 1) as usize;
    }

    fn commit_cursor(&mut self) {
        let Some(category) = self.viewer.visible_categories().get(self.cursor).cloned() else {
            return;
        };
        self.viewer.select_category(category);
        self.fetch_image();
    }

    fn step_category(&mut self, delta: isize) {
        self.viewer.cycle_category(delta);
        self.sync_cursor();
        self.fetch_image();
    }

    fn toggle_classification(&mut self) {
        let next = self.viewer.selection().classification.toggled();
        self.viewer.select_classification(next);
        let listed = match &self.viewer.selection().category {
            Category::All => true,
            Category::Named(name) => self.viewer.categories().list(next).contains(name),
        };
        if !listed {
            self.viewer.select_category(Category::All);
        }
        self.sync_cursor();
        self.fetch_image();
    }

    fn sync_cursor(&mut self) {
        let selected = &self.viewer.selection().category;
        self.cursor = self
            .viewer
            .visible_categories()
            .iter()
            .position(|candidate| candidate == selected)
            .unwrap_or(0);
    }

    fn reload_categories(&mut self) {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.pending_categories = Some(PendingCategories { request_id });
        self.status_message = "Loading categories…".to_string();
        self.spinner.reset();

        let tx = self.response_tx.clone();
        let service = self.category_service.clone();
        thread::spawn(move || {
            let result = service.load_categories();
            let _ = tx.send(AsyncResponse::Categories { request_id, result });
        });
    }

    fn fetch_image(&mut self) {
        let ticket = match self.viewer.begin_fetch(&mut rand::thread_rng()) {
            Ok(ticket) => ticket,
            Err(err) => {
                self.status_message = err.to_string();
                return;
            }
        };
        self.latest_seq.store(ticket.seq, Ordering::SeqCst);
        self.status_message = format!(
            "Fetching {} / {}…",
            ticket.classification.display_name(),
            ticket.category
        );
        self.spinner.reset();

        let tx = self.response_tx.clone();
        let service = self.image_service.clone();
        let latest_seq = self.latest_seq.clone();
        thread::spawn(move || {
            let seq = ticket.seq;
            let result = service.random_image(ticket.classification, &ticket.category);
            let located = result.as_ref().ok().cloned();
            let _ = tx.send(AsyncResponse::Image { seq, result });

            let Some(image) = located else {
                return;
            };
            // A newer fetch owns the screen; its own worker handles the picture.
            if latest_seq.load(Ordering::SeqCst) != seq {
                return;
            }
            let result = service.load_picture(&image);
            let _ = tx.send(AsyncResponse::Picture { seq, result });
        });
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Categories { request_id, result } => {
                let Some(pending) = &self.pending_categories else {
                    return;
                };
                if pending.request_id != request_id {
                    return;
                }
                self.pending_categories = None;

                match self.viewer.apply_categories(result) {
                    Some(notice) => self.status_message = notice,
                    None => {
                        let set = self.viewer.categories();
                        self.status_message = format!(
                            "{} categories available ({} SFW, {} NSFW).",
                            set.total(),
                            set.sfw.len(),
                            set.nsfw.len()
                        );
                    }
                }
                self.sync_cursor();
                if self.auto_fetch && !self.viewer.categories().is_empty() {
                    self.fetch_image();
                }
            }
            AsyncResponse::Image { seq, result } => {
                if !self.viewer.complete_fetch(seq, result) {
                    return;
                }
                if let ImageResult::Failed(err) = self.viewer.result() {
                    self.status_message = format!("Failed to fetch image: {err}");
                } else {
                    self.status_message = "Downloading image…".to_string();
                }
            }
            AsyncResponse::Picture { seq, result } => {
                if !self.viewer.complete_decode(seq, result) {
                    return;
                }
                self.status_message = match self.viewer.result() {
                    ImageResult::Failed(err) => err.to_string(),
                    ImageResult::Ready(image) => format!(
                        "{} · press n for another, o to open, y to copy the link.",
                        image_label(image)
                    ),
                    ImageResult::Pending => String::new(),
                };
            }
        }
        self.mark_dirty();
    }

    fn current_url(&self) -> Option<String> {
        self.viewer.result().url().map(str::to_string)
    }

    fn open_current(&mut self) -> Result<()> {
        let Some(url) = self.current_url() else {
            self.status_message = "No image to open yet.".to_string();
            return Ok(());
        };
        webbrowser::open(&url).with_context(|| format!("open {url} in browser"))?;
        self.status_message = format!("Opened {url} in your browser.");
        Ok(())
    }

    fn copy_current(&mut self) -> Result<()> {
        let Some(url) = self.current_url() else {
            self.status_message = "No image link to copy yet.".to_string();
            return Ok(());
        };
        let mut clipboard = arboard::Clipboard::new().context("access clipboard")?;
        clipboard
            .set_text(url.clone())
            .context("copy link to clipboard")?;
        self.status_message = format!("Copied {url}");
        Ok(())
    }

    fn draw(&self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_text = if self.is_busy() {
            format!("{} {}", self.spinner.frame(), self.status_message)
                .trim()
                .to_string()
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(PICKER_WIDTH), Constraint::Min(0)])
            .split(layout[1]);
        self.draw_picker(frame, main[0]);
        self.draw_image(frame, main[1]);

        let footer = Paragraph::new(footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[2]);
    }

    fn draw_picker(&self, frame: &mut Frame<'_>, area: Rect) {
        let selection = self.viewer.selection();
        let title = format!(" Category · {} ", selection.classification.display_name());
        let block = Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(
                title,
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
            .style(Style::default().bg(COLOR_PANEL_BG));

        let label_width = area.width.saturating_sub(6) as usize;
        let items: Vec<ListItem> = self
            .viewer
            .visible_categories()
            .into_iter()
            .map(|category| {
                let marker = if category == selection.category {
                    "● "
                } else {
                    "  "
                };
                let label = truncate_to_width(&category.label(), label_width);
                ListItem::new(Line::from(vec![
                    Span::styled(marker, Style::default().fg(COLOR_ACCENT)),
                    Span::styled(label, Style::default().fg(COLOR_TEXT_PRIMARY)),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(
                Style::default()
                    .bg(COLOR_PANEL_SELECTED_BG)
                    .add_modifier(Modifier::BOLD),
            );
        let mut state = ListState::default();
        state.select(Some(self.cursor));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_image(&self, frame: &mut Frame<'_>, area: Rect) {
        let title = match self.viewer.result() {
            ImageResult::Ready(image) => format!(" {} ", image_label(image)),
            _ => " Image ".to_string(),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(
                title,
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))
            .border_style(Style::default().fg(COLOR_BORDER_IDLE))
            .style(Style::default().bg(COLOR_BG));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if let Some(picture) = self.viewer.picture() {
            let opacity = self.viewer.opacity(self.fade);
            let text = preview::render(picture, inner.width, inner.height, opacity, COLOR_BG_RGB);
            frame.render_widget(Paragraph::new(text), inner);
            return;
        }

        let (message, color) = match self.viewer.result() {
            ImageResult::Failed(err) => (err.to_string(), COLOR_ERROR),
            _ => ("Loading...".to_string(), COLOR_TEXT_SECONDARY),
        };
        frame.render_widget(
            Paragraph::new(centered_message(&message, inner.height))
                .style(Style::default().fg(color))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            inner,
        );
    }
}

fn footer_text() -> &'static str {
    "j/k move · Enter select · h/l prev/next category · Tab sfw/nsfw · a all · n next · o open · y copy · r reload · q quit"
}

fn image_label(image: &ImageDescriptor) -> String {
    if let Some(file) = image.file.as_deref() {
        return file.to_string();
    }
    image
        .url
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(image.url.as_str())
        .to_string()
}

fn centered_message(message: &str, height: u16) -> Text<'static> {
    let pad = (height as usize).saturating_sub(1) / 2;
    let mut lines: Vec<Line<'static>> = (0..pad).map(|_| Line::default()).collect();
    lines.push(Line::from(message.to_string()));
    Text::from(lines)
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}
