use std::collections::BTreeMap;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEvent, MouseEventKind};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use parking_lot::Mutex;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use tracing::{debug, info, warn};
use unicode_width::UnicodeWidthStr;
use url::Url;

use crate::data::{self, FeedSource};
use crate::media::{self, MediaItem, MediaPayload};
use crate::player;
use crate::presenter::{ErrorReporter, FeedNotice, Presenter};
use crate::renderer::{FeedRenderer, NavigationInput, RendererConfig};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ICON_UPVOTES: &str = "▲";
const ICON_COMMENTS: &str = "✉";

/// Status bar plus footer.
const CHROME_ROWS: u16 = 2;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const WHEEL_ROWS: f64 = 3.0;
const SCROLL_SPEED: f64 = 0.35;
const BANNER_TTL: Duration = Duration::from_secs(15);
const BANNER_TTL_WITH_DETAIL: Duration = Duration::from_secs(20);
const CARD_INDENT: &str = "  ";
const MAX_TITLE_LINES: usize = 4;

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
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
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

/// Eases the drawn position toward the requested scroll offset.
#[derive(Debug, Clone)]
struct SmoothScroll {
    position: f64,
    target: f64,
    speed: f64,
}

impl SmoothScroll {
    fn new(speed: f64) -> Self {
        Self {
            position: 0.0,
            target: 0.0,
            speed: speed.clamp(0.05, 0.95),
        }
    }

    fn scroll_to(&mut self, target: f64, animate: bool) {
        self.target = target;
        if !animate {
            self.position = target;
        }
    }

    /// Advances one frame. Returns whether the position moved.
    fn tick(&mut self) -> bool {
        if !self.is_animating() {
            return false;
        }
        self.position += (self.target - self.position) * self.speed;
        if (self.target - self.position).abs() < 0.4 {
            self.position = self.target;
        }
        true
    }

    fn is_animating(&self) -> bool {
        self.position != self.target
    }
}

/// Token for one materialized card.
#[derive(Debug)]
pub struct CardHandle {
    index: usize,
}

struct Card {
    item: MediaItem,
    slide: usize,
    playing: bool,
}

/// Terminal presentation of the feed: one card per viewport height.
pub struct TuiPresenter {
    cards: BTreeMap<usize, Card>,
    scroll: SmoothScroll,
    smooth: bool,
    loading: bool,
    notice: Option<String>,
}

impl TuiPresenter {
    pub fn new(smooth: bool) -> Self {
        Self {
            cards: BTreeMap::new(),
            scroll: SmoothScroll::new(SCROLL_SPEED),
            smooth,
            loading: false,
            notice: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_animating(&self) -> bool {
        self.scroll.is_animating()
    }

    /// Offset currently drawn.
    pub fn scroll_position(&self) -> f64 {
        self.scroll.position
    }

    fn tick_animation(&mut self) -> bool {
        self.scroll.tick()
    }

    /// Free scroll from the mouse wheel; the renderer learns about it through
    /// a `ScrollTo` input.
    fn scroll_by(&mut self, delta: f64, max: f64) -> f64 {
        let target = (self.scroll.target + delta).clamp(0.0, max.max(0.0));
        self.scroll.scroll_to(target, false);
        target
    }

    /// Moves a gallery card to another slide. Returns `(slide, total)`.
    pub fn change_slide(&mut self, index: usize, delta: i64) -> Option<(usize, usize)> {
        let card = self.cards.get_mut(&index)?;
        let MediaPayload::Gallery { images } = &card.item.payload else {
            return None;
        };
        let total = images.len();
        if total == 0 {
            return None;
        }
        let next = (card.slide as i64 + delta).rem_euclid(total as i64) as usize;
        card.slide = next;
        Some((next, total))
    }

    pub fn is_playing(&self, index: usize) -> bool {
        self.cards.get(&index).map(|card| card.playing).unwrap_or(false)
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Rows for the viewport at the current animated position.
    fn visible_lines(
        &self,
        item_count: usize,
        extent: usize,
        width: u16,
        active: Option<usize>,
        now: DateTime<Utc>,
    ) -> Vec<Line<'static>> {
        if extent == 0 {
            return Vec::new();
        }
        let position = self.scroll.position.max(0.0);
        let top = (position / extent as f64).floor() as usize;
        let within = ((position - (top * extent) as f64).round() as usize).min(extent);

        let mut lines = Vec::with_capacity(extent);
        let first = self.lines_for(top, item_count, extent, width, active, now);
        lines.extend(first.into_iter().skip(within));
        if within > 0 {
            let second = self.lines_for(top + 1, item_count, extent, width, active, now);
            lines.extend(second.into_iter().take(within));
        }
        lines.truncate(extent);
        lines
    }

    fn lines_for(
        &self,
        index: usize,
        item_count: usize,
        extent: usize,
        width: u16,
        active: Option<usize>,
        now: DateTime<Utc>,
    ) -> Vec<Line<'static>> {
        if index >= item_count {
            return vec![Line::default(); extent];
        }
        match self.cards.get(&index) {
            Some(card) => card_lines(card, active == Some(index), width, extent, now),
            None => placeholder_lines(extent),
        }
    }
}

impl Presenter for TuiPresenter {
    type Handle = CardHandle;

    fn materialize(&mut self, index: usize, item: &MediaItem) -> CardHandle {
        self.cards.insert(
            index,
            Card {
                item: item.clone(),
                slide: 0,
                playing: false,
            },
        );
        CardHandle { index }
    }

    fn release(&mut self, _index: usize, handle: CardHandle) {
        self.cards.remove(&handle.index);
    }

    fn set_playing(&mut self, _index: usize, handle: &mut CardHandle, playing: bool) {
        if let Some(card) = self.cards.get_mut(&handle.index) {
            card.playing = playing;
        }
    }

    fn scroll_to(&mut self, offset: f64, smooth: bool) {
        self.scroll.scroll_to(offset, smooth && self.smooth);
    }

    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        if loading {
            self.notice = None;
        }
    }

    fn notify(&mut self, notice: FeedNotice) {
        self.notice = Some(match notice {
            FeedNotice::NoMediaInPage {
                feed,
                raw_count,
                skipped,
            } => format!("No media in this page of r/{feed} ({skipped} of {raw_count} posts skipped)"),
            FeedNotice::EndOfFeed { feed, total } => {
                format!("End of r/{feed} ({total} posts)")
            }
        });
    }
}

fn card_lines(
    card: &Card,
    active: bool,
    width: u16,
    height: usize,
    now: DateTime<Utc>,
) -> Vec<Line<'static>> {
    let item = &card.item;
    let inner_width = (width as usize).saturating_sub(CARD_INDENT.len() * 2).max(10);
    let (primary, secondary) = if active {
        (COLOR_TEXT_PRIMARY, COLOR_TEXT_SECONDARY)
    } else {
        (COLOR_TEXT_SECONDARY, COLOR_BORDER_IDLE)
    };

    let mut lines: Vec<Line<'static>> = vec![Line::default()];

    let mut header = vec![
        Span::raw(CARD_INDENT),
        Span::styled(
            format!("r/{}", item.community),
            Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" · u/{}", item.author), Style::default().fg(secondary)),
    ];
    if let Some(created) = item.created_at {
        header.push(Span::styled(
            format!(" · {}", relative_age(created, now)),
            Style::default().fg(secondary),
        ));
    }
    if item.nsfw {
        header.push(Span::styled(
            " NSFW",
            Style::default().fg(COLOR_ERROR).add_modifier(Modifier::BOLD),
        ));
    }
    lines.push(Line::from(header));
    lines.push(Line::default());

    let title = if item.title.trim().is_empty() {
        "Untitled"
    } else {
        item.title.trim()
    };
    let wrapped = wrap(title, WrapOptions::new(inner_width));
    let title_style = Style::default().fg(primary).add_modifier(Modifier::BOLD);
    for (n, segment) in wrapped.iter().enumerate() {
        if n == MAX_TITLE_LINES {
            break;
        }
        let mut text = segment.to_string();
        if n + 1 == MAX_TITLE_LINES && wrapped.len() > MAX_TITLE_LINES {
            text = truncate_width(&text, inner_width.saturating_sub(1));
            text.push('…');
        }
        lines.push(Line::from(vec![
            Span::raw(CARD_INDENT),
            Span::styled(text, title_style),
        ]));
    }
    lines.push(Line::default());

    let (badge, badge_color) = media_badge(card);
    lines.push(Line::from(vec![
        Span::raw(CARD_INDENT),
        Span::styled(
            badge,
            Style::default().fg(badge_color).add_modifier(Modifier::BOLD),
        ),
    ]));
    if let Some(url) = displayed_url(card) {
        lines.push(Line::from(vec![
            Span::raw(CARD_INDENT),
            Span::styled(
                truncate_width(url, inner_width),
                Style::default().fg(secondary).add_modifier(Modifier::UNDERLINED),
            ),
        ]));
    }
    lines.push(Line::default());
    lines.push(Line::from(vec![
        Span::raw(CARD_INDENT),
        Span::styled(
            format!("{ICON_UPVOTES} {}", media::format_count(item.score)),
            Style::default().fg(primary),
        ),
        Span::styled(
            format!("   {ICON_COMMENTS} {}", media::format_count(item.comment_count)),
            Style::default().fg(secondary),
        ),
    ]));

    fit_card(lines, width, height)
}

fn placeholder_lines(height: usize) -> Vec<Line<'static>> {
    let mut lines = vec![Line::default()];
    lines.push(Line::from(vec![
        Span::raw(CARD_INDENT),
        Span::styled("…", Style::default().fg(COLOR_TEXT_SECONDARY)),
    ]));
    fit_card(lines, 0, height)
}

/// Pads or cuts `lines` to exactly `height`, closing the card with a rule.
fn fit_card(mut lines: Vec<Line<'static>>, width: u16, height: usize) -> Vec<Line<'static>> {
    if height == 0 {
        return Vec::new();
    }
    let body = height - 1;
    lines.truncate(body);
    lines.resize(body, Line::default());
    lines.push(Line::styled(
        "─".repeat(width as usize),
        Style::default().fg(COLOR_BORDER_IDLE),
    ));
    lines
}

fn media_badge(card: &Card) -> (String, Color) {
    let state = if card.playing { "playing" } else { "paused" };
    let state_color = if card.playing {
        COLOR_SUCCESS
    } else {
        COLOR_TEXT_SECONDARY
    };
    match &card.item.payload {
        MediaPayload::StaticImage { .. } => ("▣ IMAGE".to_string(), COLOR_ACCENT),
        MediaPayload::AnimatedImage { .. } => (format!("◎ GIF · {state}"), state_color),
        MediaPayload::Video { .. } => {
            let icon = if card.playing { "▶" } else { "❚❚" };
            (format!("{icon} VIDEO · {state}"), state_color)
        }
        MediaPayload::Gallery { images } => (
            format!("▦ GALLERY · {}/{}", card.slide + 1, images.len()),
            COLOR_ACCENT,
        ),
        MediaPayload::Embed {
            iframe_src,
            autoplay,
            ..
        } => {
            let host = Url::parse(iframe_src)
                .ok()
                .and_then(|url| url.host_str().map(|h| h.trim_start_matches("www.").to_string()))
                .unwrap_or_else(|| "external".to_string());
            if *autoplay {
                (format!("⧉ EMBED · {host} · {state}"), state_color)
            } else {
                (format!("⧉ EMBED · {host}"), COLOR_ACCENT)
            }
        }
    }
}

fn displayed_url(card: &Card) -> Option<&str> {
    match &card.item.payload {
        MediaPayload::Gallery { images } => images
            .get(card.slide)
            .or_else(|| images.first())
            .map(|image| image.url.as_str()),
        payload => payload.primary_url(),
    }
}

fn truncate_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

fn relative_age(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - created).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m", secs / 60),
        3_600..=86_399 => format!("{}h", secs / 3_600),
        86_400..=2_591_999 => format!("{}d", secs / 86_400),
        _ => format!("{}mo", secs / 2_592_000),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub message: String,
    pub detail: Option<String>,
    raised_at: Instant,
}

impl Banner {
    fn ttl(&self) -> Duration {
        if self.detail.is_some() {
            BANNER_TTL_WITH_DETAIL
        } else {
            BANNER_TTL
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.raised_at) >= self.ttl()
    }

    fn clipboard_text(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}\n{}", self.message, detail),
            None => self.message.clone(),
        }
    }
}

/// Keeps the latest reported error for the footer. Newer reports replace older ones.
#[derive(Clone, Default)]
pub struct BannerReporter {
    inner: Arc<Mutex<Option<Banner>>>,
}

impl BannerReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live banner, clearing it once it has expired.
    pub fn current(&self, now: Instant) -> Option<Banner> {
        let mut guard = self.inner.lock();
        if guard.as_ref().is_some_and(|banner| banner.expired(now)) {
            *guard = None;
        }
        guard.clone()
    }

    pub fn dismiss(&self) -> bool {
        self.inner.lock().take().is_some()
    }
}

impl ErrorReporter for BannerReporter {
    fn report(&self, message: &str, detail: Option<&str>) {
        let detail = detail
            .map(str::trim)
            .filter(|detail| !detail.is_empty())
            .map(str::to_string);
        *self.inner.lock() = Some(Banner {
            message: message.to_string(),
            detail,
            raised_at: Instant::now(),
        });
    }
}

pub struct Options {
    pub renderer: RendererConfig,
    pub source: Arc<dyn FeedSource>,
    pub initial_feed: String,
    pub default_feed: String,
    pub smooth_scroll: bool,
    pub video_command: Vec<String>,
    /// Shown in the status bar, e.g. `reddit.com` or `offline sample`.
    pub source_label: String,
    pub viewport_rows: u16,
}

pub struct Model {
    renderer: FeedRenderer<TuiPresenter>,
    banner: BannerReporter,
    spinner: Spinner,
    status_message: String,
    prompt: Option<String>,
    default_feed: String,
    video_command: Vec<String>,
    source_label: String,
    needs_redraw: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let banner = BannerReporter::new();
        let extent = f64::from(options.viewport_rows.max(1));
        let renderer = FeedRenderer::new(
            options.renderer,
            options.source,
            Arc::new(banner.clone()),
            TuiPresenter::new(options.smooth_scroll),
            extent,
        );
        let mut model = Self {
            renderer,
            banner,
            spinner: Spinner::new(),
            status_message: String::new(),
            prompt: None,
            default_feed: options.default_feed,
            video_command: options.video_command,
            source_label: options.source_label,
            needs_redraw: true,
        };
        model.open_feed(&options.initial_feed);
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);
        let size = terminal.size()?;
        self.sync_viewport(size.height);

        loop {
            if self.renderer.tick(Instant::now()) {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let mut timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or(FRAME_INTERVAL);
            if self.renderer.presenter().is_animating() {
                timeout = timeout.min(FRAME_INTERVAL);
            }
            if let Some(deadline) = self.renderer.next_deadline() {
                timeout = timeout.min(deadline.saturating_duration_since(Instant::now()));
            }

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                warn!(error = %err, "key handler failed");
                                self.status_message = format!("Error: {}", err);
                            }
                        }
                        self.mark_dirty();
                    }
                    Event::Mouse(mouse) => {
                        self.handle_mouse(mouse);
                    }
                    Event::Resize(_, height) => {
                        self.sync_viewport(height);
                        self.mark_dirty();
                    }
                    _ => {}
                }
            }

            if self.renderer.presenter_mut().tick_animation() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.renderer.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
                // banners expire on their own
                self.mark_dirty();
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn sync_viewport(&mut self, terminal_rows: u16) {
        let rows = terminal_rows.saturating_sub(CHROME_ROWS).max(1);
        self.renderer.resize(f64::from(rows));
    }

    fn open_feed(&mut self, input: &str) {
        let feed = data::normalize_feed(input, &self.default_feed);
        info!(feed = %feed, "opening feed");
        self.status_message.clear();
        self.renderer.switch_feed(&feed);
        self.mark_dirty();
    }

    fn navigate(&mut self, input: NavigationInput) {
        self.renderer.on_navigation_input(input, Instant::now());
        self.status_message.clear();
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if self.prompt.is_some() {
            self.handle_prompt_key(code);
            return Ok(false);
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down | KeyCode::Char(' ') | KeyCode::PageDown => {
                self.navigate(NavigationInput::Step(1));
            }
            KeyCode::Char('k') | KeyCode::Up | KeyCode::PageUp => {
                self.navigate(NavigationInput::Step(-1));
            }
            KeyCode::Char('g') | KeyCode::Home => self.navigate(NavigationInput::Jump(0)),
            KeyCode::Char('G') | KeyCode::End => {
                if let Some(last) = self.renderer.items().len().checked_sub(1) {
                    self.navigate(NavigationInput::Jump(last));
                }
            }
            KeyCode::Char('h') | KeyCode::Left => self.change_slide(-1),
            KeyCode::Char('l') | KeyCode::Right => self.change_slide(1),
            KeyCode::Char('o') => self.open_permalink()?,
            KeyCode::Char('p') | KeyCode::Enter => self.play_active()?,
            KeyCode::Char('r') => {
                let feed = self.renderer.feed().to_string();
                self.open_feed(&feed);
            }
            KeyCode::Char('y') => self.copy_banner()?,
            KeyCode::Char('x') => {
                if self.banner.dismiss() {
                    self.status_message = "Error dismissed.".to_string();
                }
            }
            KeyCode::Char('/') => {
                self.prompt = Some(String::new());
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        let Some(input) = self.prompt.as_mut() else {
            return;
        };
        match code {
            KeyCode::Esc => self.prompt = None,
            KeyCode::Enter => {
                let input = std::mem::take(input);
                self.prompt = None;
                self.open_feed(&input);
            }
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(ch) if !ch.is_control() => input.push(ch),
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.prompt.is_some() {
            return;
        }
        let delta = match mouse.kind {
            MouseEventKind::ScrollDown => WHEEL_ROWS,
            MouseEventKind::ScrollUp => -WHEEL_ROWS,
            _ => return,
        };
        let geometry = self.renderer.geometry();
        let max = self.renderer.total_extent() - geometry.viewport_extent;
        let target = self.renderer.presenter_mut().scroll_by(delta, max);
        self.navigate(NavigationInput::ScrollTo(target));
        self.mark_dirty();
    }

    fn change_slide(&mut self, delta: i64) {
        let Some(index) = self.renderer.active_index() else {
            return;
        };
        if let Some((slide, total)) = self.renderer.presenter_mut().change_slide(index, delta) {
            debug!(index, slide, total, "gallery slide");
            self.status_message = format!("Slide {}/{}", slide + 1, total);
        }
    }

    fn open_permalink(&mut self) -> Result<()> {
        let Some(item) = self.renderer.active_item() else {
            self.status_message = "Nothing selected.".to_string();
            return Ok(());
        };
        let url = item.permalink.clone();
        if url.trim().is_empty() {
            self.status_message = "This post has no link.".to_string();
            return Ok(());
        }
        match webbrowser::open(&url) {
            Ok(_) => self.status_message = "Opened post in your browser.".to_string(),
            Err(err) => {
                self.status_message = format!("Failed to open post: {err} (URL: {url})");
            }
        }
        Ok(())
    }

    fn play_active(&mut self) -> Result<()> {
        let Some(item) = self.renderer.active_item().cloned() else {
            self.status_message = "Nothing selected.".to_string();
            return Ok(());
        };
        player::spawn_external_player(&self.video_command, &item)
            .context("start external player")?;
        self.status_message = format!("Playing {} externally.", item.payload.kind_label());
        Ok(())
    }

    fn copy_banner(&mut self) -> Result<()> {
        let Some(banner) = self.banner.current(Instant::now()) else {
            self.status_message = "No error to copy.".to_string();
            return Ok(());
        };
        let mut clipboard =
            arboard::Clipboard::new().map_err(|err| anyhow!("open clipboard: {}", err))?;
        clipboard
            .set_text(banner.clipboard_text())
            .map_err(|err| anyhow!("copy error details: {}", err))?;
        self.status_message = "Error details copied to clipboard.".to_string();
        Ok(())
    }

    fn status_text(&self) -> String {
        if let Some(input) = &self.prompt {
            return format!("Go to r/{input}▏  (Enter to open, Esc to cancel)");
        }
        let mut parts = vec![format!("r/{}", self.renderer.feed())];
        let count = self.renderer.items().len();
        if let Some(active) = self.renderer.active_index() {
            parts.push(format!("{}/{}", active + 1, count));
        }
        if let Some(item) = self.renderer.active_item() {
            parts.push(item.payload.kind_label().to_string());
        }
        parts.push(self.source_label.clone());
        if let Some(notice) = self.renderer.presenter().notice() {
            parts.push(notice.to_string());
        }
        if !self.status_message.is_empty() {
            parts.push(self.status_message.clone());
        }
        let text = parts.join(" · ");
        if self.renderer.is_loading() {
            format!("{} {}", self.spinner.frame(), text)
        } else {
            text
        }
    }

    fn footer_text(&self) -> &'static str {
        "j/k next/prev · g/G first/last · h/l slides · p play · o open · / feed · r reload · q quit"
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
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

        let status_line = Paragraph::new(self.status_text()).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        let cards_area = layout[1];
        let presenter = self.renderer.presenter();
        let lines = if self.renderer.items().is_empty() {
            empty_feed_lines(presenter.is_loading(), presenter.notice())
        } else {
            presenter.visible_lines(
                self.renderer.items().len(),
                cards_area.height as usize,
                cards_area.width,
                self.renderer.active_index(),
                Utc::now(),
            )
        };
        frame.render_widget(
            Paragraph::new(lines).style(Style::default().bg(COLOR_BG)),
            cards_area,
        );

        let footer = match self.banner.current(Instant::now()) {
            Some(banner) => {
                let text = match &banner.detail {
                    Some(detail) => format!("{}: {} · y copy · x dismiss", banner.message, detail),
                    None => format!("{} · y copy · x dismiss", banner.message),
                };
                Paragraph::new(text).style(
                    Style::default()
                        .fg(COLOR_BG)
                        .bg(COLOR_ERROR)
                        .add_modifier(Modifier::BOLD),
                )
            }
            None => Paragraph::new(self.footer_text()).style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            ),
        };
        frame.render_widget(
            footer.alignment(Alignment::Center).wrap(Wrap { trim: true }),
            layout[2],
        );
    }
}

fn empty_feed_lines(loading: bool, notice: Option<&str>) -> Vec<Line<'static>> {
    let text = match (loading, notice) {
        (true, _) => "Loading…".to_string(),
        (false, Some(notice)) => notice.to_string(),
        (false, None) => "Nothing to show yet. Press / to pick a community.".to_string(),
    };
    vec![
        Line::default(),
        Line::from(vec![
            Span::raw(CARD_INDENT),
            Span::styled(text, Style::default().fg(COLOR_TEXT_SECONDARY)),
        ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockFeedSource;
    use crate::media::GalleryImage;

    const WAIT: Duration = Duration::from_secs(5);

    fn item(n: usize, payload: MediaPayload) -> MediaItem {
        MediaItem {
            id: format!("id{n}"),
            title: format!("Card number {n}"),
            author: "someone".into(),
            community: "pics".into(),
            score: 1500,
            comment_count: 3,
            payload,
            permalink: String::new(),
            created_at: None,
            nsfw: false,
        }
    }

    fn image(n: usize) -> MediaItem {
        item(
            n,
            MediaPayload::StaticImage {
                url: format!("https://i.redd.it/{n}.jpg"),
            },
        )
    }

    fn text_of(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    fn model(pages: usize, page_size: usize) -> Model {
        let mut model = Model::new(Options {
            renderer: RendererConfig {
                throttle_interval: Duration::ZERO,
                ..RendererConfig::default()
            },
            source: Arc::new(MockFeedSource::new(pages, page_size)),
            initial_feed: "r/demo".into(),
            default_feed: "pics".into(),
            smooth_scroll: false,
            video_command: vec!["true".into()],
            source_label: "offline sample".into(),
            viewport_rows: 20,
        });
        assert!(model.renderer.await_fetch(WAIT));
        model
    }

    #[test]
    fn presenter_tracks_cards_and_playback() {
        let mut presenter = TuiPresenter::new(true);
        let video = item(
            1,
            MediaPayload::Video {
                source_url: "https://v.redd.it/1.mp4".into(),
            },
        );
        let mut handle = presenter.materialize(1, &video);
        assert_eq!(presenter.card_count(), 1);
        presenter.set_playing(1, &mut handle, true);
        assert!(presenter.is_playing(1));
        presenter.set_playing(1, &mut handle, false);
        presenter.release(1, handle);
        assert_eq!(presenter.card_count(), 0);
        assert!(!presenter.is_playing(1));
    }

    #[test]
    fn visible_lines_span_two_cards_mid_scroll() {
        let mut presenter = TuiPresenter::new(false);
        presenter.materialize(0, &image(0));
        presenter.materialize(1, &image(1));
        presenter.scroll_to(4.0, true);
        assert!(!presenter.is_animating());

        let now = Utc::now();
        let lines = presenter.visible_lines(2, 12, 60, Some(0), now);
        assert_eq!(lines.len(), 12);
        // card 1 starts after the 8 remaining rows of card 0, with its leading blank row
        assert!(text_of(&lines[9]).contains("r/pics"));
        assert!(lines[..8].iter().any(|line| text_of(line).contains("IMAGE")));
    }

    #[test]
    fn unmaterialized_and_missing_cards_still_fill_the_viewport() {
        let presenter = TuiPresenter::new(false);
        let lines = presenter.visible_lines(3, 10, 40, None, Utc::now());
        assert_eq!(lines.len(), 10);
        assert!(text_of(&lines[1]).contains('…'));
        let past_end = presenter.visible_lines(0, 10, 40, None, Utc::now());
        assert_eq!(past_end.len(), 10);
    }

    #[test]
    fn smooth_scroll_settles_on_target() {
        let mut presenter = TuiPresenter::new(true);
        presenter.scroll_to(40.0, true);
        assert!(presenter.is_animating());
        let mut frames = 0;
        while presenter.tick_animation() {
            frames += 1;
            assert!(frames < 100, "animation never settled");
        }
        assert_eq!(presenter.scroll_position(), 40.0);
    }

    #[test]
    fn gallery_slides_wrap() {
        let mut presenter = TuiPresenter::new(false);
        let gallery = item(
            0,
            MediaPayload::Gallery {
                images: (0..3)
                    .map(|n| GalleryImage {
                        url: format!("https://i.redd.it/g{n}.jpg"),
                    })
                    .collect(),
            },
        );
        presenter.materialize(0, &gallery);
        presenter.materialize(1, &image(1));
        assert_eq!(presenter.change_slide(0, 1), Some((1, 3)));
        assert_eq!(presenter.change_slide(0, -2), Some((2, 3)));
        assert_eq!(presenter.change_slide(1, 1), None);
        assert_eq!(presenter.change_slide(9, 1), None);
    }

    #[test]
    fn notices_are_worded_for_the_status_bar() {
        let mut presenter = TuiPresenter::new(false);
        presenter.notify(FeedNotice::NoMediaInPage {
            feed: "askreddit".into(),
            raw_count: 25,
            skipped: 25,
        });
        assert_eq!(
            presenter.notice(),
            Some("No media in this page of r/askreddit (25 of 25 posts skipped)")
        );
        presenter.set_loading(true);
        assert_eq!(presenter.notice(), None);
    }

    #[test]
    fn banner_expires_later_with_detail() {
        let reporter = BannerReporter::new();
        let start = Instant::now();
        reporter.report("Network error while loading r/pics", None);
        assert!(reporter.current(start).is_some());
        assert!(reporter.current(start + Duration::from_secs(16)).is_none());

        reporter.report("Network error while loading r/pics", Some("timed out"));
        let live = reporter.current(start + Duration::from_secs(16)).unwrap();
        assert_eq!(live.clipboard_text(), "Network error while loading r/pics\ntimed out");
        assert!(reporter.current(start + Duration::from_secs(21)).is_none());
    }

    #[test]
    fn banner_dismiss() {
        let reporter = BannerReporter::new();
        assert!(!reporter.dismiss());
        reporter.report("boom", Some("  "));
        assert_eq!(reporter.current(Instant::now()).unwrap().detail, None);
        assert!(reporter.dismiss());
        assert!(reporter.current(Instant::now()).is_none());
    }

    #[test]
    fn keys_step_and_jump() {
        let mut model = model(1, 6);
        assert_eq!(model.renderer.feed(), "demo");
        assert_eq!(model.renderer.active_index(), Some(0));

        model.handle_key(KeyCode::Char('j')).unwrap();
        assert_eq!(model.renderer.active_index(), Some(1));
        model.handle_key(KeyCode::Char('G')).unwrap();
        assert_eq!(model.renderer.active_index(), Some(5));
        model.handle_key(KeyCode::Down).unwrap();
        assert_eq!(model.renderer.active_index(), Some(5));
        model.handle_key(KeyCode::Char('g')).unwrap();
        assert_eq!(model.renderer.active_index(), Some(0));
        assert!(model.handle_key(KeyCode::Char('q')).unwrap());
    }

    #[test]
    fn prompt_switches_feed() {
        let mut model = model(1, 4);
        model.handle_key(KeyCode::Char('/')).unwrap();
        for ch in "r/aww".chars() {
            model.handle_key(KeyCode::Char(ch)).unwrap();
        }
        model.handle_key(KeyCode::Backspace).unwrap();
        model.handle_key(KeyCode::Char('w')).unwrap();
        assert!(model.status_text().starts_with("Go to r/r/aww"));
        model.handle_key(KeyCode::Enter).unwrap();

        assert_eq!(model.renderer.feed(), "aww");
        assert!(model.renderer.await_fetch(WAIT));
        assert_eq!(model.renderer.items()[0].id, "aww-0");
        assert!(model.status_text().starts_with("r/aww · 1/4"));
    }

    #[test]
    fn empty_prompt_falls_back_to_default_feed() {
        let mut model = model(1, 2);
        model.handle_key(KeyCode::Char('/')).unwrap();
        model.handle_key(KeyCode::Enter).unwrap();
        assert_eq!(model.renderer.feed(), "pics");
    }

    #[test]
    fn wheel_scrolls_freely_within_bounds() {
        let mut model = model(1, 3);
        let wheel = |kind| MouseEvent {
            kind,
            column: 0,
            row: 0,
            modifiers: crossterm::event::KeyModifiers::NONE,
        };
        for _ in 0..8 {
            model.handle_mouse(wheel(MouseEventKind::ScrollDown));
        }
        assert_eq!(model.renderer.active_index(), Some(1));
        assert_eq!(model.renderer.geometry().scroll_offset, 24.0);

        for _ in 0..20 {
            model.handle_mouse(wheel(MouseEventKind::ScrollDown));
        }
        assert_eq!(model.renderer.geometry().scroll_offset, 40.0);
        assert_eq!(model.renderer.active_index(), Some(2));
    }

    #[test]
    fn relative_age_buckets() {
        let now = Utc::now();
        assert_eq!(relative_age(now, now), "just now");
        assert_eq!(relative_age(now - chrono::Duration::minutes(5), now), "5m");
        assert_eq!(relative_age(now - chrono::Duration::hours(3), now), "3h");
        assert_eq!(relative_age(now - chrono::Duration::days(2), now), "2d");
    }

    #[test]
    fn truncate_respects_display_width() {
        assert_eq!(truncate_width("short", 10), "short");
        assert_eq!(truncate_width("abcdefghij", 5), "abcd…");
    }
}
