//! Feed renderer and playback coordinator.
//!
//! [`FeedRenderer`] owns one feed session: the ordered item list, the
//! continuation cursor, the active index and the registry of materialized
//! nodes. Navigation input is coalesced, mapped onto a [`Window`], and the
//! registry is reconciled against it through a [`Presenter`]. Page fetches run
//! on worker threads and come back over a channel tagged with the session
//! that issued them; results for a session that has since been replaced are
//! dropped on arrival.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, trace, warn};

use crate::data::{FeedSource, FetchError, Page};
use crate::media::MediaItem;
use crate::presenter::{ErrorReporter, FeedNotice, Presenter};
use crate::throttle::Coalescer;
use crate::window::{self, ViewportGeometry, Window};

pub const DEFAULT_BUFFER_SIZE: usize = 3;
pub const DEFAULT_PAGE_END_THRESHOLD: usize = 10;
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    /// Cards kept materialized beyond the visible edge on each side.
    pub buffer_size: usize,
    /// Remaining-items count at which the next page is requested.
    pub page_end_threshold: usize,
    pub throttle_interval: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            page_end_threshold: DEFAULT_PAGE_END_THRESHOLD,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavigationInput {
    /// Raw scroll position from the presentation layer.
    ScrollTo(f64),
    /// Relative move, e.g. `+1` for the next card.
    Step(i64),
    Jump(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Nothing fetched yet for this session.
    Start,
    Next(String),
    Exhausted,
}

/// Where a navigation cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    RangeRecomputed,
    Reconciling,
    PlaybackUpdated,
    PaginationChecked,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub released: usize,
}

struct Node<H> {
    handle: H,
    playable: bool,
    playing: bool,
}

struct FeedState {
    feed: String,
    session: u64,
    items: Vec<MediaItem>,
    cursor: Cursor,
    in_flight: bool,
    active: Option<usize>,
    end_notified: bool,
}

impl FeedState {
    fn new(feed: &str, session: u64) -> Self {
        Self {
            feed: feed.to_string(),
            session,
            items: Vec::new(),
            cursor: Cursor::Start,
            in_flight: false,
            active: None,
            end_notified: false,
        }
    }
}

struct FetchResponse {
    session: u64,
    result: Result<Page, FetchError>,
}

pub struct FeedRenderer<P: Presenter> {
    config: RendererConfig,
    source: Arc<dyn FeedSource>,
    reporter: Arc<dyn ErrorReporter>,
    presenter: P,
    state: FeedState,
    registry: BTreeMap<usize, Node<P::Handle>>,
    geometry: ViewportGeometry,
    coalescer: Coalescer<f64>,
    phase: CyclePhase,
    reconciling: bool,
    next_session: u64,
    response_tx: Sender<FetchResponse>,
    response_rx: Receiver<FetchResponse>,
}

impl<P: Presenter> FeedRenderer<P> {
    pub fn new(
        config: RendererConfig,
        source: Arc<dyn FeedSource>,
        reporter: Arc<dyn ErrorReporter>,
        presenter: P,
        viewport_extent: f64,
    ) -> Self {
        let (response_tx, response_rx) = unbounded();
        let coalescer = Coalescer::new(config.throttle_interval);
        Self {
            config,
            source,
            reporter,
            presenter,
            state: FeedState::new("", 0),
            registry: BTreeMap::new(),
            geometry: ViewportGeometry::new(viewport_extent),
            coalescer,
            phase: CyclePhase::Idle,
            reconciling: false,
            next_session: 1,
            response_tx,
            response_rx,
        }
    }

    pub fn feed(&self) -> &str {
        &self.state.feed
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.state.items
    }

    pub fn active_index(&self) -> Option<usize> {
        self.state.active
    }

    pub fn active_item(&self) -> Option<&MediaItem> {
        self.state.active.and_then(|index| self.state.items.get(index))
    }

    pub fn cursor(&self) -> &Cursor {
        &self.state.cursor
    }

    pub fn is_loading(&self) -> bool {
        self.state.in_flight
    }

    pub fn geometry(&self) -> ViewportGeometry {
        self.geometry
    }

    pub fn total_extent(&self) -> f64 {
        self.geometry.total_extent(self.state.items.len())
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn materialized_indices(&self) -> Vec<usize> {
        self.registry.keys().copied().collect()
    }

    pub fn playing_indices(&self) -> Vec<usize> {
        self.registry
            .iter()
            .filter(|(_, node)| node.playing)
            .map(|(index, _)| *index)
            .collect()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Access to presentation-local state (gallery slides and the like).
    /// Materialization and playback stay with the renderer.
    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Replaces the whole session with a fresh one for `feed` and requests its first page.
    pub fn switch_feed(&mut self, feed: &str) {
        let indices: Vec<usize> = self.registry.keys().copied().collect();
        for index in indices {
            self.release_node(index);
        }

        let session = self.next_session;
        self.next_session = self.next_session.wrapping_add(1);
        if self.state.in_flight {
            debug!(
                feed = %self.state.feed,
                session = self.state.session,
                "outstanding fetch superseded by feed switch"
            );
        }
        self.state = FeedState::new(feed, session);
        self.geometry.scroll_offset = 0.0;
        self.coalescer.clear();
        self.phase = CyclePhase::Idle;
        self.presenter.scroll_to(0.0, false);

        info!(feed, session, "switching feed");
        self.start_fetch(None);
    }

    /// Accepts one navigation input. Step and jump targets are resolved to a
    /// scroll offset here; the recomputation itself runs once the coalescing
    /// window allows it.
    pub fn on_navigation_input(&mut self, input: NavigationInput, now: Instant) {
        let count = self.state.items.len();
        let offset = match input {
            NavigationInput::ScrollTo(offset) => offset,
            NavigationInput::Step(delta) => {
                let from = self.requested_index() as i64;
                let Some(target) = from
                    .checked_add(delta)
                    .and_then(|target| usize::try_from(target).ok())
                    .filter(|target| *target < count)
                else {
                    debug!(from, delta, count, "step target out of bounds");
                    return;
                };
                self.smooth_scroll_to(target)
            }
            NavigationInput::Jump(target) => {
                if target >= count {
                    debug!(target, count, "jump target out of bounds");
                    return;
                }
                self.smooth_scroll_to(target)
            }
        };

        self.coalescer.offer(offset, now);
        if self.phase == CyclePhase::Idle {
            self.tick(now);
        }
    }

    /// Runs a coalesced input that has come due and applies finished fetches.
    /// Returns whether anything observable changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = self.poll_fetches();
        if let Some(offset) = self.coalescer.take_due(now) {
            self.run_cycle(offset);
            changed = true;
        }
        changed
    }

    /// When the next coalesced input becomes due, for sizing event-loop waits.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.coalescer.deadline()
    }

    /// Item extent follows the viewport; the active card stays in place.
    pub fn resize(&mut self, viewport_extent: f64) {
        let extent = viewport_extent.max(1.0);
        if extent == self.geometry.viewport_extent && extent == self.geometry.item_extent {
            return;
        }
        let active = self.state.active.unwrap_or(0);
        self.geometry.viewport_extent = extent;
        self.geometry.item_extent = extent;
        self.geometry.scroll_offset = self.geometry.offset_for_index(active);
        self.presenter.scroll_to(self.geometry.scroll_offset, false);
        self.refresh();
    }

    /// Removes nodes outside `window`, then materializes missing indices in
    /// ascending order. A nested call while a pass is running does nothing.
    pub fn reconcile_materialization(&mut self, window: Window) -> ReconcileStats {
        if self.reconciling {
            trace!("reconcile already in progress");
            return ReconcileStats::default();
        }
        self.reconciling = true;
        let mut stats = ReconcileStats::default();

        let evict: Vec<usize> = self
            .registry
            .keys()
            .copied()
            .filter(|index| !window.contains(*index))
            .collect();
        for index in evict {
            self.release_node(index);
            stats.released += 1;
        }

        let end = window.end.min(self.state.items.len().saturating_sub(1));
        if !self.state.items.is_empty() {
            for index in window.start..=end {
                if self.registry.contains_key(&index) {
                    continue;
                }
                let item = &self.state.items[index];
                let handle = self.presenter.materialize(index, item);
                self.registry.insert(
                    index,
                    Node {
                        handle,
                        playable: item.payload.is_playable(),
                        playing: false,
                    },
                );
                stats.created += 1;
            }
        }

        if stats.created > 0 || stats.released > 0 {
            debug!(
                start = window.start,
                end = window.end,
                created = stats.created,
                released = stats.released,
                "reconciled materialized cards"
            );
        }
        self.reconciling = false;
        stats
    }

    /// Pauses everything that plays, then starts the card at `new` if it is
    /// playable and materialized.
    pub fn on_active_index_changed(&mut self, old: Option<usize>, new: Option<usize>) {
        if old == new {
            return;
        }
        for (index, node) in self.registry.iter_mut() {
            if node.playing {
                self.presenter.set_playing(*index, &mut node.handle, false);
                node.playing = false;
            }
        }
        let Some(index) = new else {
            return;
        };
        if let Some(node) = self.registry.get_mut(&index) {
            if node.playable {
                self.presenter.set_playing(index, &mut node.handle, true);
                node.playing = true;
                debug!(index, "playing active card");
            }
        }
    }

    /// Requests the next page when the active card is within the threshold of
    /// the end, a cursor is available and nothing is in flight. Returns whether
    /// a fetch was started.
    pub fn maybe_paginate(&mut self) -> bool {
        let Some(active) = self.state.active else {
            return false;
        };
        if self.state.in_flight {
            return false;
        }
        let Cursor::Next(token) = &self.state.cursor else {
            return false;
        };
        let count = self.state.items.len();
        if active < count.saturating_sub(self.config.page_end_threshold) {
            return false;
        }
        let token = token.clone();
        debug!(active, count, cursor = %token, "near end of feed, requesting next page");
        self.start_fetch(Some(token));
        true
    }

    /// Applies every fetch result that has already arrived.
    pub fn poll_fetches(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.response_rx.try_recv() {
            self.apply_fetch(response);
            changed = true;
        }
        changed
    }

    /// Blocks up to `timeout` for one fetch result, then drains any others.
    pub fn await_fetch(&mut self, timeout: Duration) -> bool {
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => {
                self.apply_fetch(response);
                self.poll_fetches();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn requested_index(&self) -> usize {
        match self.coalescer.pending() {
            Some(offset) => window::compute(
                &ViewportGeometry {
                    scroll_offset: *offset,
                    ..self.geometry
                },
                self.state.items.len(),
                0,
            )
            .map(|window| window.active)
            .unwrap_or(0),
            None => self.state.active.unwrap_or(0),
        }
    }

    fn smooth_scroll_to(&mut self, index: usize) -> f64 {
        let offset = self.geometry.offset_for_index(index);
        self.presenter.scroll_to(offset, true);
        offset
    }

    fn run_cycle(&mut self, offset: f64) {
        let max_offset = self
            .geometry
            .offset_for_index(self.state.items.len().saturating_sub(1));
        self.geometry.scroll_offset = if offset.is_finite() {
            offset.clamp(0.0, max_offset)
        } else {
            0.0
        };
        self.refresh();
    }

    fn refresh(&mut self) {
        let window = window::compute(
            &self.geometry,
            self.state.items.len(),
            self.config.buffer_size,
        );
        self.phase = CyclePhase::RangeRecomputed;

        let new_active = window.map(|window| window.active);
        if let Some(window) = window {
            self.phase = CyclePhase::Reconciling;
            self.reconcile_materialization(window);
        }

        let old_active = self.state.active;
        self.state.active = new_active;
        self.on_active_index_changed(old_active, new_active);
        self.phase = CyclePhase::PlaybackUpdated;

        self.maybe_paginate();
        self.phase = CyclePhase::PaginationChecked;
        self.phase = CyclePhase::Idle;
    }

    fn release_node(&mut self, index: usize) {
        if let Some(mut node) = self.registry.remove(&index) {
            if node.playing {
                self.presenter.set_playing(index, &mut node.handle, false);
            }
            self.presenter.release(index, node.handle);
        }
    }

    fn start_fetch(&mut self, cursor: Option<String>) {
        self.state.in_flight = true;
        self.presenter.set_loading(true);

        let source = self.source.clone();
        let tx = self.response_tx.clone();
        let feed = self.state.feed.clone();
        let session = self.state.session;
        thread::spawn(move || {
            let result = source.fetch_page(&feed, cursor.as_deref());
            let _ = tx.send(FetchResponse { session, result });
        });
    }

    fn apply_fetch(&mut self, response: FetchResponse) {
        if response.session != self.state.session {
            debug!(
                stale = response.session,
                current = self.state.session,
                "discarding result for replaced feed session"
            );
            return;
        }
        self.state.in_flight = false;
        self.presenter.set_loading(false);

        let page = match response.result {
            Ok(page) => page,
            Err(err) => {
                warn!(feed = %self.state.feed, error = %err, "page fetch failed");
                let message = format!("{} while loading r/{}", err.headline(), self.state.feed);
                self.reporter.report(&message, Some(err.message()));
                return;
            }
        };

        self.state.cursor = match page.next_cursor {
            Some(token) if !token.trim().is_empty() => Cursor::Next(token),
            _ => Cursor::Exhausted,
        };

        if page.items.is_empty() {
            info!(
                feed = %self.state.feed,
                raw = page.raw_count,
                skipped = page.skipped,
                "page had no displayable media"
            );
            self.presenter.notify(FeedNotice::NoMediaInPage {
                feed: self.state.feed.clone(),
                raw_count: page.raw_count,
                skipped: page.skipped,
            });
        } else {
            self.state.items.extend(page.items);
            info!(
                feed = %self.state.feed,
                total = self.state.items.len(),
                skipped = page.skipped,
                "appended page"
            );
            self.refresh();
        }

        if self.state.cursor == Cursor::Exhausted && !self.state.end_notified {
            self.state.end_notified = true;
            self.presenter.notify(FeedNotice::EndOfFeed {
                feed: self.state.feed.clone(),
                total: self.state.items.len(),
            });
        }
    }
}
