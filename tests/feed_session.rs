//! Drives a whole feed session against the offline source through the public API.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reelfeed::data::MockFeedSource;
use reelfeed::media::MediaItem;
use reelfeed::presenter::{ErrorReporter, FeedNotice, Presenter};
use reelfeed::renderer::{Cursor, FeedRenderer, NavigationInput, RendererConfig};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Cards {
    live: BTreeSet<usize>,
    playing: BTreeSet<usize>,
    notices: Vec<FeedNotice>,
}

impl Presenter for Cards {
    type Handle = ();

    fn materialize(&mut self, index: usize, _item: &MediaItem) {
        self.live.insert(index);
    }

    fn release(&mut self, index: usize, _handle: ()) {
        self.live.remove(&index);
    }

    fn set_playing(&mut self, index: usize, _handle: &mut (), playing: bool) {
        if playing {
            self.playing.insert(index);
        } else {
            self.playing.remove(&index);
        }
    }

    fn scroll_to(&mut self, _offset: f64, _smooth: bool) {}

    fn notify(&mut self, notice: FeedNotice) {
        self.notices.push(notice);
    }
}

#[derive(Default)]
struct Errors(Mutex<Vec<String>>);

impl ErrorReporter for Errors {
    fn report(&self, message: &str, _detail: Option<&str>) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

fn renderer(pages: usize, page_size: usize) -> (FeedRenderer<Cards>, Arc<Errors>) {
    let errors = Arc::new(Errors::default());
    let renderer = FeedRenderer::new(
        RendererConfig {
            buffer_size: 2,
            page_end_threshold: 10,
            throttle_interval: Duration::ZERO,
        },
        Arc::new(MockFeedSource::new(pages, page_size)),
        errors.clone(),
        Cards::default(),
        30.0,
    );
    (renderer, errors)
}

#[test]
fn walking_to_the_end_loads_every_page() {
    let (mut renderer, errors) = renderer(3, 12);
    renderer.switch_feed("earthporn");
    assert!(renderer.await_fetch(WAIT));
    assert_eq!(renderer.items().len(), 12);
    assert_eq!(renderer.cursor(), &Cursor::Next("page-1".into()));

    let mut guard = 0;
    while renderer.active_index() != Some(35) {
        let active = renderer.active_index().unwrap_or(0);
        if active + 1 < renderer.items().len() {
            renderer.on_navigation_input(NavigationInput::Step(1), Instant::now());
        } else {
            assert!(renderer.await_fetch(WAIT), "stuck at {active}");
        }
        while renderer.is_loading() {
            renderer.await_fetch(WAIT);
        }
        guard += 1;
        assert!(guard < 200);
    }

    assert_eq!(renderer.items().len(), 36);
    assert_eq!(renderer.cursor(), &Cursor::Exhausted);
    assert!(errors.0.lock().unwrap().is_empty());

    let cards = renderer.presenter();
    assert_eq!(cards.live, BTreeSet::from([33, 34, 35]));
    assert!(cards.playing.len() <= 1);
    assert!(cards
        .notices
        .iter()
        .any(|notice| matches!(notice, FeedNotice::EndOfFeed { total: 36, .. })));

    let ids: BTreeSet<&str> = renderer.items().iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids.len(), 36, "items are never duplicated");
}

#[test]
fn switching_feeds_starts_over() {
    let (mut renderer, _errors) = renderer(2, 5);
    renderer.switch_feed("pics");
    assert!(renderer.await_fetch(WAIT));
    renderer.on_navigation_input(NavigationInput::Jump(3), Instant::now());
    assert_eq!(renderer.active_index(), Some(3));

    renderer.switch_feed("gifs");
    assert!(renderer.items().is_empty());
    assert!(renderer.presenter().live.is_empty());
    assert!(renderer.await_fetch(WAIT));
    while renderer.is_loading() {
        renderer.await_fetch(WAIT);
    }
    assert_eq!(renderer.active_index(), Some(0));
    assert!(renderer.items().iter().all(|item| item.id.starts_with("gifs-")));
}
