use crate::media::MediaItem;

/// The presentation layer the renderer drives.
///
/// The renderer's registry is authoritative for what is materialized; a
/// presenter only creates, releases and toggles the nodes it is told about.
pub trait Presenter {
    /// Live, resource-holding node for one card.
    type Handle;

    fn materialize(&mut self, index: usize, item: &MediaItem) -> Self::Handle;

    /// Drops the node. Playback has already been stopped when this is called.
    fn release(&mut self, index: usize, handle: Self::Handle);

    fn set_playing(&mut self, index: usize, handle: &mut Self::Handle, playing: bool);

    /// Moves the viewport to `offset`, animated when `smooth` is set.
    fn scroll_to(&mut self, offset: f64, smooth: bool);

    fn set_loading(&mut self, _loading: bool) {}

    fn notify(&mut self, _notice: FeedNotice) {}
}

/// Non-error conditions surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedNotice {
    /// A page arrived but none of its records had displayable media.
    NoMediaInPage {
        feed: String,
        raw_count: usize,
        skipped: usize,
    },
    /// The source has no further pages.
    EndOfFeed { feed: String, total: usize },
}

/// Fire-and-forget sink for user-visible failures.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, message: &str, detail: Option<&str>);
}
