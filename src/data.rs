use std::sync::Arc;

use tracing::debug;

use crate::media::{self, GalleryImage, MediaItem, MediaPayload};
use crate::reddit::{self, ListingOptions};

pub const DEFAULT_FEED: &str = "pics";

/// Failure of a single page request. Terminal for that attempt; nothing retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {message}")]
    Network { message: String },
    #[error("unexpected response shape: {message}")]
    ResponseShape { message: String },
}

impl FetchError {
    pub fn headline(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "Network error",
            FetchError::ResponseShape { .. } => "Unexpected API response",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FetchError::Network { message } | FetchError::ResponseShape { message } => message,
        }
    }
}

/// One page of already-classified items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<MediaItem>,
    pub next_cursor: Option<String>,
    /// Records the source returned before classification.
    pub raw_count: usize,
    /// Records dropped because they were malformed or had nothing to show.
    pub skipped: usize,
}

pub trait FeedSource: Send + Sync {
    fn fetch_page(&self, feed: &str, cursor: Option<&str>) -> Result<Page, FetchError>;
}

pub struct RedditFeedSource {
    client: Arc<reddit::Client>,
    page_size: u32,
}

impl RedditFeedSource {
    pub fn new(client: Arc<reddit::Client>, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.clamp(1, 100),
        }
    }
}

impl FeedSource for RedditFeedSource {
    fn fetch_page(&self, feed: &str, cursor: Option<&str>) -> Result<Page, FetchError> {
        let listing = self.client.subreddit_listing(
            feed,
            ListingOptions {
                after: cursor.map(str::to_string),
                limit: Some(self.page_size),
            },
        )?;

        let raw_count = listing.posts.len() + listing.malformed;
        let mut page = Page {
            items: Vec::with_capacity(listing.posts.len()),
            next_cursor: listing.after,
            raw_count,
            skipped: listing.malformed,
        };
        for post in &listing.posts {
            match media::classify(post) {
                Ok(item) => page.items.push(item),
                Err(skipped) => {
                    debug!(feed, id = %skipped.id, reason = ?skipped.reason, "skipping record");
                    page.skipped += 1;
                }
            }
        }
        Ok(page)
    }
}

/// Offline sample feed used by `--offline`.
pub struct MockFeedSource {
    pages: usize,
    page_size: usize,
}

impl Default for MockFeedSource {
    fn default() -> Self {
        Self {
            pages: 3,
            page_size: 12,
        }
    }
}

impl MockFeedSource {
    pub fn new(pages: usize, page_size: usize) -> Self {
        Self { pages, page_size }
    }
}

impl FeedSource for MockFeedSource {
    fn fetch_page(&self, feed: &str, cursor: Option<&str>) -> Result<Page, FetchError> {
        let page_index = match cursor {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| FetchError::ResponseShape {
                    message: format!("unknown cursor {token:?}"),
                })?,
        };
        if page_index >= self.pages {
            return Ok(Page::default());
        }

        let start = page_index * self.page_size;
        let items = (start..start + self.page_size)
            .map(|n| sample_item(feed, n))
            .collect::<Vec<_>>();
        let next_cursor = if page_index + 1 < self.pages {
            Some(format!("page-{}", page_index + 1))
        } else {
            None
        };
        Ok(Page {
            raw_count: items.len(),
            items,
            next_cursor,
            skipped: 0,
        })
    }
}

fn sample_item(feed: &str, n: usize) -> MediaItem {
    let payload = match n % 5 {
        0 => MediaPayload::StaticImage {
            url: format!("https://picsum.photos/seed/{feed}{n}/1080/1920"),
        },
        1 => MediaPayload::Video {
            source_url: "https://test-videos.co.uk/vids/bigbuckbunny/mp4/h264/360/Big_Buck_Bunny_360_10s_1MB.mp4".into(),
        },
        2 => MediaPayload::Gallery {
            images: (0..3)
                .map(|slide| GalleryImage {
                    url: format!("https://picsum.photos/seed/{feed}{n}-{slide}/1080/1350"),
                })
                .collect(),
        },
        3 => MediaPayload::AnimatedImage {
            url: "https://upload.wikimedia.org/wikipedia/commons/2/2c/Rotating_earth_%28large%29.gif".into(),
        },
        _ => MediaPayload::Embed {
            iframe_src: "https://www.youtube.com/embed/aqz-KE-bpKQ".into(),
            aspect_ratio: Some(16.0 / 9.0),
            autoplay: false,
        },
    };
    MediaItem {
        id: format!("{feed}-{n}"),
        title: format!("Sample {} #{n} from r/{feed}", payload.kind_label()),
        author: "reelfeed".into(),
        community: feed.to_string(),
        score: (n as i64 + 1) * 137,
        comment_count: (n as i64 * 7) % 90,
        payload,
        permalink: format!("https://www.reddit.com/r/{feed}/"),
        created_at: None,
        nsfw: false,
    }
}

/// Reduces user input such as `r/pics`, `/r/pics/` or a full community URL to `pics`.
pub fn normalize_feed(input: &str, fallback: &str) -> String {
    let mut feed = input.trim();
    for prefix in ["https://", "http://"] {
        feed = feed.strip_prefix(prefix).unwrap_or(feed);
    }
    for host in ["www.reddit.com", "old.reddit.com", "reddit.com"] {
        feed = feed.strip_prefix(host).unwrap_or(feed);
    }
    let feed = feed.trim_start_matches('/');
    let feed = feed.strip_prefix("r/").unwrap_or(feed);
    let feed = feed.split(['/', '?', '#']).next().unwrap_or_default().trim();
    if feed.is_empty() {
        fallback.trim().to_string()
    } else {
        feed.to_string()
    }
}
