use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::data::FetchError;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const SHAPE_SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub after: Option<String>,
    pub limit: Option<u32>,
}

impl ListingOptions {
    fn into_params(self) -> Vec<(String, String)> {
        let mut params = vec![("raw_json".to_string(), "1".to_string())];
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        if let Some(after) = self.after {
            if !after.trim().is_empty() {
                params.push(("after".into(), after));
            }
        }
        params
    }
}

/// Anonymous client for the public `.json` listing endpoints.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    timeout: Duration,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .filter(|base| !base.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let timeout = config.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(timeout).build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            timeout,
        })
    }

    pub fn subreddit_listing(
        &self,
        subreddit: &str,
        opts: ListingOptions,
    ) -> Result<RawListing, FetchError> {
        let name = subreddit.trim().trim_start_matches("r/");
        let path = format!("/r/{}.json", name);
        let mut url = self.base_url.join(&path).map_err(|err| FetchError::Network {
            message: format!("invalid listing url for r/{name}: {err}"),
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in opts.into_params() {
                pairs.append_pair(&k, &v);
            }
        }

        debug!(url = %url, "reddit: fetching listing");
        let resp = self
            .http
            .get(url.clone())
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|err| self.network_error(&url, err))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(FetchError::Network {
                message: match status.as_u16() {
                    403 => format!("r/{name} is private or quarantined (HTTP 403)"),
                    404 => format!("r/{name} does not exist (HTTP 404)"),
                    429 => format!("rate limited by reddit (HTTP 429): {}", snippet(&body)),
                    _ => format!("reddit api error {status}: {}", snippet(&body)),
                },
            });
        }

        let body = resp.text().map_err(|err| self.network_error(&url, err))?;
        parse_listing(&body)
    }

    fn network_error(&self, url: &Url, err: reqwest::Error) -> FetchError {
        let message = if err.is_timeout() {
            format!(
                "request exceeded {}s timeout: {}",
                self.timeout.as_secs(),
                url
            )
        } else if err.is_connect() {
            format!("connection failed for {url}: {err}")
        } else {
            format!("request failed for {url}: {err}")
        };
        FetchError::Network { message }
    }
}

/// A decoded listing page. Children that failed to decode are counted, not kept.
#[derive(Debug, Clone, Default)]
pub struct RawListing {
    pub after: Option<String>,
    pub posts: Vec<Post>,
    pub malformed: usize,
}

/// Decodes a listing envelope (`{"data": {"after": ..., "children": [...]}}`).
///
/// The envelope itself must match or the whole page fails with
/// [`FetchError::ResponseShape`]; an individual child that does not decode as a
/// post is skipped and counted in [`RawListing::malformed`].
pub fn parse_listing(body: &str) -> Result<RawListing, FetchError> {
    let payload: Value = serde_json::from_str(body).map_err(|err| FetchError::ResponseShape {
        message: format!("listing is not valid json ({err}): {}", snippet(body)),
    })?;

    let Some(data) = payload.get("data") else {
        return Err(shape_error(body));
    };
    let Some(children) = data.get("children").and_then(Value::as_array) else {
        return Err(shape_error(body));
    };

    let after = data
        .get("after")
        .and_then(Value::as_str)
        .filter(|after| !after.is_empty())
        .map(str::to_string);

    let mut listing = RawListing {
        after,
        posts: Vec::with_capacity(children.len()),
        malformed: 0,
    };
    for child in children {
        match serde_json::from_value::<Thing<Post>>(child.clone()) {
            Ok(thing) => listing.posts.push(thing.data),
            Err(err) => {
                debug!(error = %err, "reddit: skipping malformed listing child");
                listing.malformed += 1;
            }
        }
    }
    Ok(listing)
}

fn shape_error(body: &str) -> FetchError {
    FetchError::ResponseShape {
        message: format!(
            "expected {{data: {{children: [...]}}}}, received: {}",
            snippet(body)
        ),
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(SHAPE_SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub post_hint: String,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub is_gallery: bool,
    #[serde(default)]
    pub media: Option<PostMedia>,
    #[serde(default)]
    pub secure_media: Option<PostMedia>,
    #[serde(default)]
    pub crosspost_parent_list: Vec<CrosspostParent>,
    #[serde(default)]
    pub preview: Preview,
    #[serde(default)]
    pub gallery_data: Option<GalleryData>,
    #[serde(default)]
    pub media_metadata: Option<HashMap<String, MediaMetadata>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrosspostParent {
    #[serde(default)]
    pub media: Option<PostMedia>,
    #[serde(default)]
    pub secure_media: Option<PostMedia>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PostMedia {
    #[serde(default)]
    pub reddit_video: Option<RedditVideo>,
    #[serde(default)]
    pub oembed: Option<Oembed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedditVideo {
    #[serde(default)]
    pub fallback_url: String,
    #[serde(default)]
    pub hls_url: String,
    #[serde(default)]
    pub dash_url: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub is_gif: bool,
    #[serde(default)]
    pub transcoding_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Oembed {
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Preview {
    #[serde(default)]
    pub images: Vec<PreviewImage>,
    #[serde(default)]
    pub reddit_video_preview: Option<RedditVideo>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreviewImage {
    #[serde(default)]
    pub source: PreviewSource,
    #[serde(default)]
    pub resolutions: Vec<PreviewSource>,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreviewSource {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GalleryData {
    #[serde(default)]
    pub items: Vec<GalleryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryItem {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "media_id")]
    pub media_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MediaMetadata {
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "e")]
    pub kind: String,
    #[serde(default, rename = "m")]
    pub mime: String,
    #[serde(default, rename = "s")]
    pub full: Option<MediaMetadataImage>,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MediaMetadataImage {
    #[serde(default, rename = "u")]
    pub url: Option<String>,
    #[serde(default, rename = "x")]
    pub width: i64,
    #[serde(default, rename = "y")]
    pub height: i64,
    #[serde(default)]
    pub gif: Option<String>,
    #[serde(default)]
    pub mp4: Option<String>,
}
