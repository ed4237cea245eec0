use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config;
use crate::data::{self, FeedSource, MockFeedSource, RedditFeedSource};
use crate::logging;
use crate::reddit;
use crate::ui;

const FALLBACK_VIEWPORT_ROWS: u16 = 22;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Community to open instead of `viewer.default_feed`.
    pub feed: Option<String>,
    /// Browse generated sample cards instead of reddit.com.
    pub offline: bool,
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    logging::init(&cfg.log).context("initialise logging")?;

    let (source, source_label): (Arc<dyn FeedSource>, String) = if options.offline {
        (Arc::new(MockFeedSource::default()), "offline sample".to_string())
    } else {
        let client = reddit::Client::new(reddit::ClientConfig {
            user_agent: cfg.reddit.user_agent.clone(),
            base_url: Some(cfg.reddit.base_url.clone()),
            timeout: Some(cfg.reddit.timeout),
            http_client: None,
        })
        .context("create reddit client")?;
        (
            Arc::new(RedditFeedSource::new(
                Arc::new(client),
                cfg.reddit.page_size,
            )),
            host_label(&cfg.reddit.base_url),
        )
    };

    let default_feed = data::normalize_feed(&cfg.viewer.default_feed, data::DEFAULT_FEED);
    let initial_feed = options
        .feed
        .as_deref()
        .map(|feed| data::normalize_feed(feed, &default_feed))
        .unwrap_or_else(|| default_feed.clone());
    info!(
        feed = %initial_feed,
        offline = options.offline,
        config = %friendly_path(config::default_path().as_ref()),
        "starting"
    );

    let viewport_rows = crossterm::terminal::size()
        .map(|(_, rows)| rows.saturating_sub(2))
        .unwrap_or(FALLBACK_VIEWPORT_ROWS);

    let mut model = ui::Model::new(ui::Options {
        renderer: cfg.viewer.renderer_config(),
        source,
        initial_feed,
        default_feed,
        smooth_scroll: cfg.viewer.smooth_scroll,
        video_command: cfg.player.video_command.clone(),
        source_label,
        viewport_rows,
    });
    model.run()?;

    info!("exiting");
    Ok(())
}

fn host_label(base_url: &str) -> String {
    url::Url::parse(base_url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| base_url.to_string())
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/reelfeed/config.yaml".to_string()
    }
}
