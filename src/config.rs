use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::renderer::{
    RendererConfig, DEFAULT_BUFFER_SIZE, DEFAULT_PAGE_END_THRESHOLD, DEFAULT_THROTTLE_INTERVAL,
};

const DEFAULT_ENV_PREFIX: &str = "REELFEED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    crate::reddit::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("reelfeed/{} (+https://github.com/danielmerja/reelfeed)", crate::VERSION)
}

fn default_page_size() -> u32 {
    50
}

fn default_timeout() -> Duration {
    crate::reddit::DEFAULT_TIMEOUT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_page_end_threshold")]
    pub page_end_threshold: usize,
    #[serde(default = "default_throttle_interval", with = "humantime_serde")]
    pub throttle_interval: Duration,
    #[serde(default = "default_feed")]
    pub default_feed: String,
    #[serde(default = "default_smooth_scroll")]
    pub smooth_scroll: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            page_end_threshold: default_page_end_threshold(),
            throttle_interval: default_throttle_interval(),
            default_feed: default_feed(),
            smooth_scroll: default_smooth_scroll(),
        }
    }
}

impl ViewerConfig {
    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            buffer_size: self.buffer_size,
            page_end_threshold: self.page_end_threshold,
            throttle_interval: self.throttle_interval,
        }
    }
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_page_end_threshold() -> usize {
    DEFAULT_PAGE_END_THRESHOLD
}

fn default_throttle_interval() -> Duration {
    DEFAULT_THROTTLE_INTERVAL
}

fn default_feed() -> String {
    crate::data::DEFAULT_FEED.to_string()
}

fn default_smooth_scroll() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_video_command")]
    pub video_command: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_command: default_video_command(),
        }
    }
}

fn default_video_command() -> Vec<String> {
    vec![
        "mpv".into(),
        "--loop-file=inf".into(),
        "%URL%".into(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.reddit.base_url.trim().is_empty() {
        base.reddit.base_url = other.reddit.base_url;
    }
    if !other.reddit.user_agent.trim().is_empty() {
        base.reddit.user_agent = other.reddit.user_agent;
    }
    if other.reddit.page_size != 0 {
        base.reddit.page_size = other.reddit.page_size;
    }
    if !other.reddit.timeout.is_zero() {
        base.reddit.timeout = other.reddit.timeout;
    }

    base.viewer.buffer_size = other.viewer.buffer_size;
    if other.viewer.page_end_threshold != 0 {
        base.viewer.page_end_threshold = other.viewer.page_end_threshold;
    }
    base.viewer.throttle_interval = other.viewer.throttle_interval;
    if !other.viewer.default_feed.trim().is_empty() {
        base.viewer.default_feed = other.viewer.default_feed;
    }
    base.viewer.smooth_scroll = other.viewer.smooth_scroll;

    if !other.player.video_command.is_empty() {
        base.player.video_command = other.player.video_command;
    }

    if other.log.file.is_some() {
        base.log.file = other.log.file;
    }
    if !other.log.level.trim().is_empty() {
        base.log.level = other.log.level;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "reddit.base_url" => cfg.reddit.base_url = value,
        "reddit.user_agent" => cfg.reddit.user_agent = value,
        "reddit.page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.reddit.page_size = parsed;
            }
        }
        "reddit.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.reddit.timeout = duration;
            }
        }
        "viewer.buffer_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.viewer.buffer_size = parsed;
            }
        }
        "viewer.page_end_threshold" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.viewer.page_end_threshold = parsed;
            }
        }
        "viewer.throttle_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.viewer.throttle_interval = duration;
            }
        }
        "viewer.default_feed" => cfg.viewer.default_feed = value,
        "viewer.smooth_scroll" => {
            cfg.viewer.smooth_scroll = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "player.video_command" => {
            cfg.player.video_command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        "log.level" => cfg.log.level = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reelfeed").join("config.yaml"))
}
