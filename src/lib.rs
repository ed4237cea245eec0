#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod data;
pub mod logging;
pub mod media;
pub mod player;
pub mod presenter;
pub mod reddit;
pub mod renderer;
pub mod throttle;
pub mod ui;
pub mod window;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
