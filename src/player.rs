use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::media::MediaItem;

const URL_PLACEHOLDER: &str = "%URL%";
const TITLE_PLACEHOLDER: &str = "%TITLE%";

/// Builds the argv for playing `item` with the configured command template.
///
/// `%URL%` and `%TITLE%` are substituted inside every argument; when the
/// template has no `%URL%` the URL is appended.
pub fn build_command(template: &[String], item: &MediaItem) -> Result<Vec<String>> {
    let Some(program) = template.first().filter(|p| !p.trim().is_empty()) else {
        return Err(anyhow!("player.video_command is empty"));
    };
    let url = playback_url(item).ok_or_else(|| anyhow!("{} has nothing to play", item.id))?;

    let mut args = vec![program.clone()];
    let mut saw_url = false;
    for arg in &template[1..] {
        if arg.contains(URL_PLACEHOLDER) {
            saw_url = true;
        }
        args.push(
            arg.replace(URL_PLACEHOLDER, url)
                .replace(TITLE_PLACEHOLDER, item.title.trim()),
        );
    }
    if !saw_url {
        args.push(url.to_string());
    }
    Ok(args)
}

fn playback_url(item: &MediaItem) -> Option<&str> {
    item.payload
        .primary_url()
        .map(str::trim)
        .filter(|url| !url.is_empty())
}

/// Launches the external player detached from the terminal.
pub fn spawn_external_player(template: &[String], item: &MediaItem) -> Result<()> {
    let args = build_command(template, item)?;
    let mut command = Command::new(&args[0]);
    for arg in &args[1..] {
        command.arg(arg);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());
    command
        .spawn()
        .with_context(|| format!("launch {} for {}", args[0], item.id))?;
    info!(program = %args[0], id = %item.id, "external player launched");
    Ok(())
}
