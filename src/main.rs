use reelfeed::RunOptions;

fn main() {
    let options = match parse_cli_flags() {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(message) => {
            eprintln!("error: {message}\n\nRun with --help for usage.");
            std::process::exit(2);
        }
    };

    if let Err(err) = reelfeed::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// `Ok(None)` means a flag was fully handled and the program should exit.
fn parse_cli_flags() -> Result<Option<RunOptions>, String> {
    let mut options = RunOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("reelfeed {}", reelfeed::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!(
                    "reelfeed - Swipe through Reddit media feeds one full-screen card at a time.\n\n  --feed,    -f NAME   Open r/NAME instead of the configured default\n  --offline            Browse generated sample cards without network access\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n\nSet REELFEED_LOG=/path/to/file to write a debug log."
                );
                return Ok(None);
            }
            "--offline" => options.offline = true,
            "--feed" | "-f" => match args.next() {
                Some(feed) => options.feed = Some(feed),
                None => return Err(format!("{arg} needs a community name")),
            },
            other => {
                if let Some(feed) = other.strip_prefix("--feed=") {
                    options.feed = Some(feed.to_string());
                } else {
                    return Err(format!("unknown argument {other:?}"));
                }
            }
        }
    }
    Ok(Some(options))
}
