use clap::Parser;
use ffconvert::{FFmpeg, MediaSource};
use tracing::error;

/// Prints what ffmpeg reports about a file or URL, as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// A file path, or a URL when `--url` is given.
    source: String,

    /// Treat the source as a URL.
    #[arg(long)]
    url: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let ffmpeg = match FFmpeg::new().await {
        Ok(ffmpeg) => ffmpeg,
        Err(e) => {
            error!("Error finding ffmpeg: {}", e);
            error!("Please ensure ffmpeg is installed, in your PATH or named by FFMPEG_PATH.");
            return;
        }
    };

    let source = if cli.url {
        MediaSource::url(cli.source)
    } else {
        MediaSource::from(cli.source.as_str())
    };

    match ffmpeg.probe(&source).await {
        Ok(description) => match serde_json::to_string_pretty(&description) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to serialize description: {}", e),
        },
        Err(e) => error!("Probe failed: {}", e),
    }
}
