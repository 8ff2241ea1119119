use std::path::PathBuf;

use clap::Parser;
use ffconvert::{ConversionEvent, FFmpeg, MediaSource, shutdown};
use futures::StreamExt;
use tracing::{error, info, warn};

/// Converts one or more files and prints the conversion events.
///
/// Ctrl-C aborts the conversion.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input files; several are joined one after another.
    #[arg(short, long, required = true)]
    input: Vec<PathBuf>,

    /// The output file.
    #[arg(short, long)]
    output: PathBuf,

    /// Output container format, e.g. "mp4".
    #[arg(short, long)]
    format: Option<String>,

    /// Video encoder, e.g. "libx264" or "copy".
    #[arg(long)]
    video_codec: Option<String>,

    /// Audio encoder, e.g. "aac" or "copy".
    #[arg(long)]
    audio_codec: Option<String>,

    /// Scale the video to WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Only convert this many seconds.
    #[arg(short, long)]
    duration: Option<f32>,

    /// Drop the audio stream.
    #[arg(long)]
    no_audio: bool,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (width, height) = s.split_once('x').ok_or("expected WIDTHxHEIGHT")?;
    let width = width.parse().map_err(|e| format!("invalid width: {e}"))?;
    let height = height.parse().map_err(|e| format!("invalid height: {e}"))?;
    Ok((width, height))
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
    info!("Found ffmpeg: {}", ffmpeg.version());

    let mut builder = ffmpeg.converter();
    if let Some(format) = cli.format {
        builder = builder.format(format);
    }
    if let Some(codec) = cli.video_codec {
        builder = builder.video_codec(codec);
    }
    if let Some(codec) = cli.audio_codec {
        builder = builder.audio_codec(codec);
    }
    if let Some((width, height)) = cli.size {
        builder = builder.video_size(width, height);
    }
    if let Some(duration) = cli.duration {
        builder = builder.duration(duration);
    }
    if cli.no_audio {
        builder = builder.without_audio();
    }
    let converter = builder.build();

    let sources: Vec<MediaSource> = cli.input.into_iter().map(MediaSource::from).collect();
    info!("Converting {:?} into {:?}", sources, cli.output);
    let mut handle = converter.start(sources, cli.output);

    let abort_converter = converter.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, aborting");
            abort_converter.abort();
            let killed = shutdown::terminate_registered();
            info!(killed, "terminated registered ffmpeg processes");
        }
    });

    let mut event_stream = handle.events();
    while let Some(event) = event_stream.next().await {
        match event {
            ConversionEvent::Started(description) => info!(?description, "Conversion started"),
            ConversionEvent::Progress(percentage) => info!("Progress: {}%", percentage),
            ConversionEvent::Message(message) => warn!("ffmpeg: {}", message),
            ConversionEvent::Completed(completion) => {
                info!(?completion, code = completion.code(), "Conversion finished");
            }
            ConversionEvent::Failed(failure) => error!(?failure, "Conversion failed"),
        }
    }

    let unhandled = converter.unhandled_messages();
    if !unhandled.is_empty() {
        info!(count = unhandled.len(), "ffmpeg printed lines that were not recognized");
    }
}
