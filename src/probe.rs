use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::analyzer::is_telemetry_line;
use crate::error::Error;
use crate::job::MediaSource;
use crate::media::{AudioStreamInfo, MediaDescription, VideoSize, VideoStreamInfo};
use crate::process::{ProcessHandle, missing_stream};
use crate::reader::PushbackLineReader;

static INPUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*Input #0, (\w+)").expect("BUG: Failed to compile input regex"));

static DURATION_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*Duration:").expect("BUG: Failed to compile duration line regex"));

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*Duration: (?P<h>\d\d):(?P<m>\d\d):(?P<s>\d\d)\.(?P<hs>\d\d)")
        .expect("BUG: Failed to compile duration regex")
});

static STREAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*Stream #\S+: (?P<kind>Audio|Video|Data): (?P<specs>.*?)\s*$")
        .expect("BUG: Failed to compile stream regex")
});

static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)x(\d+)").expect("BUG: Failed to compile size regex"));

static FRAME_RATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([\d.]+)\s+(?:fps|tbr)").expect("BUG: Failed to compile frame rate regex")
});

static BIT_RATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s+kb/s").expect("BUG: Failed to compile bit rate regex"));

static SAMPLING_RATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s+Hz").expect("BUG: Failed to compile sampling rate regex"));

static CHANNELS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(mono|stereo|quad)").expect("BUG: Failed to compile channels regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ContainerHeader,
    Duration,
    Streams,
}

/// Reads ffmpeg's description of a source from `reader` and builds a [`MediaDescription`].
///
/// `source` is the path or URL exactly as it was passed to ffmpeg; a line
/// starting with `"<source>: "` before the container header is ffmpeg
/// rejecting the input. Parsing stops at the first progress telemetry line,
/// which is pushed back so that the next consumer of `reader` sees it.
///
/// # Errors
///
/// - [`Error::UnsupportedInput`] with ffmpeg's message if the input was rejected.
/// - [`Error::Parse`] if the stream ended before an `Input #0` header.
/// - [`Error::Io`] if reading failed.
pub async fn parse_media_description<R>(
    source: &str,
    reader: &mut PushbackLineReader<R>,
) -> Result<MediaDescription, Error>
where
    R: AsyncRead + Unpin,
{
    let rejection_prefix = format!("{source}: ");
    let mut description: Option<MediaDescription> = None;
    let mut step = Step::ContainerHeader;

    while let Some(line) = reader.read_line().await? {
        debug!(line = %line, "probe output");

        match step {
            Step::ContainerHeader => {
                if let Some(message) = line.strip_prefix(&rejection_prefix) {
                    return Err(Error::UnsupportedInput {
                        message: message.to_string(),
                    });
                }
                if let Some(caps) = INPUT_RE.captures(&line) {
                    description = Some(MediaDescription::new(&caps[1]));
                    step = Step::Duration;
                }
            }
            Step::Duration => {
                if let Some(description) = description.as_mut() {
                    if DURATION_LINE_RE.is_match(&line) {
                        match parse_duration(&line) {
                            Some(millis) => description.duration_millis = Some(millis),
                            None => warn!(line = %line, "Invalid duration found"),
                        }
                        step = Step::Streams;
                    }
                }
            }
            Step::Streams => {
                // Metadata blocks and other stream kinds leave the step unchanged.
                if let (Some(description), Some(caps)) = (description.as_mut(), STREAM_RE.captures(&line)) {
                    let specs = caps.name("specs").map_or("", |m| m.as_str());
                    match caps["kind"].to_ascii_lowercase().as_str() {
                        "video" => description.video = Some(parse_video_specs(specs)),
                        "audio" => description.audio = Some(parse_audio_specs(specs)),
                        _ => {}
                    }
                }
            }
        }

        if is_telemetry_line(&line) {
            reader.push_back(line);
            break;
        }
    }

    description.ok_or_else(|| Error::parse("no input header found in ffmpeg output"))
}

/// Runs `ffmpeg -i <source>` and parses the description it prints.
///
/// ffmpeg exits with an error when no output is given; the exit code is ignored.
pub(crate) async fn probe_source(executable: &Path, source: &MediaSource) -> Result<MediaDescription, Error> {
    if let MediaSource::File(path) = source {
        if tokio::fs::File::open(path).await.is_err() {
            return Err(Error::InputNotFound { path: path.clone() });
        }
    }

    let argument = source.to_argument();
    let mut process = ProcessHandle::new(executable);
    process.add_argument("-i").add_argument(&argument);
    process.execute(true, true)?;

    let stderr = process.take_stderr().ok_or_else(|| missing_stream("stderr"))?;
    let mut reader = PushbackLineReader::new(stderr);
    let result = parse_media_description(&argument, &mut reader).await;
    process.destroy();
    result
}

/// Converts a `Duration: HH:MM:SS.hh` line to milliseconds.
fn parse_duration(line: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(line)?;
    let field = |name: &str| caps[name].parse::<i64>().ok();
    let hours = field("h")?;
    let minutes = field("m")?;
    let seconds = field("s")?;
    let hundredths = field("hs")?;
    Some(hundredths * 10 + seconds * 1000 + minutes * 60_000 + hours * 3_600_000)
}

fn parse_video_specs(specs: &str) -> VideoStreamInfo {
    let mut tokens = specs.split(',').map(str::trim);
    let mut video = VideoStreamInfo {
        decoder: tokens.next().unwrap_or_default().to_string(),
        size: None,
        bit_rate: None,
        frame_rate: None,
    };

    for token in tokens {
        if let Some(caps) = SIZE_RE.captures(token) {
            if let (Ok(width), Ok(height)) = (caps[1].parse(), caps[2].parse()) {
                video.size = Some(VideoSize::new(width, height));
            }
        } else if let Some(caps) = FRAME_RATE_RE.captures(token) {
            match caps[1].parse::<f32>() {
                Ok(rate) => video.frame_rate = Some(rate),
                Err(_) => info!(value = &caps[1], "Invalid frame rate value"),
            }
        } else if let Some(caps) = BIT_RATE_RE.captures(token) {
            video.bit_rate = caps[1].parse::<i64>().ok().and_then(|kbps| kbps.checked_mul(1000));
        }
    }
    video
}

fn parse_audio_specs(specs: &str) -> AudioStreamInfo {
    let mut tokens = specs.split(',').map(str::trim);
    let mut audio = AudioStreamInfo {
        decoder: tokens.next().unwrap_or_default().to_string(),
        sampling_rate: None,
        channels: None,
        bit_rate: None,
    };

    for token in tokens {
        if let Some(caps) = SAMPLING_RATE_RE.captures(token) {
            audio.sampling_rate = caps[1].parse().ok();
        } else if let Some(caps) = CHANNELS_RE.captures(token) {
            audio.channels = match caps[1].to_ascii_lowercase().as_str() {
                "mono" => Some(1),
                "stereo" => Some(2),
                "quad" => Some(4),
                _ => None,
            };
        } else if let Some(caps) = BIT_RATE_RE.captures(token) {
            audio.bit_rate = caps[1].parse::<i64>().ok().and_then(|kbps| kbps.checked_mul(1000));
        }
    }
    audio
}
