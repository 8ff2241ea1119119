use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

mod analyzer;
mod capabilities;
mod error;
mod event;
mod handle;
mod job;
mod media;
mod options;
mod probe;
mod process;
mod reader;
pub mod shutdown;

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "ffmpeg";

/// Environment variable naming the ffmpeg executable to use.
pub const FFMPEG_PATH_VAR: &str = "FFMPEG_PATH";

/// Validates that the given path points to a runnable ffmpeg executable.
/// Runs `ffmpeg -version` and returns the first line of its output.
async fn validate_executable(path: &Path) -> Result<String, Error> {
    let mut command = Command::new(path);
    let output = command
        .arg("-version")
        .output()
        .await
        .map_err(|e| Error::InvalidExecutable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::InvalidExecutable {
            path: path.to_path_buf(),
            reason: format!(
                "'-version' command failed with exit code: {:?}",
                output.status.code()
            ),
        });
    }

    let version_string = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    if version_string.is_empty() {
        return Err(Error::InvalidExecutable {
            path: path.to_path_buf(),
            reason: "ffmpeg -version returned empty output".to_string(),
        });
    }

    Ok(version_string)
}

/// Searches the given PATH string for the ffmpeg executable.
fn find_executable_in_path(path_env: &OsStr) -> Result<PathBuf, Error> {
    let paths = env::split_paths(path_env).collect::<Vec<_>>();
    for path in &paths {
        let executable_path = path.join(EXECUTABLE_NAME);
        if executable_path.is_file() {
            return Ok(executable_path);
        }
    }

    Err(Error::ExecutableNotFound {
        searched_paths: paths,
    })
}

pub use analyzer::{AnalyzerState, ConversionAnalyzer};
pub use capabilities::{CoderDirection, FormatDirection, MediaKind, parse_coders, parse_formats};
pub use error::Error;
pub use event::{Completion, ConversionEvent, ConversionFailure, ProgressListener};
pub use handle::ConversionHandle;
pub use job::{Converter, ConverterBuilder, MediaSource};
pub use media::{AudioStreamInfo, MediaDescription, VideoSize, VideoStreamInfo};
pub use options::{AudioOptions, COPY_ORIGINAL_STREAM, EncodingOptions, VideoOptions, X264Profile};
pub use probe::parse_media_description;
pub use process::{HIDE_BANNER, ProcessHandle};
pub use reader::PushbackLineReader;

/// Supplies the path of the ffmpeg executable to use.
///
/// Implemented for fixed paths and for closures, so a lookup can be written inline:
///
/// ```rust,no_run
/// # use ffconvert::FFmpeg;
/// # use std::path::PathBuf;
/// # #[tokio::main]
/// # async fn main() -> Result<(), ffconvert::Error> {
/// let ffmpeg = FFmpeg::from_locator(|| PathBuf::from("/opt/ffmpeg/bin/ffmpeg")).await?;
/// # Ok(())
/// # }
/// ```
pub trait Locator {
    fn executable_path(&self) -> PathBuf;
}

impl Locator for PathBuf {
    fn executable_path(&self) -> PathBuf {
        self.clone()
    }
}

impl<F> Locator for F
where
    F: Fn() -> PathBuf,
{
    fn executable_path(&self) -> PathBuf {
        self()
    }
}

/// Represents the ffmpeg executable.
#[derive(Debug, Clone)]
pub struct FFmpeg {
    executable_path: PathBuf,
    version: String,
}

impl FFmpeg {
    /// Discovers the ffmpeg executable.
    ///
    /// `FFMPEG_PATH` is used when set; otherwise the system PATH is searched.
    pub async fn new() -> Result<Self, Error> {
        let executable_path = match env::var_os(FFMPEG_PATH_VAR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => {
                let path_var = env::var_os("PATH").ok_or(Error::ExecutableNotFound {
                    searched_paths: Vec::new(),
                })?;
                find_executable_in_path(&path_var)?
            }
        };
        Self::new_with_path(executable_path).await
    }

    /// Creates a new FFmpeg instance with a specific executable path.
    pub async fn new_with_path(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let executable_path = path.into();
        let version = validate_executable(&executable_path).await?;
        debug!(path = %executable_path.display(), version = %version, "found ffmpeg");
        Ok(Self {
            executable_path,
            version,
        })
    }

    /// Creates a new FFmpeg instance with the path a [`Locator`] supplies.
    pub async fn from_locator(locator: impl Locator) -> Result<Self, Error> {
        Self::new_with_path(locator.executable_path()).await
    }

    /// Returns the first line of `ffmpeg -version`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    /// Starts building a new converter.
    pub fn converter(&self) -> ConverterBuilder {
        ConverterBuilder::new(self.executable_path.clone())
    }

    /// Describes a source: container format, duration and stream details.
    ///
    /// # Errors
    ///
    /// - [`Error::InputNotFound`] if a file source cannot be read. ffmpeg is not started.
    /// - [`Error::UnsupportedInput`] if ffmpeg rejects the source.
    /// - [`Error::Parse`] if ffmpeg printed no input header.
    pub async fn probe(&self, source: &MediaSource) -> Result<MediaDescription, Error> {
        probe::probe_source(&self.executable_path, source).await
    }

    /// Names of the audio encoders this ffmpeg build supports.
    pub async fn audio_encoders(&self) -> Result<Vec<String>, Error> {
        self.coders(CoderDirection::Encoders, MediaKind::Audio).await
    }

    /// Names of the video encoders this ffmpeg build supports.
    pub async fn video_encoders(&self) -> Result<Vec<String>, Error> {
        self.coders(CoderDirection::Encoders, MediaKind::Video).await
    }

    pub async fn audio_decoders(&self) -> Result<Vec<String>, Error> {
        self.coders(CoderDirection::Decoders, MediaKind::Audio).await
    }

    pub async fn video_decoders(&self) -> Result<Vec<String>, Error> {
        self.coders(CoderDirection::Decoders, MediaKind::Video).await
    }

    /// Container formats ffmpeg can write.
    pub async fn encoding_formats(&self) -> Result<Vec<String>, Error> {
        let lines = self.listing("-formats").await?;
        Ok(parse_formats(lines, FormatDirection::Encoding))
    }

    /// Container formats ffmpeg can read.
    pub async fn decoding_formats(&self) -> Result<Vec<String>, Error> {
        let lines = self.listing("-formats").await?;
        Ok(parse_formats(lines, FormatDirection::Decoding))
    }

    async fn coders(&self, direction: CoderDirection, kind: MediaKind) -> Result<Vec<String>, Error> {
        let lines = self.listing(direction.flag()).await?;
        Ok(parse_coders(lines, direction, kind))
    }

    /// Runs ffmpeg with a single listing flag and collects its standard output.
    async fn listing(&self, flag: &str) -> Result<Vec<String>, Error> {
        let mut process = ProcessHandle::new(&self.executable_path);
        process.add_argument(flag);
        process.execute(true, true)?;

        let stdout = process
            .take_stdout()
            .ok_or_else(|| process::missing_stream("stdout"))?;
        let mut reader = PushbackLineReader::new(stdout);
        let mut lines = Vec::new();
        while let Some(line) = reader.read_line().await? {
            lines.push(line);
        }
        process.destroy();
        Ok(lines)
    }
}
