use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::analyzer::ConversionAnalyzer;
use crate::error::Error;
use crate::event::{Completion, EventSender, ProgressListener};
use crate::handle::ConversionHandle;
use crate::media::MediaDescription;
use crate::options::{AudioOptions, EncodingOptions, VideoOptions, X264Profile};
use crate::probe::probe_source;
use crate::process::{ProcessHandle, missing_stream};
use crate::reader::PushbackLineReader;

/// A source for a conversion or a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A local file, passed to ffmpeg as an absolute path.
    File(PathBuf),
    /// A URL. A `read_once` source can only be read a single time, so it is
    /// never probed before a conversion.
    Url { url: String, read_once: bool },
}

impl MediaSource {
    pub fn url(url: impl Into<String>) -> Self {
        MediaSource::Url {
            url: url.into(),
            read_once: false,
        }
    }

    pub fn url_read_once(url: impl Into<String>) -> Self {
        MediaSource::Url {
            url: url.into(),
            read_once: true,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, MediaSource::Url { .. })
    }

    pub fn is_read_once(&self) -> bool {
        matches!(self, MediaSource::Url { read_once: true, .. })
    }

    /// The source as ffmpeg is given it on the command line.
    pub fn to_argument(&self) -> String {
        match self {
            MediaSource::File(path) => absolute(path),
            MediaSource::Url { url, .. } => url.clone(),
        }
    }
}

impl From<PathBuf> for MediaSource {
    fn from(p: PathBuf) -> Self {
        MediaSource::File(p)
    }
}

impl From<&str> for MediaSource {
    fn from(p: &str) -> Self {
        MediaSource::File(p.into())
    }
}

fn absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A fluent builder for a [`Converter`].
///
/// Audio and video are both enabled with ffmpeg's defaults until
/// `without_audio()`/`without_video()` is called. For every setting the last
/// call wins.
pub struct ConverterBuilder {
    // The path to the ffmpeg executable, copied from the FFmpeg instance
    executable: PathBuf,
    options: EncodingOptions,
}

impl ConverterBuilder {
    /// Creates a new `ConverterBuilder` instance.
    ///
    /// This is typically called via `FFmpeg::converter()`.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        ConverterBuilder {
            executable: executable.into(),
            options: EncodingOptions {
                audio: Some(AudioOptions::default()),
                video: Some(VideoOptions::default()),
                ..EncodingOptions::default()
            },
        }
    }

    /// Replaces every option at once.
    pub fn options(mut self, options: EncodingOptions) -> Self {
        self.options = options;
        self
    }

    fn audio(&mut self) -> &mut AudioOptions {
        self.options.audio.get_or_insert_with(AudioOptions::default)
    }

    fn video(&mut self) -> &mut VideoOptions {
        self.options.video.get_or_insert_with(VideoOptions::default)
    }

    /// Sets the output container format.
    ///
    /// e.g., `"mp4"`, `"matroska"`
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.options.format = Some(format.into());
        self
    }

    /// Starts reading the source `seconds` in.
    pub fn offset(mut self, seconds: f32) -> Self {
        self.options.offset = Some(seconds);
        self
    }

    /// Limits the output to `seconds`.
    pub fn duration(mut self, seconds: f32) -> Self {
        self.options.duration = Some(seconds);
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.options.audio = None;
        self
    }

    pub fn without_video(mut self) -> Self {
        self.options.video = None;
        self
    }

    /// Sets the audio encoder.
    ///
    /// e.g., `"aac"`, `"libmp3lame"`, or [`COPY_ORIGINAL_STREAM`](crate::COPY_ORIGINAL_STREAM)
    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio().codec = Some(codec.into());
        self
    }

    pub fn audio_bit_rate(mut self, bit_rate: u32) -> Self {
        self.audio().bit_rate = Some(bit_rate);
        self
    }

    /// 1 (mono), 2 (stereo) or 4 (quad).
    pub fn audio_channels(mut self, channels: u32) -> Self {
        self.audio().channels = Some(channels);
        self
    }

    pub fn audio_sampling_rate(mut self, sampling_rate: u32) -> Self {
        self.audio().sampling_rate = Some(sampling_rate);
        self
    }

    /// 256 leaves the volume unchanged, 512 doubles it.
    pub fn audio_volume(mut self, volume: u32) -> Self {
        self.audio().volume = Some(volume);
        self
    }

    pub fn audio_quality(mut self, quality: u32) -> Self {
        self.audio().quality = Some(quality);
        self
    }

    /// Sets the video encoder.
    ///
    /// e.g., `"libx264"`, `"libvpx-vp9"`, or [`COPY_ORIGINAL_STREAM`](crate::COPY_ORIGINAL_STREAM)
    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video().codec = Some(codec.into());
        self
    }

    pub fn video_tag(mut self, tag: impl Into<String>) -> Self {
        self.video().tag = Some(tag.into());
        self
    }

    pub fn video_bit_rate(mut self, bit_rate: u32) -> Self {
        self.video().bit_rate = Some(bit_rate);
        self
    }

    pub fn video_frame_rate(mut self, frame_rate: u32) -> Self {
        self.video().frame_rate = Some(frame_rate);
        self
    }

    pub fn video_size(mut self, width: u32, height: u32) -> Self {
        self.video().size = Some(crate::VideoSize::new(width, height));
        self
    }

    pub fn faststart(mut self, faststart: bool) -> Self {
        self.video().faststart = faststart;
        self
    }

    pub fn x264_profile(mut self, profile: X264Profile) -> Self {
        self.video().x264_profile = Some(profile);
        self
    }

    /// Adds a video filter expression. Can be called multiple times.
    pub fn video_filter(mut self, expression: impl Into<String>) -> Self {
        self.video().filters.push(expression.into());
        self
    }

    pub fn video_quality(mut self, quality: u32) -> Self {
        self.video().quality = Some(quality);
        self
    }

    pub fn filter_threads(mut self, threads: u32) -> Self {
        self.options.filter_threads = Some(threads);
        self
    }

    pub fn decoding_threads(mut self, threads: u32) -> Self {
        self.options.decoding_threads = Some(threads);
        self
    }

    pub fn encoding_threads(mut self, threads: u32) -> Self {
        self.options.encoding_threads = Some(threads);
        self
    }

    /// Copies the source's metadata into the output.
    pub fn map_metadata(mut self, map_metadata: bool) -> Self {
        self.options.map_metadata = map_metadata;
        self
    }

    pub fn build(self) -> Converter {
        Converter::new(self.executable, self.options)
    }
}

/// Runs conversions with one set of [`EncodingOptions`].
///
/// Clones share the same queue: conversions started through a converter and
/// its clones run one after another, never concurrently. Use separate
/// converters to run conversions in parallel.
#[derive(Clone)]
pub struct Converter {
    inner: Arc<ConverterInner>,
}

struct ConverterInner {
    executable: PathBuf,
    options: EncodingOptions,
    queue: tokio::sync::Mutex<()>,
    active: Mutex<Option<CancellationToken>>,
    unhandled_messages: Mutex<Vec<String>>,
}

impl Converter {
    pub fn new(executable: impl Into<PathBuf>, options: EncodingOptions) -> Self {
        Self {
            inner: Arc::new(ConverterInner {
                executable: executable.into(),
                options,
                queue: tokio::sync::Mutex::new(()),
                active: Mutex::new(None),
                unhandled_messages: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn options(&self) -> &EncodingOptions {
        &self.inner.options
    }

    /// Lines of ffmpeg output the last finished conversion did not recognize.
    pub fn unhandled_messages(&self) -> Vec<String> {
        lock(&self.inner.unhandled_messages).clone()
    }

    /// Aborts the conversion currently running, if any.
    ///
    /// The process is killed and the conversion reports
    /// [`Completion::Aborted`]. Does nothing when no conversion is running.
    pub fn abort(&self) {
        if let Some(token) = lock(&self.inner.active).as_ref() {
            info!("aborting ffmpeg conversion");
            token.cancel();
        }
    }

    /// Converts `sources` into `target`, reporting to `listener`, and waits
    /// for the result.
    ///
    /// Multiple sources are joined with ffmpeg's `concat:` protocol, so they
    /// must be compatible with each other. An existing `target` is overwritten.
    ///
    /// # Errors
    ///
    /// Every error is also passed to [`ProgressListener::on_error`].
    /// - [`Error::Configuration`] if neither audio nor video output is requested
    ///   or no source is given. No process is started.
    /// - [`Error::Launch`] if ffmpeg could not be spawned.
    /// - [`Error::ProcessFailure`] if ffmpeg exited with a non-zero code.
    /// - [`Error::Aborted`] if [`abort`](Self::abort) was called. This one is
    ///   reported through [`ProgressListener::on_complete`] instead.
    pub async fn convert(
        &self,
        sources: &[MediaSource],
        target: impl AsRef<Path>,
        listener: &dyn ProgressListener,
    ) -> Result<(), Error> {
        self.run(sources, target.as_ref(), listener, CancellationToken::new())
            .await
    }

    /// Starts the conversion on its own task and returns a [`ConversionHandle`]
    /// to follow and control it.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start(&self, sources: Vec<MediaSource>, target: impl Into<PathBuf>) -> ConversionHandle {
        // Channel for sending events from the conversion task to the handle.
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let converter = self.clone();
        let target = target.into();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let listener = EventSender::new(event_tx);
            // The outcome has already been delivered as events.
            let _ = converter.run(&sources, &target, &listener, token).await;
        });

        ConversionHandle {
            cancel,
            event_rx,
            task,
        }
    }

    async fn run(
        &self,
        sources: &[MediaSource],
        target: &Path,
        listener: &dyn ProgressListener,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        let _turn = self.inner.queue.lock().await;

        if let Err(e) = self.validate(sources) {
            listener.on_error(&e);
            return Err(e);
        }
        if cancel.is_cancelled() {
            listener.on_complete(Completion::Aborted);
            return Err(Error::Aborted);
        }

        *lock(&self.inner.active) = Some(cancel.clone());
        let mut process = ProcessHandle::new(&self.inner.executable);
        let result = self
            .supervise(&mut process, sources, target, listener, &cancel)
            .await;
        process.destroy();
        *lock(&self.inner.active) = None;

        match result {
            Ok(Completion::Completed) => {
                listener.on_progress(100);
                listener.on_complete(Completion::Completed);
                Ok(())
            }
            Ok(completion) => {
                listener.on_complete(completion);
                Err(Error::Aborted)
            }
            Err(e) => {
                listener.on_error(&e);
                Err(e)
            }
        }
    }

    fn validate(&self, sources: &[MediaSource]) -> Result<(), Error> {
        let options = &self.inner.options;
        if options.audio.is_none() && options.video.is_none() {
            return Err(Error::configuration("Both audio and video options are missing"));
        }
        if sources.is_empty() {
            return Err(Error::configuration("No source to convert"));
        }
        Ok(())
    }

    async fn supervise(
        &self,
        process: &mut ProcessHandle,
        sources: &[MediaSource],
        target: &Path,
        listener: &dyn ProgressListener,
        cancel: &CancellationToken,
    ) -> Result<Completion, Error> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        for arg in self.build_args(sources, target) {
            process.add_argument(arg);
        }
        process.execute(true, true)?;

        // Nothing is written to stdout, but a blocked pipe would stall ffmpeg.
        if let Some(mut stdout) = process.take_stdout() {
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await;
            });
        }
        let stderr = process.take_stderr().ok_or_else(|| missing_stream("stderr"))?;
        let mut reader = PushbackLineReader::new(stderr);

        let description = match sources {
            [source] if !source.is_read_once() => tokio::select! {
                biased;
                // Dropping the probe future kills the probe process.
                _ = cancel.cancelled() => return Ok(Completion::Aborted),
                description = probe_source(&self.inner.executable, source) => Some(description?),
            },
            _ => None,
        };
        let duration_millis = expected_duration_millis(&self.inner.options, description.as_ref());
        listener.on_start(description.as_ref());

        let mut analyzer = ConversionAnalyzer::new(duration_millis, listener);
        let reached_end = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break false,
                line = reader.read_line() => match line? {
                    Some(line) => analyzer.analyze_line(&line),
                    None => break true,
                },
            }
        };
        let last_warning = analyzer.last_warning().map(str::to_string);
        *lock(&self.inner.unhandled_messages) = analyzer.into_unhandled_messages();
        if !reached_end {
            return Ok(Completion::Aborted);
        }

        let exit_code = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Completion::Aborted),
            code = process.exit_code() => code?,
        };
        if exit_code != 0 {
            error!(exit_code, target = %target.display(), "ffmpeg conversion failed");
            return Err(Error::ProcessFailure {
                exit_code,
                last_warning,
            });
        }
        Ok(Completion::Completed)
    }

    /// Builds the ffmpeg arguments for converting `sources` into `target`.
    ///
    /// The banner flag is not included; the process handle appends it.
    pub fn build_args(&self, sources: &[MediaSource], target: &Path) -> Vec<String> {
        let options = &self.inner.options;
        let mut args: Vec<String> = Vec::new();

        // Global options
        if let Some(threads) = options.filter_threads {
            args.extend(["-filter_threads".into(), threads.to_string()]);
        }
        if let Some(offset) = options.offset {
            args.extend(["-ss".into(), offset.to_string()]);
        }

        // Input options, must come before -i
        if let Some(threads) = options.decoding_threads {
            args.extend(["-threads".into(), threads.to_string()]);
        }
        let input = match sources {
            [source] => source.to_argument(),
            _ => {
                let joined: Vec<String> = sources.iter().map(MediaSource::to_argument).collect();
                format!("concat:{}", joined.join("|"))
            }
        };
        args.extend(["-i".into(), input]);

        if let Some(duration) = options.duration {
            args.extend(["-t".into(), duration.to_string()]);
        }

        match &options.video {
            None => args.push("-vn".into()),
            Some(video) => {
                if let Some(codec) = &video.codec {
                    args.extend(["-vcodec".into(), codec.clone()]);
                }
                if let Some(tag) = &video.tag {
                    args.extend(["-vtag".into(), tag.clone()]);
                }
                if let Some(bit_rate) = video.bit_rate {
                    args.extend(["-vb".into(), bit_rate.to_string()]);
                }
                if let Some(frame_rate) = video.frame_rate {
                    args.extend(["-r".into(), frame_rate.to_string()]);
                }
                if let Some(size) = video.size {
                    args.extend(["-s".into(), size.to_string()]);
                }
                if video.faststart {
                    args.extend(["-movflags".into(), "faststart".into()]);
                }
                if let Some(profile) = video.x264_profile {
                    args.extend(["-profile:v".into(), profile.as_str().into()]);
                }
                for filter in &video.filters {
                    args.extend(["-vf".into(), filter.clone()]);
                }
                if let Some(quality) = video.quality {
                    args.extend(["-qscale:v".into(), quality.to_string()]);
                }
            }
        }

        match &options.audio {
            None => args.push("-an".into()),
            Some(audio) => {
                if let Some(codec) = &audio.codec {
                    args.extend(["-acodec".into(), codec.clone()]);
                }
                if let Some(bit_rate) = audio.bit_rate {
                    args.extend(["-ab".into(), bit_rate.to_string()]);
                }
                if let Some(channels) = audio.channels {
                    args.extend(["-ac".into(), channels.to_string()]);
                }
                if let Some(sampling_rate) = audio.sampling_rate {
                    args.extend(["-ar".into(), sampling_rate.to_string()]);
                }
                if let Some(volume) = audio.volume {
                    args.extend(["-vol".into(), volume.to_string()]);
                }
                if let Some(quality) = audio.quality {
                    args.extend(["-qscale:a".into(), quality.to_string()]);
                }
            }
        }

        if let Some(format) = &options.format {
            args.extend(["-f".into(), format.clone()]);
        }

        // Output options
        if let Some(threads) = options.encoding_threads {
            args.extend(["-threads".into(), threads.to_string()]);
        }
        if options.map_metadata {
            args.extend(["-map_metadata".into(), "0".into()]);
        }

        args.push("-y".into());
        args.push(absolute(target));
        args
    }
}

/// The output length a conversion is expected to produce, in milliseconds.
///
/// An explicit duration wins; otherwise the probed duration minus the start
/// offset. Zero when neither is known.
fn expected_duration_millis(options: &EncodingOptions, description: Option<&MediaDescription>) -> i64 {
    let millis = |seconds: f32| (f64::from(seconds) * 1000.0).round() as i64;
    if let Some(duration) = options.duration {
        return millis(duration);
    }
    match description.and_then(|d| d.duration_millis) {
        Some(total) => total - options.offset.map_or(0, millis),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(duration_millis: Option<i64>) -> MediaDescription {
        MediaDescription {
            format: "mov".into(),
            duration_millis,
            video: None,
            audio: None,
        }
    }

    #[test]
    fn test_explicit_duration_wins() {
        let options = EncodingOptions {
            duration: Some(10.0),
            offset: Some(2.0),
            ..Default::default()
        };
        assert_eq!(expected_duration_millis(&options, Some(&description(Some(60_000)))), 10_000);
    }

    #[test]
    fn test_probed_duration_minus_offset() {
        let options = EncodingOptions {
            offset: Some(2.5),
            ..Default::default()
        };
        assert_eq!(expected_duration_millis(&options, Some(&description(Some(60_000)))), 57_500);
    }

    #[test]
    fn test_unknown_duration_is_zero() {
        let options = EncodingOptions::default();
        assert_eq!(expected_duration_millis(&options, Some(&description(None))), 0);
        assert_eq!(expected_duration_millis(&options, None), 0);
    }

    #[test]
    fn test_read_once_url_is_never_probed() {
        assert!(MediaSource::url_read_once("http://example.com/live").is_read_once());
        assert!(!MediaSource::url("http://example.com/file.mp4").is_read_once());
        assert!(!MediaSource::from("/tmp/a.mp4").is_read_once());
    }

    #[tokio::test]
    async fn test_missing_audio_and_video_starts_nothing() {
        let converter = Converter::new("/nonexistent/ffmpeg", EncodingOptions::default());
        let err = converter
            .convert(&["/tmp/in.mp4".into()], "/tmp/out.mp4", &())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_abort_when_idle_is_noop() {
        let converter = ConverterBuilder::new("/nonexistent/ffmpeg").build();
        converter.abort();
        converter.abort();
        assert!(lock(&converter.inner.active).is_none());
    }
}
