use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and height of a video frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl VideoSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for VideoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A description of a source media file, as reported by an ffmpeg probe.
///
/// Values ffmpeg did not report are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescription {
    /// The container format (e.g., "mov", "matroska", "mp3").
    pub format: String,
    /// The total duration in milliseconds.
    pub duration_millis: Option<i64>,
    /// The video stream, if the source has one.
    pub video: Option<VideoStreamInfo>,
    /// The audio stream, if the source has one.
    pub audio: Option<AudioStreamInfo>,
}

impl MediaDescription {
    pub(crate) fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            duration_millis: None,
            video: None,
            audio: None,
        }
    }
}

/// Attributes of a source video stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    /// The decoder description, as printed by ffmpeg (e.g., "h264 (High)").
    pub decoder: String,
    pub size: Option<VideoSize>,
    /// Bit rate in bits per second.
    pub bit_rate: Option<i64>,
    /// Frames per second.
    pub frame_rate: Option<f32>,
}

/// Attributes of a source audio stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    /// The decoder description, as printed by ffmpeg (e.g., "aac (LC)").
    pub decoder: String,
    /// Sampling rate in Hz.
    pub sampling_rate: Option<i64>,
    /// Channel count: 1 (mono), 2 (stereo) or 4 (quad).
    pub channels: Option<i64>,
    /// Bit rate in bits per second.
    pub bit_rate: Option<i64>,
}
