use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::media::VideoSize;

/// Codec value that makes ffmpeg copy a stream without re-encoding it.
pub const COPY_ORIGINAL_STREAM: &str = "copy";

/// Options for one conversion.
///
/// Every `None` leaves the choice to ffmpeg. A conversion needs at least one
/// of `audio` and `video`; a missing one is dropped from the output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingOptions {
    /// Output container format (`-f`).
    pub format: Option<String>,
    /// Start offset in seconds (`-ss`).
    pub offset: Option<f32>,
    /// Duration of the output in seconds (`-t`).
    pub duration: Option<f32>,
    pub audio: Option<AudioOptions>,
    pub video: Option<VideoOptions>,
    pub filter_threads: Option<u32>,
    pub decoding_threads: Option<u32>,
    pub encoding_threads: Option<u32>,
    /// Copy the source's global metadata into the output.
    pub map_metadata: bool,
}

impl EncodingOptions {
    /// Loads options from a JSON document.
    ///
    /// ```
    /// # use ffconvert::EncodingOptions;
    /// let options = EncodingOptions::from_json(r#"{"format": "mp4", "audio": {"codec": "aac"}}"#)?;
    /// assert_eq!(options.format.as_deref(), Some("mp4"));
    /// # Ok::<(), ffconvert::Error>(())
    /// ```
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::configuration(e.to_string()))
    }
}

/// Audio encoding options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOptions {
    /// Encoder name, or [`COPY_ORIGINAL_STREAM`].
    pub codec: Option<String>,
    pub bit_rate: Option<u32>,
    /// 1 (mono), 2 (stereo) or 4 (quad).
    pub channels: Option<u32>,
    pub sampling_rate: Option<u32>,
    /// Volume scale where 256 leaves the volume unchanged.
    pub volume: Option<u32>,
    /// Codec-specific quality scale (`-qscale:a`).
    pub quality: Option<u32>,
}

/// Video encoding options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoOptions {
    /// Encoder name, or [`COPY_ORIGINAL_STREAM`].
    pub codec: Option<String>,
    /// FourCC tag (`-vtag`).
    pub tag: Option<String>,
    pub bit_rate: Option<u32>,
    pub frame_rate: Option<u32>,
    pub size: Option<VideoSize>,
    /// Moves the index to the front of the file (`-movflags faststart`).
    pub faststart: bool,
    pub x264_profile: Option<X264Profile>,
    /// Filter expressions, each passed with its own `-vf`.
    pub filters: Vec<String>,
    /// Codec-specific quality scale (`-qscale:v`).
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum X264Profile {
    Baseline,
    Main,
    High,
    High10,
    High422,
    High444,
}

impl X264Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            X264Profile::Baseline => "baseline",
            X264Profile::Main => "main",
            X264Profile::High => "high",
            X264Profile::High10 => "high10",
            X264Profile::High422 => "high422",
            X264Profile::High444 => "high444",
        }
    }
}
