//! Parsing of ffmpeg's `-encoders`, `-decoders` and `-formats` listings.

use once_cell::sync::Lazy;
use regex::Regex;

static CODER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?P<kind>[AVS]).{5}\s(?P<name>\S+).(.+)$").expect("BUG: Failed to compile coder regex")
});

static FORMAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<demux>[D ])(?P<mux>[E ])[d ]?\s+(?P<names>[\w,]+)\s+.+$")
        .expect("BUG: Failed to compile format regex")
});

/// Whether a listing is about encoders or decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoderDirection {
    Encoders,
    Decoders,
}

impl CoderDirection {
    pub(crate) fn flag(&self) -> &'static str {
        match self {
            CoderDirection::Encoders => "-encoders",
            CoderDirection::Decoders => "-decoders",
        }
    }

    fn header(&self) -> &'static str {
        match self {
            CoderDirection::Encoders => "Encoders:",
            CoderDirection::Decoders => "Decoders:",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    fn flag(&self) -> &'static str {
        match self {
            MediaKind::Audio => "A",
            MediaKind::Video => "V",
        }
    }
}

/// Whether a format listing is read for muxing or demuxing support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatDirection {
    Encoding,
    Decoding,
}

/// Collects the coder names of `kind` from a `-encoders`/`-decoders` listing.
pub fn parse_coders<I, S>(lines: I, direction: CoderDirection, kind: MediaKind) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names = Vec::new();
    let mut header_found = false;
    let mut in_table = false;

    for line in lines {
        let line = line.as_ref();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !header_found {
            header_found = trimmed == direction.header();
        } else if !in_table {
            in_table = trimmed == "------";
        } else {
            let Some(caps) = CODER_RE.captures(line) else {
                break;
            };
            if caps["kind"].eq_ignore_ascii_case(kind.flag()) {
                names.push(caps["name"].to_string());
            }
        }
    }
    names
}

/// Collects the format names supported in `direction` from a `-formats` listing.
///
/// Names are split on commas and deduplicated, keeping first-seen order.
pub fn parse_formats<I, S>(lines: I, direction: FormatDirection) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = Vec::new();
    let mut header_found = false;
    let mut in_table = false;

    for line in lines {
        let line = line.as_ref();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !header_found {
            header_found = trimmed == "File formats:" || trimmed == "Formats:";
        } else if !in_table {
            in_table = trimmed.chars().all(|c| c == '-');
        } else {
            let Some(caps) = FORMAT_RE.captures(line) else {
                break;
            };
            let supported = match direction {
                FormatDirection::Encoding => &caps["mux"] == "E",
                FormatDirection::Decoding => &caps["demux"] == "D",
            };
            if !supported {
                continue;
            }
            for name in caps["names"].split(',').map(str::trim) {
                if !name.is_empty() && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 S..... = Subtitle
 ------
 V....D a64multi             Multicolor charset for Commodore 64 (codec a64_multi)
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codec h264)
 A....D aac                  AAC (Advanced Audio Coding)
 A....D libmp3lame           libmp3lame MP3 (MPEG audio layer 3) (codec mp3)
 S..... srt                  SubRip subtitle
";

    const FORMATS: &str = "\
File formats:
 D. = Demuxing supported
 .E = Muxing supported
 --
 D  3dostr          3DO STR
  E 3g2             3GP2 (3GPP2 file format)
 DE matroska,webm   Matroska / WebM
  E webm            WebM
";

    #[test]
    fn test_parse_audio_encoders() {
        let names = parse_coders(ENCODERS.lines(), CoderDirection::Encoders, MediaKind::Audio);
        assert_eq!(names, vec!["aac", "libmp3lame"]);
    }

    #[test]
    fn test_parse_video_encoders() {
        let names = parse_coders(ENCODERS.lines(), CoderDirection::Encoders, MediaKind::Video);
        assert_eq!(names, vec!["a64multi", "libx264"]);
    }

    #[test]
    fn test_wrong_header_yields_nothing() {
        let names = parse_coders(ENCODERS.lines(), CoderDirection::Decoders, MediaKind::Audio);
        assert!(names.is_empty());
    }

    #[test]
    fn test_parse_encoding_formats_deduplicates() {
        let names = parse_formats(FORMATS.lines(), FormatDirection::Encoding);
        assert_eq!(names, vec!["3g2", "matroska", "webm"]);
    }

    #[test]
    fn test_parse_decoding_formats() {
        let names = parse_formats(FORMATS.lines(), FormatDirection::Decoding);
        assert_eq!(names, vec!["3dostr", "matroska", "webm"]);
    }
}
