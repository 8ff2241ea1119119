//! Test fixture that stands in for ffmpeg with a small shell script.
//!
//! The script answers `-version` and the `-i <source> -hide_banner` probe the
//! same way every time; the conversion part is supplied per test.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ffconvert::{Completion, Error, MediaDescription, ProgressListener};
use tempfile::TempDir;

const PREAMBLE: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  echo "ffmpeg version 6.1-fake Copyright (c) 2000-2023 the FFmpeg developers"
  echo "built with gcc 12"
  exit 0
fi
if [ "$#" -eq 3 ] && [ "$1" = "-i" ]; then
  cat >&2 <<EOF
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from '$2':
  Metadata:
    major_brand     : isom
  Duration: 00:00:20.00, start: 0.000000, bitrate: 1205 kb/s
    Stream #0:0(und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1280x720, 1070 kb/s, 24 fps, 24 tbr, 12288 tbn (default)
    Stream #0:1(und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 128 kb/s (default)
At least one output file must be specified
EOF
  exit 1
fi
"#;

/// Conversion output of a short successful run, as ffmpeg prints it on stderr.
pub const CONVERSION_TRANSCRIPT: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':
  Duration: 00:00:20.00, start: 0.000000, bitrate: 1205 kb/s
Stream mapping:
  Stream #0:0 -> #0:0 (h264 (native) -> h264 (libx264))
Press [q] to stop, [?] for help
Output #0, mp4, to 'out.mp4':
  Metadata:
    encoder         : Lavf60.16.100
frame=120 fps=24 time=00:00:05.00 bitrate=128kbit/s
video:1024kB audio:128kB subtitle:0kB other streams:0kB global headers:0kB muxing overhead: 0.5%
";

pub struct FakeFFmpeg {
    pub dir: TempDir,
    pub executable: PathBuf,
    pub input: PathBuf,
}

impl FakeFFmpeg {
    /// Writes a fake ffmpeg whose conversion runs `conversion` (shell code)
    /// and an empty input file for it to "convert".
    pub fn new(conversion: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let executable = dir.path().join("ffmpeg");
        fs::write(&executable, format!("{PREAMBLE}{conversion}\n")).unwrap();
        fs::set_permissions(&executable, fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("in.mp4");
        fs::write(&input, b"").unwrap();

        Self { dir, executable, input }
    }

    /// A fake whose conversion prints `transcript` on stderr and exits with `exit_code`.
    pub fn printing(transcript: &str, exit_code: i32) -> Self {
        Self::new(&format!("cat >&2 <<'EOF'\n{transcript}EOF\nexit {exit_code}"))
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        Path::new(&self.path(name)).exists()
    }
}

/// Everything a listener was told, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Start(Option<MediaDescription>),
    Progress(u8),
    Message(String),
    Complete(Completion),
    Error(String),
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Recorded>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressListener for Recorder {
    fn on_start(&self, description: Option<&MediaDescription>) {
        self.push(Recorded::Start(description.cloned()));
    }

    fn on_progress(&self, percentage: u8) {
        self.push(Recorded::Progress(percentage));
    }

    fn on_message(&self, message: &str) {
        self.push(Recorded::Message(message.to_string()));
    }

    fn on_complete(&self, completion: Completion) {
        self.push(Recorded::Complete(completion));
    }

    fn on_error(&self, error: &Error) {
        self.push(Recorded::Error(error.to_string()));
    }
}
