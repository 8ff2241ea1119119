use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::event::ProgressListener;

/// Splits a telemetry line into `key=value` pairs.
static PROGRESS_INFO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(\w+)\s*=\s*(\S+)\s*").expect("BUG: Failed to compile progress info regex")
});

const ABORT_PROMPT: &str = "Press [q]";
const WARNING_PREFIX: &str = "WARNING: ";
const QUEUE_BACKWARD_WARNING: &str = "Queue input is backward in time";
const NON_MONOTONIC_DTS_WARNING: &str =
    "Application provided invalid, non monotonically increasing dts to muxer in stream";

/// Whether `line` is one of the periodic status lines ffmpeg prints while encoding.
pub(crate) fn is_telemetry_line(line: &str) -> bool {
    line.starts_with("frame=") || line.starts_with("size=")
}

/// The section of ffmpeg's output a conversion has reached. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnalyzerState {
    BeforeInput,
    InputHeader,
    StreamMapping,
    OutputHeader,
    Progress,
}

/// Interprets the stderr output of one conversion, line by line.
///
/// Warnings are forwarded to the listener, telemetry lines become progress
/// percentages, and top-level lines nothing recognizes are kept for
/// [`unhandled_messages`](Self::unhandled_messages).
pub struct ConversionAnalyzer<'a> {
    duration_millis: i64,
    listener: &'a dyn ProgressListener,
    state: AnalyzerState,
    line_number: usize,
    unhandled_messages: Vec<String>,
    last_warning: Option<String>,
    last_progress: Option<u8>,
}

impl<'a> ConversionAnalyzer<'a> {
    /// Creates an analyzer for a conversion expected to produce
    /// `duration_millis` of output. A non-positive duration disables
    /// percentage reporting.
    pub fn new(duration_millis: i64, listener: &'a dyn ProgressListener) -> Self {
        Self {
            duration_millis,
            listener,
            state: AnalyzerState::BeforeInput,
            line_number: 0,
            unhandled_messages: Vec::new(),
            last_warning: None,
            last_progress: None,
        }
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    /// Lines that matched nothing in the state they arrived in.
    pub fn unhandled_messages(&self) -> &[String] {
        &self.unhandled_messages
    }

    pub fn into_unhandled_messages(self) -> Vec<String> {
        self.unhandled_messages
    }

    /// The last warning forwarded since the most recent telemetry line.
    pub fn last_warning(&self) -> Option<&str> {
        self.last_warning.as_deref()
    }

    pub fn analyze_line(&mut self, line: &str) {
        self.line_number += 1;
        debug!(line_number = self.line_number, line = %line, "ffmpeg output");

        if line.starts_with(WARNING_PREFIX) {
            self.forward_warning(line);
        }
        if line.starts_with(ABORT_PROMPT) {
            return;
        }

        let telemetry = is_telemetry_line(line);
        match self.state {
            AnalyzerState::BeforeInput => {
                if line.starts_with("Input #0") {
                    self.state = AnalyzerState::InputHeader;
                }
            }
            AnalyzerState::InputHeader => {
                if line.starts_with("Stream mapping:") || line.starts_with("Output #0") {
                    self.state = AnalyzerState::StreamMapping;
                } else if !telemetry && !line.starts_with("  ") {
                    self.record_unhandled(line);
                }
            }
            AnalyzerState::StreamMapping => {
                if line.starts_with("Output #0") || line.starts_with("Stream mapping:") {
                    self.state = AnalyzerState::OutputHeader;
                } else if !telemetry && !line.starts_with("  ") {
                    self.record_unhandled(line);
                }
            }
            AnalyzerState::OutputHeader => {
                if line.starts_with("  ") || telemetry {
                    // Output details and progress.
                } else if line.starts_with("video:") {
                    self.state = AnalyzerState::Progress;
                } else if line.ends_with(QUEUE_BACKWARD_WARNING) || line.contains(NON_MONOTONIC_DTS_WARNING) {
                    // Not fatal on their own; a fatal case is followed by the real error.
                    self.forward_warning(line);
                } else {
                    self.record_unhandled(line);
                }
            }
            AnalyzerState::Progress => {}
        }

        if telemetry {
            self.handle_telemetry(line.trim());
        }
    }

    fn forward_warning(&mut self, line: &str) {
        self.listener.on_message(line);
        self.last_warning = Some(line.to_string());
    }

    fn record_unhandled(&mut self, line: &str) {
        info!(
            state = ?self.state,
            line_number = self.line_number,
            message = %line,
            "Unhandled ffmpeg message"
        );
        self.unhandled_messages.push(line.to_string());
    }

    fn handle_telemetry(&mut self, line: &str) {
        let sample = parse_progress_info(line);
        if let Some(time) = sample.get("time") {
            match parse_time(time) {
                Ok(seconds) => self.report_progress(seconds),
                Err(reason) => {
                    warn!(line = %line, reason = %reason, "Error in progress parsing");
                    return;
                }
            }
        }
        self.last_warning = None;
    }

    fn report_progress(&mut self, seconds: f64) {
        if self.duration_millis <= 0 {
            return;
        }
        let percentage = percentage(seconds, self.duration_millis);
        let percentage = self.last_progress.map_or(percentage, |last| last.max(percentage));
        self.last_progress = Some(percentage);
        self.listener.on_progress(percentage);
    }
}

/// Maps every `key=value` pair of a telemetry line, keys lowercased.
fn parse_progress_info(line: &str) -> HashMap<String, String> {
    PROGRESS_INFO_RE
        .captures_iter(line)
        .map(|caps| (caps[1].to_ascii_lowercase(), caps[2].to_string()))
        .collect()
}

/// Parses `[[HH:]MM:]SS[.frac]` into seconds.
fn parse_time(time: &str) -> Result<f64, String> {
    let parts: Vec<&str> = time.split(':').collect();
    if parts.len() > 3 {
        return Err(format!("too many components in time '{time}'"));
    }
    parts.iter().try_fold(0.0, |total, part| {
        part.parse::<f64>()
            .map(|value| total * 60.0 + value)
            .map_err(|e| format!("invalid time component '{part}': {e}"))
    })
}

/// Rounds elapsed microseconds per millisecond of duration, then truncates by ten.
fn percentage(seconds: f64, duration_millis: i64) -> u8 {
    let per_mille = (seconds * 1_000_000.0 / duration_millis as f64).round() as i64;
    (per_mille / 10).clamp(0, 100) as u8
}
