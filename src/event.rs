use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::media::MediaDescription;

/// How a conversion ended.
///
/// Only `Completed` and `Aborted` are ever passed to
/// [`ProgressListener::on_complete`]. A failed conversion is reported through
/// [`ProgressListener::on_error`] alone; `Error` exists for its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Completion {
    Completed,
    Aborted,
    Error,
}

impl Completion {
    /// The numeric completion code: 0 for success, 1 for abort, -1 for error.
    pub fn code(&self) -> i32 {
        match self {
            Completion::Completed => 0,
            Completion::Aborted => 1,
            Completion::Error => -1,
        }
    }
}

/// Receives the lifecycle of one conversion.
///
/// Every method has an empty default, so implementors only override what
/// they care about. Calls arrive on the task running the conversion.
pub trait ProgressListener: Send + Sync {
    /// Called once before any output line is analyzed, with the source
    /// description when one could be obtained.
    fn on_start(&self, _description: Option<&MediaDescription>) {}

    /// Called with the completion percentage, 0 to 100.
    fn on_progress(&self, _percentage: u8) {}

    /// Called with warnings ffmpeg printed along the way.
    fn on_message(&self, _message: &str) {}

    /// Called once when the conversion completed or was aborted.
    fn on_complete(&self, _completion: Completion) {}

    /// Called once when the conversion failed, instead of `on_complete`.
    fn on_error(&self, _error: &Error) {}
}

/// A listener that ignores everything.
impl ProgressListener for () {}

/// An event emitted by a started conversion.
#[derive(Debug, Clone)]
pub enum ConversionEvent {
    /// The conversion began; carries the source description when available.
    Started(Option<MediaDescription>),
    /// A completion percentage, 0 to 100.
    Progress(u8),
    /// A warning printed by ffmpeg.
    Message(String),
    /// The conversion finished, successfully or by abort.
    Completed(Completion),
    /// The conversion failed.
    Failed(ConversionFailure),
}

/// Details of a conversion failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionFailure {
    /// A message describing the failure.
    pub message: String,
    /// The exit code of the ffmpeg process, if it got that far.
    pub exit_code: Option<i32>,
}

impl From<&Error> for ConversionFailure {
    fn from(error: &Error) -> Self {
        Self {
            message: error.to_string(),
            exit_code: error.exit_code(),
        }
    }
}

/// Forwards listener calls into a channel of [`ConversionEvent`]s.
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<ConversionEvent>,
}

impl EventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ConversionEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: ConversionEvent) {
        // The receiver is gone once the caller drops its handle; nothing left to notify.
        let _ = self.tx.send(event);
    }
}

impl ProgressListener for EventSender {
    fn on_start(&self, description: Option<&MediaDescription>) {
        self.send(ConversionEvent::Started(description.cloned()));
    }

    fn on_progress(&self, percentage: u8) {
        self.send(ConversionEvent::Progress(percentage));
    }

    fn on_message(&self, message: &str) {
        self.send(ConversionEvent::Message(message.to_string()));
    }

    fn on_complete(&self, completion: Completion) {
        self.send(ConversionEvent::Completed(completion));
    }

    fn on_error(&self, error: &Error) {
        self.send(ConversionEvent::Failed(error.into()));
    }
}
