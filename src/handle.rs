use crate::event::ConversionEvent;
use async_stream::stream;
use futures::Stream;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A handle to a conversion started with [`Converter::start`](crate::Converter::start).
///
/// This struct provides two key functionalities:
/// 1.  An async stream of `ConversionEvent`s reported by the conversion.
/// 2.  `abort()` to stop it early.
///
/// Dropping the handle does not stop the conversion.
#[derive(Debug)]
pub struct ConversionHandle {
    /// Cancels this conversion only, even while it waits behind others.
    pub(crate) cancel: CancellationToken,
    /// The receiver for events from the conversion task.
    pub(crate) event_rx: mpsc::UnboundedReceiver<ConversionEvent>,
    pub(crate) task: JoinHandle<()>,
}

impl ConversionHandle {
    /// Kills the ffmpeg process and ends the conversion with
    /// [`Completion::Aborted`](crate::Completion::Aborted).
    ///
    /// A conversion still waiting for its turn is aborted before ffmpeg is
    /// started. Calling this after the conversion finished has no effect.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Whether the conversion task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Returns an async stream of `ConversionEvent`s from the running conversion.
    ///
    /// The stream ends after the final `Completed` or `Failed` event.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use ffconvert::{ConversionEvent, FFmpeg, MediaSource};
    /// # use futures::StreamExt;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let ffmpeg = FFmpeg::new().await?;
    /// let converter = ffmpeg.converter().video_codec("libx264").build();
    /// let mut handle = converter.start(vec![MediaSource::from("in.mkv")], "out.mp4");
    /// while let Some(event) = handle.events().next().await {
    ///     match event {
    ///         ConversionEvent::Progress(p) => println!("Progress: {p}%"),
    ///         ConversionEvent::Completed(_) | ConversionEvent::Failed(_) => break,
    ///         _ => {}
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn events(&mut self) -> Pin<Box<impl Stream<Item = ConversionEvent> + '_>> {
        let s = stream! {
            while let Some(event) = self.event_rx.recv().await {
                yield event;
            }
        };
        Box::pin(s)
    }
}
