//! Run-scoped event channel.
//!
//! Each invocation renders its events exactly once, so the tracing layer and
//! the renderer share a single unbounded channel. Delivery ends with the
//! `system.shutdown` event: the receiver yields it and then reports the run
//! as finished, even though the global subscriber keeps its sender alive.

use crate::event::StepwiseEvent;
use tokio::sync::mpsc;

/// Create the channel for one run.
///
/// The sender goes to [`StepwiseEventLayer`](crate::StepwiseEventLayer), the
/// receiver to a renderer.
#[must_use]
pub fn event_channel() -> (mpsc::UnboundedSender<StepwiseEvent>, EventReceiver) {
    let (sender, inner) = mpsc::unbounded_channel();
    (
        sender,
        EventReceiver {
            inner,
            finished: false,
        },
    )
}

/// Receiving end of [`event_channel`].
#[derive(Debug)]
pub struct EventReceiver {
    inner: mpsc::UnboundedReceiver<StepwiseEvent>,
    finished: bool,
}

impl EventReceiver {
    /// Next event of the run.
    ///
    /// Returns `None` after the shutdown event has been handed out, or once
    /// every sender is gone.
    pub async fn recv(&mut self) -> Option<StepwiseEvent> {
        if self.finished {
            return None;
        }
        let event = self.inner.recv().await;
        self.finished = event.as_ref().is_none_or(StepwiseEvent::is_shutdown);
        event
    }

    /// Whether the run has shut down.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }
}
