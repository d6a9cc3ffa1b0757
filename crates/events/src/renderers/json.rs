//! JSON renderer for stepwise events.
//!
//! Renders events as JSON lines for machine consumption.

#![allow(clippy::print_stdout)]

use crate::channel::EventReceiver;
use crate::event::StepwiseEvent;

/// JSON renderer that outputs events as JSON lines.
#[derive(Debug, Default)]
pub struct JsonRenderer {
    pretty: bool,
}

impl JsonRenderer {
    /// Create a new JSON renderer with compact output.
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// Create a new JSON renderer with pretty-printed output.
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Consume events until the run shuts down.
    pub async fn run(self, mut receiver: EventReceiver) {
        while let Some(event) = receiver.recv().await {
            self.render(&event);
        }
    }

    /// Render a single event as JSON.
    pub fn render(&self, event: &StepwiseEvent) {
        if let Some(json) = self.to_json(event) {
            println!("{json}");
        }
    }

    /// Serialized form of an event.
    #[must_use]
    pub fn to_json(&self, event: &StepwiseEvent) -> Option<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(event)
        } else {
            serde_json::to_string(event)
        };
        json.ok()
    }
}
