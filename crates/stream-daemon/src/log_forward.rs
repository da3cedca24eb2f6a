//! Tracing layer that copies warnings and errors to control clients.
use std::fmt::Write as _;

use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::BroadcastMessage;

pub struct ClientLogLayer {
    sender: broadcast::Sender<BroadcastMessage>,
    /// Most verbose level forwarded.
    max_level: Level,
}

impl ClientLogLayer {
    pub fn new(sender: broadcast::Sender<BroadcastMessage>) -> Self {
        Self {
            sender,
            max_level: Level::WARN,
        }
    }
}

/// Message and fields of one event, collected before formatting.
#[derive(Default)]
struct EventText {
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl EventText {
    fn render(&self) -> String {
        let mut out = self.message.clone();
        for (name, value) in &self.fields {
            let _ = write!(out, " {}={}", name, value);
        }
        out
    }
}

impl Visit for EventText {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push((field.name(), format!("{:?}", value)));
        }
    }
}

/// One log line as clients see it: local time, level, originating module.
fn log_line(time: &str, level: &Level, target: &str, text: &str) -> String {
    let module = target.rsplit("::").next().unwrap_or(target);
    format!("{} [{}] {}: {}", time, level, module, text)
}

impl<S: Subscriber> Layer<S> for ClientLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.max_level {
            return;
        }

        let mut text = EventText::default();
        event.record(&mut text);
        let time = chrono::Local::now().format("%H:%M:%S").to_string();
        let line = log_line(&time, meta.level(), meta.target(), &text.render());

        // nobody listening is fine
        let _ = self.sender.send(BroadcastMessage::Log(line));
    }
}
