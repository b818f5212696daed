//! Tracing setup for the daemon (§SPEC_FULL ambient stack). Honors
//! `RUST_LOG`; defaults to `info` so a plain `dullahand` run isn't silent.
//!
//! In addition to the usual stderr formatter, every event is mirrored into
//! the debug pane (pane id 0, §SPEC_FULL debug pane) so a client attached
//! to it sees the daemon's own log stream as terminal output.

use std::fmt::Write as _;
use std::sync::Arc;

use dullahan_core::notify_pipe::NotifyPipe;
use dullahan_core::pane::Pane;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub fn init(debug_pane: Arc<Pane>, notify: Arc<NotifyPipe>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let debug_pane_layer = DebugPaneLayer { debug_pane, notify };
    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(debug_pane_layer)
        .init();
}

struct DebugPaneLayer {
    debug_pane: Arc<Pane>,
    notify: Arc<NotifyPipe>,
}

impl<S: tracing::Subscriber> Layer<S> for DebugPaneLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = MessageVisitor::default();
        event.record(&mut message);
        let meta = event.metadata();
        let mut line = format!("{:>5} {}", meta.level(), meta.target());
        if !message.text.is_empty() {
            let _ = write!(line, ": {}", message.text);
        }
        line.push_str("\r\n");
        if self.debug_pane.feed(line.as_bytes()).is_ok() {
            self.notify.signal();
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    text: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.text = format!("{:?}", value);
        }
    }
}
