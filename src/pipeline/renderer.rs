//! Renderer collaborators
//!
//! A renderer receives a snapshot of the live window on every render tick.
//! The shipped renderers are headless; a plotting front end implements the
//! same trait.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::buffer::Snapshot;
use crate::types::ChannelSet;

/// Consumer of live-window snapshots.
pub trait Renderer: Send {
    /// Channels to include in the next snapshot.
    fn enabled_channels(&self) -> ChannelSet;

    fn render(&mut self, snapshot: &Snapshot);
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn enabled_channels(&self) -> ChannelSet {
        (**self).enabled_channels()
    }

    fn render(&mut self, snapshot: &Snapshot) {
        (**self).render(snapshot);
    }
}

// ============================================================================
// Log Renderer
// ============================================================================

/// Logs a one-line summary of the window, at most once per `every`.
pub struct LogRenderer {
    channels: ChannelSet,
    every: Duration,
    last: Option<Instant>,
}

impl LogRenderer {
    pub fn new(channels: ChannelSet) -> Self {
        Self {
            channels,
            every: Duration::from_secs(1),
            last: None,
        }
    }

    pub fn with_interval(mut self, every: Duration) -> Self {
        self.every = every;
        self
    }

    pub fn set_channel(&mut self, channel: crate::types::Channel, enabled: bool) {
        self.channels.set(channel, enabled);
    }
}

impl Renderer for LogRenderer {
    fn enabled_channels(&self) -> ChannelSet {
        self.channels
    }

    fn render(&mut self, snapshot: &Snapshot) {
        let now = Instant::now();
        if self.last.is_some_and(|t| now.duration_since(t) < self.every) {
            return;
        }
        self.last = Some(now);

        let latest: Vec<String> = snapshot
            .series
            .iter()
            .filter_map(|s| s.values.last().map(|v| format!("{}={v:.2}", s.channel.name())))
            .collect();
        tracing::info!(
            samples = snapshot.len(),
            span_ms = snapshot.span_ms(),
            "📈 {}",
            latest.join(" ")
        );
    }
}

// ============================================================================
// JSON Lines Renderer
// ============================================================================

/// Writes each snapshot as one JSON object per line.
pub struct JsonLinesRenderer<W> {
    writer: W,
    channels: ChannelSet,
    failed: bool,
}

impl<W: Write + Send> JsonLinesRenderer<W> {
    pub fn new(writer: W, channels: ChannelSet) -> Self {
        Self {
            writer,
            channels,
            failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_snapshot(&mut self, snapshot: &Snapshot) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl<W: Write + Send> Renderer for JsonLinesRenderer<W> {
    fn enabled_channels(&self) -> ChannelSet {
        self.channels
    }

    fn render(&mut self, snapshot: &Snapshot) {
        // A closed consumer (e.g. broken pipe) is reported once
        if self.failed {
            return;
        }
        if let Err(e) = self.write_snapshot(snapshot) {
            tracing::warn!(error = %e, "Snapshot output failed, disabling JSON renderer");
            self.failed = true;
        }
    }
}

// ============================================================================
// Null Renderer
// ============================================================================

/// Discards snapshots. Requests no channels so snapshots stay cheap.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn enabled_channels(&self) -> ChannelSet {
        ChannelSet::empty()
    }

    fn render(&mut self, _snapshot: &Snapshot) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::WindowedBuffer;
    use crate::types::{Channel, Record};

    fn snapshot(channels: ChannelSet) -> Snapshot {
        let mut buffer = WindowedBuffer::new(10_000.0);
        for t in [1.0, 2.0] {
            buffer.append(&Record::from_fields([t, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]));
        }
        buffer.snapshot(&channels)
    }

    #[test]
    fn test_json_lines_renderer_output() {
        let mut channels = ChannelSet::empty();
        channels.insert(Channel::Pressure1);
        let mut renderer = JsonLinesRenderer::new(Vec::new(), channels);

        renderer.render(&snapshot(renderer.enabled_channels()));
        renderer.render(&snapshot(renderer.enabled_channels()));

        let out = String::from_utf8(renderer.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["timestamps"], serde_json::json!([1.0, 2.0]));
        assert_eq!(value["series"][0]["channel"], "pressure1");
        assert_eq!(value["series"][0]["values"], serde_json::json!([1.0, 1.0]));
    }

    #[test]
    fn test_null_renderer_requests_nothing() {
        let mut renderer: Box<dyn Renderer> = Box::new(NullRenderer);
        assert!(renderer.enabled_channels().is_empty());
        renderer.render(&Snapshot::default());
    }

    #[test]
    fn test_log_renderer_channel_toggle() {
        let mut renderer = LogRenderer::new(ChannelSet::all()).with_interval(Duration::ZERO);
        renderer.set_channel(Channel::FsrLeft, false);
        assert!(!renderer.enabled_channels().contains(Channel::FsrLeft));
        renderer.render(&snapshot(renderer.enabled_channels()));
    }
}
