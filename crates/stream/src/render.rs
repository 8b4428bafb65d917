use snafu::Snafu;
use tokio::sync::watch;

use crate::event::StreamEvent;

/// Visible output of one stream: a status line and an append-only body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSink {
    pub accumulated_text: String,
    pub status_text: String,
    pub status_visible: bool,
}

impl RenderSink {
    /// Applies one event and reports whether anything visible changed.
    pub fn apply(&mut self, event: &StreamEvent) -> bool {
        if event.kind.is_status() {
            let changed = !self.status_visible || self.status_text != event.text;
            self.set_status(&event.text);
            changed
        } else {
            self.accumulated_text.push_str(&event.text);
            !event.text.is_empty()
        }
    }

    fn set_status(&mut self, text: &str) {
        self.status_text.clear();
        self.status_text.push_str(text);
        self.status_visible = true;
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("render sink has no attached viewer on `{stage}`"))]
pub struct DetachedSink {
    stage: &'static str,
}

/// Read-only view of a [`RenderSink`] owned by an [`IncrementalRenderer`].
#[derive(Debug, Clone)]
pub struct SinkHandle {
    receiver: watch::Receiver<RenderSink>,
}

impl SinkHandle {
    pub fn snapshot(&self) -> RenderSink {
        self.receiver.borrow().clone()
    }

    /// Runs `read` against the current sink without cloning it.
    pub fn read<R>(&self, read: impl FnOnce(&RenderSink) -> R) -> R {
        read(&self.receiver.borrow())
    }

    /// Marks the current value as seen and runs `read` against it.
    pub fn read_and_mark_seen<R>(&mut self, read: impl FnOnce(&RenderSink) -> R) -> R {
        read(&self.receiver.borrow_and_update())
    }

    /// Waits for the next visible change; `false` once the renderer is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

/// Single writer of one stream's [`RenderSink`].
///
/// Every batch is applied under one notification, so viewers observe whole chunks.
#[derive(Debug)]
pub struct IncrementalRenderer {
    sink_tx: watch::Sender<RenderSink>,
}

impl IncrementalRenderer {
    /// Creates a renderer with an empty placeholder sink and its first viewer.
    pub fn new() -> (Self, SinkHandle) {
        let (sink_tx, receiver) = watch::channel(RenderSink::default());
        (Self { sink_tx }, SinkHandle { receiver })
    }

    pub fn subscribe(&self) -> SinkHandle {
        SinkHandle {
            receiver: self.sink_tx.subscribe(),
        }
    }

    pub fn apply(&self, event: &StreamEvent) -> Result<(), DetachedSink> {
        self.apply_batch(std::slice::from_ref(event))
    }

    pub fn apply_batch(&self, events: &[StreamEvent]) -> Result<(), DetachedSink> {
        self.ensure_attached("render-apply")?;
        if events.is_empty() {
            return Ok(());
        }

        self.sink_tx.send_if_modified(|sink| {
            events
                .iter()
                .fold(false, |changed, event| sink.apply(event) || changed)
        });
        Ok(())
    }

    /// Replaces the status line with a terminal message such as a failure notice.
    pub fn write_terminal_status(&self, text: &str) -> Result<(), DetachedSink> {
        self.ensure_attached("render-terminal-status")?;
        self.sink_tx.send_modify(|sink| sink.set_status(text));
        Ok(())
    }

    pub fn snapshot(&self) -> RenderSink {
        self.sink_tx.borrow().clone()
    }

    fn ensure_attached(&self, stage: &'static str) -> Result<(), DetachedSink> {
        if self.sink_tx.is_closed() {
            return DetachedSinkSnafu { stage }.fail();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn event(kind: EventKind, text: &str) -> StreamEvent {
        StreamEvent::new(kind, text)
    }

    #[test]
    fn starts_as_empty_hidden_placeholder() {
        let (_renderer, sink) = IncrementalRenderer::new();
        assert_eq!(sink.snapshot(), RenderSink::default());
    }

    #[test]
    fn body_is_concatenation_of_body_kinds_only() {
        let (renderer, sink) = IncrementalRenderer::new();
        let events = [
            event(EventKind::Start, "thinking"),
            event(EventKind::Delta, "Hel"),
            event(EventKind::UserEcho, "hi"),
            event(EventKind::Unknown, "lo"),
            event(EventKind::Complete, "done"),
            event(EventKind::Raw, " <raw>"),
        ];

        for event in &events {
            renderer.apply(event).unwrap();
        }

        let expected = events
            .iter()
            .filter(|event| event.kind.is_body())
            .map(|event| event.text.as_str())
            .collect::<String>();
        assert_eq!(sink.snapshot().accumulated_text, expected);
        assert_eq!(expected, "Hello <raw>");
    }

    #[test]
    fn status_tracks_latest_status_event_and_ignores_deltas() {
        let (renderer, sink) = IncrementalRenderer::new();

        renderer
            .apply_batch(&[
                event(EventKind::Start, "thinking"),
                event(EventKind::UserEcho, "accepted"),
                event(EventKind::Delta, "body"),
            ])
            .unwrap();

        let snapshot = sink.snapshot();
        assert!(snapshot.status_visible);
        assert_eq!(snapshot.status_text, "accepted");

        renderer.apply(&event(EventKind::Complete, "done")).unwrap();
        renderer.apply(&event(EventKind::Raw, "tail")).unwrap();

        let snapshot = sink.snapshot();
        assert!(snapshot.status_visible);
        assert_eq!(snapshot.status_text, "done");
        assert_eq!(snapshot.accumulated_text, "bodytail");
    }

    #[test]
    fn terminal_status_keeps_body() {
        let (renderer, sink) = IncrementalRenderer::new();
        renderer.apply(&event(EventKind::Delta, "partial")).unwrap();
        renderer.write_terminal_status("error receiving response").unwrap();

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.accumulated_text, "partial");
        assert_eq!(snapshot.status_text, "error receiving response");
        assert!(snapshot.status_visible);
    }

    #[test]
    fn dropping_every_viewer_detaches_the_sink() {
        let (renderer, sink) = IncrementalRenderer::new();
        let second = renderer.subscribe();
        drop(sink);
        assert!(renderer.apply(&event(EventKind::Delta, "x")).is_ok());

        drop(second);
        assert!(renderer.apply(&event(EventKind::Delta, "y")).is_err());
        assert!(renderer.write_terminal_status("gone").is_err());
        assert_eq!(renderer.snapshot().accumulated_text, "x");
    }

    #[tokio::test]
    async fn viewers_are_notified_once_per_batch() {
        let (renderer, mut sink) = IncrementalRenderer::new();
        sink.read_and_mark_seen(|_| ());

        renderer
            .apply_batch(&[
                event(EventKind::Delta, "a"),
                event(EventKind::Delta, "b"),
            ])
            .unwrap();

        assert!(sink.changed().await);
        assert_eq!(sink.read_and_mark_seen(|s| s.accumulated_text.clone()), "ab");

        // An empty delta changes nothing visible.
        renderer.apply(&event(EventKind::Delta, "")).unwrap();
        drop(renderer);
        assert!(!sink.changed().await);
    }
}
