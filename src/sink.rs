use tokio::sync::mpsc;

/// Destination of one request's output.
///
/// Receives zero or more ordered chunks, then exactly one terminal call.
pub trait Sink: Send {
    fn on_chunk(&mut self, text: &str);

    fn on_complete(&mut self, full_text: &str);

    fn on_error(&mut self, message: &str);

    fn on_cancelled(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Chunk(String),
    Complete(String),
    Error(String),
    Cancelled,
}

impl SinkEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SinkEvent::Chunk(_))
    }
}

/// Forwards sink calls to a channel, for consumers living on another task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, ev: SinkEvent) {
        if self.tx.send(ev).is_err() {
            tracing::debug!("sink receiver dropped");
        }
    }
}

impl Sink for ChannelSink {
    fn on_chunk(&mut self, text: &str) {
        self.send(SinkEvent::Chunk(text.to_string()));
    }

    fn on_complete(&mut self, full_text: &str) {
        self.send(SinkEvent::Complete(full_text.to_string()));
    }

    fn on_error(&mut self, message: &str) {
        self.send(SinkEvent::Error(message.to_string()));
    }

    fn on_cancelled(&mut self) {
        self.send(SinkEvent::Cancelled);
    }
}
