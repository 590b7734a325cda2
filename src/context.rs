use crate::error::PipelineError;
use crate::sink::Sink;
use crate::transport::TransportHandle;
use tempfile::NamedTempFile;

/// Terminal result of one request.
#[derive(Debug)]
pub enum Outcome {
    Completed(String),
    Failed(PipelineError),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Active,
    Completed,
    Failed,
    Cancelled,
}

/// Per-request state: the sink, the text delivered so far, and the
/// resources (transport, staged body) that must be released on every path.
///
/// Consumed by [`StreamContext::finish`], so a context can never deliver two
/// terminal calls or be reused for another request.
pub struct StreamContext {
    sink: Box<dyn Sink>,
    accumulated: String,
    chunks: usize,
    pub(crate) transport: Option<TransportHandle>,
    staging: Option<NamedTempFile>,
    state: TerminalState,
}

impl StreamContext {
    pub fn new(sink: Box<dyn Sink>) -> Self {
        Self {
            sink,
            accumulated: String::new(),
            chunks: 0,
            transport: None,
            staging: None,
            state: TerminalState::Active,
        }
    }

    pub fn attach(&mut self, transport: TransportHandle, staging: NamedTempFile) {
        self.transport = Some(transport);
        self.staging = Some(staging);
    }

    /// Append a chunk and hand it to the sink, in arrival order.
    pub fn deliver(&mut self, text: String) {
        if text.is_empty() || self.state != TerminalState::Active {
            return;
        }
        self.sink.on_chunk(&text);
        self.accumulated.push_str(&text);
        self.chunks += 1;
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn state(&self) -> TerminalState {
        self.state
    }

    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.release();
        }
        if let Some(staging) = self.staging.take() {
            let path = staging.path().to_path_buf();
            if let Err(e) = staging.close() {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove staged request body");
            }
        }
    }

    /// Release resources, run `on_released`, then make the single terminal call.
    pub fn finish(mut self, outcome: Outcome, on_released: impl FnOnce()) -> Outcome {
        self.state = match &outcome {
            Outcome::Completed(_) => TerminalState::Completed,
            Outcome::Failed(_) => TerminalState::Failed,
            Outcome::Cancelled => TerminalState::Cancelled,
        };
        self.release();
        on_released();
        match &outcome {
            Outcome::Completed(text) => self.sink.on_complete(text),
            Outcome::Failed(err) => self.sink.on_error(&err.to_string()),
            Outcome::Cancelled => self.sink.on_cancelled(),
        }
        outcome
    }
}

impl Drop for StreamContext {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{ChannelSink, SinkEvent};

    #[test]
    fn chunks_accumulate_in_order_and_empty_ones_are_dropped() {
        let (sink, mut rx) = ChannelSink::new();
        let mut ctx = StreamContext::new(Box::new(sink));
        ctx.deliver("Hel".into());
        ctx.deliver(String::new());
        ctx.deliver("lo".into());
        assert_eq!(ctx.accumulated(), "Hello");
        assert_eq!(ctx.chunk_count(), 2);

        assert_eq!(ctx.state(), TerminalState::Active);
        let text = ctx.accumulated().to_string();
        let mut released = false;
        let outcome = ctx.finish(Outcome::Completed(text), || released = true);
        assert!(released);
        assert!(matches!(outcome, Outcome::Completed(ref t) if t == "Hello"));

        assert_eq!(rx.try_recv().unwrap(), SinkEvent::Chunk("Hel".into()));
        assert_eq!(rx.try_recv().unwrap(), SinkEvent::Chunk("lo".into()));
        assert_eq!(rx.try_recv().unwrap(), SinkEvent::Complete("Hello".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn finishing_deletes_the_staged_body() {
        let (sink, _rx) = ChannelSink::new();
        let mut ctx = StreamContext::new(Box::new(sink));
        let staged = NamedTempFile::new().unwrap();
        let path = staged.path().to_path_buf();
        ctx.staging = Some(staged);
        ctx.finish(Outcome::Cancelled, || {});
        assert!(!path.exists());
    }
}
