use crate::config::Timeouts;
use crate::engine::{ExecutionEngine, Outcome};
use crate::error::{PipelineError, Result};
use crate::provider::RequestDescriptor;
use crate::registry::ProviderRegistry;
use crate::request;
use crate::sink::Sink;
use crate::transport::Transport;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct ActiveRequest {
    cancel: Option<oneshot::Sender<()>>,
    generation: u64,
}

type ActiveTable = Arc<Mutex<HashMap<String, ActiveRequest>>>;

/// Result of [`SessionManager::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelStatus {
    Requested,
    /// Cancellation was already requested and the request is winding down.
    AlreadyRequested,
    NoActiveRequest,
}

impl CancelStatus {
    pub fn message(&self) -> &'static str {
        match self {
            CancelStatus::Requested => "cancellation requested",
            CancelStatus::AlreadyRequested => "cancellation already in progress",
            CancelStatus::NoActiveRequest => "no active request",
        }
    }
}

/// Dispatches requests and tracks at most one in-flight request per sink id.
pub struct SessionManager {
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn Transport>,
    timeouts: Timeouts,
    active: ActiveTable,
    generation: AtomicU64,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("registry", &self.registry)
            .field("transport", &self.transport.name())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

/// Completion of one dispatched request.
#[derive(Debug)]
pub struct RequestHandle {
    join: JoinHandle<Outcome>,
}

impl RequestHandle {
    /// Wait for the terminal outcome. The sink has already seen it by then,
    /// unless the task died first.
    pub async fn outcome(self) -> Outcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "request task did not finish");
                Outcome::Failed(PipelineError::TaskFailed(e.to_string()))
            }
        }
    }
}

/// Frees a sink's slot when dropped, including when the request task unwinds.
struct SlotGuard {
    table: ActiveTable,
    key: String,
    generation: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut active = lock(&self.table);
        // A newer request may already own the slot.
        if active.get(&self.key).is_some_and(|r| r.generation == self.generation) {
            active.remove(&self.key);
        }
    }
}

fn lock(table: &Mutex<HashMap<String, ActiveRequest>>) -> MutexGuard<'_, HashMap<String, ActiveRequest>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionManager {
    pub fn new(registry: Arc<ProviderRegistry>, transport: Arc<dyn Transport>, timeouts: Timeouts) -> Self {
        Self {
            registry,
            transport,
            timeouts,
            active: Arc::default(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn is_active(&self, sink_id: &str) -> bool {
        lock(&self.active).contains_key(sink_id)
    }

    /// Start a request for `sink_id` and return without waiting for it.
    ///
    /// Fails with `RequestInProgress`, leaving both sinks untouched, while an
    /// earlier request for the same id is still running. Build failures are
    /// reported to `sink` and returned.
    pub fn send(&self, sink_id: &str, desc: &RequestDescriptor, mut sink: Box<dyn Sink>) -> Result<RequestHandle> {
        let mut active = lock(&self.active);
        if active.contains_key(sink_id) {
            return Err(PipelineError::RequestInProgress);
        }

        let prepared = match request::build(&self.registry, desc) {
            Ok(p) => p,
            Err(e) => {
                drop(active);
                sink.on_error(&e.to_string());
                return Err(e);
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        active.insert(
            sink_id.to_string(),
            ActiveRequest {
                cancel: Some(cancel_tx),
                generation,
            },
        );
        drop(active);

        tracing::debug!(sink = sink_id, provider = %desc.provider, transport = self.transport.name(), "dispatching request");
        let engine = ExecutionEngine::new(prepared, Arc::clone(&self.transport), self.timeouts, sink);
        let slot = SlotGuard {
            table: Arc::clone(&self.active),
            key: sink_id.to_string(),
            generation,
        };
        let join = tokio::spawn(engine.run(cancel_rx, move || drop(slot)));
        Ok(RequestHandle { join })
    }

    /// Ask the request running for `sink_id` to stop.
    pub fn cancel(&self, sink_id: &str) -> CancelStatus {
        let mut active = lock(&self.active);
        let status = match active.get_mut(sink_id) {
            None => CancelStatus::NoActiveRequest,
            Some(req) => match req.cancel.take() {
                Some(tx) => {
                    // A send error means the engine already finished on its own.
                    let _ = tx.send(());
                    CancelStatus::Requested
                }
                None => CancelStatus::AlreadyRequested,
            },
        };
        tracing::debug!(sink = sink_id, status = status.message(), "cancel");
        status
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::tests::{fast_timeouts, registry, ScriptTransport};
    use crate::provider::Message;
    use crate::sink::{ChannelSink, SinkEvent};
    use std::time::Duration;

    const STALL: &str = r#"printf 'HTTP/1.1 200 OK\r\n\r\n'
printf '%s\n\n' 'data: {"choices":[{"delta":{"content":"wait"}}]}'
exec sleep 30"#;

    fn manager(script: &str) -> SessionManager {
        SessionManager::new(
            Arc::new(registry()),
            Arc::new(ScriptTransport(script.to_string())),
            fast_timeouts(),
        )
    }

    fn openai() -> RequestDescriptor {
        RequestDescriptor::new("openai", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn second_request_on_busy_sink_is_refused() {
        let mgr = manager(STALL);
        let (first, mut first_rx) = ChannelSink::new();
        let handle = mgr.send("buf", &openai(), Box::new(first)).unwrap();
        assert_eq!(first_rx.recv().await, Some(SinkEvent::Chunk("wait".into())));

        let (second, mut second_rx) = ChannelSink::new();
        let err = mgr.send("buf", &openai(), Box::new(second)).unwrap_err();
        assert!(matches!(err, PipelineError::RequestInProgress));
        assert!(second_rx.try_recv().is_err());
        assert!(mgr.is_active("buf"));

        // Other sinks are independent.
        let (other, _other_rx) = ChannelSink::new();
        let other_handle = mgr.send("other", &openai(), Box::new(other)).unwrap();

        assert_eq!(mgr.cancel("buf"), CancelStatus::Requested);
        assert_eq!(mgr.cancel("buf"), CancelStatus::AlreadyRequested);
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle.outcome())
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Cancelled));
        assert_eq!(first_rx.recv().await, Some(SinkEvent::Cancelled));
        assert!(!mgr.is_active("buf"));
        assert!(mgr.is_active("other"));

        assert_eq!(mgr.cancel("other"), CancelStatus::Requested);
        other_handle.outcome().await;
    }

    #[tokio::test]
    async fn cancel_without_request_is_a_no_op() {
        let mgr = manager("true");
        let status = mgr.cancel("nothing");
        assert_eq!(status, CancelStatus::NoActiveRequest);
        assert_eq!(status.message(), "no active request");
    }

    #[tokio::test]
    async fn build_errors_reach_the_sink_and_free_the_slot() {
        let mgr = manager("true");
        let (sink, mut rx) = ChannelSink::new();
        let desc = RequestDescriptor::new("nope", vec![Message::user("hi")]);
        let err = mgr.send("buf", &desc, Box::new(sink)).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownProvider(_)));
        assert_eq!(rx.try_recv().unwrap(), SinkEvent::Error("unknown provider: nope".into()));
        assert!(!mgr.is_active("buf"));
    }

    struct PanickingSink;

    impl Sink for PanickingSink {
        fn on_chunk(&mut self, _text: &str) {
            panic!("sink blew up");
        }

        fn on_complete(&mut self, _full_text: &str) {}

        fn on_error(&mut self, _message: &str) {}

        fn on_cancelled(&mut self) {}
    }

    #[tokio::test]
    async fn panicking_request_task_fails_and_frees_the_slot() {
        let mgr = manager(r#"printf 'HTTP/1.1 200 OK\r\n\r\n{"choices":[{"message":{"content":"boom"}}]}'"#);
        let desc = openai().streaming(false);

        let outcome = mgr.send("buf", &desc, Box::new(PanickingSink)).unwrap().outcome().await;
        assert!(matches!(outcome, Outcome::Failed(PipelineError::TaskFailed(_))), "{outcome:?}");
        assert!(!mgr.is_active("buf"));

        let (sink, _rx) = ChannelSink::new();
        let outcome = mgr.send("buf", &desc, Box::new(sink)).unwrap().outcome().await;
        assert!(matches!(outcome, Outcome::Completed(ref t) if t == "boom"));
    }

    #[tokio::test]
    async fn slot_is_free_again_after_completion() {
        let mgr = manager(r#"printf 'HTTP/1.1 200 OK\r\n\r\n{"choices":[{"message":{"content":"done"}}]}'"#);
        let desc = openai().streaming(false);
        for _ in 0..2 {
            let (sink, mut rx) = ChannelSink::new();
            let outcome = mgr.send("buf", &desc, Box::new(sink)).unwrap().outcome().await;
            assert!(matches!(outcome, Outcome::Completed(ref t) if t == "done"));
            assert!(!mgr.is_active("buf"));
            assert_eq!(rx.recv().await, Some(SinkEvent::Chunk("done".into())));
            assert_eq!(rx.recv().await, Some(SinkEvent::Complete("done".into())));
        }
    }
}
