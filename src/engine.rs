//! Per-request execution: stage the body, start the transport, decode its
//! output as it arrives, and finish with exactly one terminal outcome.

use crate::classify;
use crate::config::Timeouts;
use crate::context::StreamContext;
use crate::decoder::{self, LineEvent, ResponseBuffer};
use crate::error::{PipelineError, Result};
use crate::request::PreparedRequest;
use crate::sink::Sink;
use crate::transport::{Transport, TransportCall, TransportEvent, TransportExit, TransportHandle};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::oneshot;

pub use crate::context::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Spawning,
    Streaming,
    Buffering,
    Completing,
    Erroring,
    Cancelling,
    Terminal,
}

enum Finish {
    Completed,
    Cancelled,
}

enum Step {
    Cancel,
    CancelDropped,
    Event(Option<TransportEvent>),
}

pub struct ExecutionEngine {
    request: PreparedRequest,
    transport: Arc<dyn Transport>,
    timeouts: Timeouts,
    ctx: StreamContext,
    state: EngineState,
    response: ResponseBuffer,
    stderr: Vec<u8>,
    stream_error: Option<String>,
    /// Stream lines that decoded as provider payloads, and those that did not.
    payload_lines: usize,
    malformed_lines: usize,
}

impl ExecutionEngine {
    pub fn new(
        request: PreparedRequest,
        transport: Arc<dyn Transport>,
        timeouts: Timeouts,
        sink: Box<dyn Sink>,
    ) -> Self {
        let line_mode = request.streaming;
        Self {
            request,
            transport,
            timeouts,
            ctx: StreamContext::new(sink),
            state: EngineState::Idle,
            response: ResponseBuffer::new(line_mode),
            stderr: Vec::new(),
            stream_error: None,
            payload_lines: 0,
            malformed_lines: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn transition(&mut self, next: EngineState) {
        tracing::debug!(provider = self.request.provider_name(), from = ?self.state, to = ?next, "engine state");
        self.state = next;
    }

    /// Drive the request to its end.
    ///
    /// `cancel` firing moves the engine to cancellation from any state.
    /// `on_released` runs after resources are freed and before the sink's
    /// terminal call.
    pub async fn run(
        mut self,
        mut cancel: oneshot::Receiver<()>,
        on_released: impl FnOnce() + Send,
    ) -> Outcome {
        let outcome = match self.drive(&mut cancel).await {
            Ok(Finish::Completed) => Outcome::Completed(self.ctx.accumulated().to_string()),
            Ok(Finish::Cancelled) => Outcome::Cancelled,
            Err(e) => {
                self.transition(EngineState::Erroring);
                Outcome::Failed(e)
            }
        };
        self.transition(EngineState::Terminal);

        match &outcome {
            Outcome::Completed(text) => tracing::info!(
                provider = self.request.provider_name(),
                model = %self.request.model,
                chunks = self.ctx.chunk_count(),
                chars = text.len(),
                "request completed"
            ),
            Outcome::Failed(e) => tracing::info!(
                provider = self.request.provider_name(),
                model = %self.request.model,
                error = %e,
                "request failed"
            ),
            Outcome::Cancelled => tracing::info!(
                provider = self.request.provider_name(),
                model = %self.request.model,
                "request cancelled"
            ),
        }

        let ExecutionEngine { ctx, .. } = self;
        ctx.finish(outcome, on_released)
    }

    async fn drive(&mut self, cancel: &mut oneshot::Receiver<()>) -> Result<Finish> {
        if cancel.try_recv().is_ok() {
            return Ok(Finish::Cancelled);
        }

        self.transition(EngineState::Spawning);
        let staging = stage_body(&self.request.body)?;
        let url = self.request.dispatch_url()?;
        let handle = self.transport.spawn(TransportCall {
            url: &url,
            headers: &self.request.headers,
            body_path: staging.path(),
            timeouts: self.timeouts,
        })?;
        self.ctx.attach(handle, staging);

        self.transition(if self.request.streaming {
            EngineState::Streaming
        } else {
            EngineState::Buffering
        });

        let mut cancel_open = true;
        loop {
            let step = tokio::select! {
                biased;
                res = &mut *cancel, if cancel_open => match res {
                    Ok(()) => Step::Cancel,
                    Err(_) => Step::CancelDropped,
                },
                ev = next_event(&mut self.ctx.transport) => Step::Event(ev),
            };

            match step {
                Step::Cancel => {
                    self.cancel_transport().await;
                    return Ok(Finish::Cancelled);
                }
                Step::CancelDropped => cancel_open = false,
                Step::Event(Some(TransportEvent::Stdout(bytes))) => self.on_stdout(&bytes),
                Step::Event(Some(TransportEvent::Stderr(bytes))) => self.stderr.extend_from_slice(&bytes),
                Step::Event(Some(TransportEvent::Exited(exit))) => return self.on_exit(exit),
                Step::Event(None) => return self.on_exit(TransportExit::lost()),
            }
        }
    }

    fn on_stdout(&mut self, bytes: &[u8]) {
        self.response.push(bytes);
        if !self.request.streaming {
            return;
        }
        while let Some(line) = self.response.next_line() {
            self.on_line(&line);
        }
    }

    fn on_line(&mut self, line: &str) {
        if self.stream_error.is_some() {
            return;
        }
        match decoder::decode_stream_line(line, self.request.provider.as_ref()) {
            LineEvent::Text(text) => {
                self.payload_lines += 1;
                self.ctx.deliver(text);
            }
            LineEvent::Error(msg) => {
                tracing::warn!(provider = self.request.provider_name(), error = %msg, "provider reported an error mid-stream");
                self.payload_lines += 1;
                self.stream_error = Some(msg);
            }
            LineEvent::Empty => self.payload_lines += 1,
            LineEvent::Malformed => self.malformed_lines += 1,
            LineEvent::Skip => {}
        }
    }

    fn on_exit(&mut self, exit: TransportExit) -> Result<Finish> {
        if !exit.success() {
            return Err(PipelineError::TransportFailure(classify::describe_exit(
                &exit,
                &self.stderr,
                self.response.body(),
            )));
        }

        self.transition(EngineState::Completing);
        let provider = Arc::clone(&self.request.provider);

        if self.request.streaming {
            if let Some(rest) = self.response.take_remainder() {
                self.on_line(&rest);
            }
        }
        if let Some(msg) = self.stream_error.take() {
            return Err(PipelineError::rejected(provider.name(), msg));
        }

        if !self.response.head_complete() {
            return Err(if self.response.received_anything() {
                PipelineError::MalformedPayload("response ended inside the header block".into())
            } else {
                PipelineError::EmptyResponse
            });
        }

        let body = self.response.body();
        let body_error = || {
            serde_json::from_slice::<serde_json::Value>(body)
                .ok()
                .and_then(|v| provider.parse_error(&v))
        };

        if let Some(status) = self.response.status().filter(|s| *s >= 400) {
            if let Some(msg) = body_error() {
                return Err(PipelineError::rejected(provider.name(), msg));
            }
            return Err(PipelineError::TransportFailure(classify::describe_status(
                status,
                &self.stderr,
                body,
            )));
        }

        if !self.request.streaming {
            let text = decoder::decode_whole_body(body, provider.as_ref())?;
            self.ctx.deliver(text);
            return Ok(Finish::Completed);
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(PipelineError::EmptyResponse);
        }
        if self.ctx.chunk_count() == 0 {
            // An unframed error document instead of an event stream.
            if let Some(msg) = body_error() {
                return Err(PipelineError::rejected(provider.name(), msg));
            }
            if self.malformed_lines > 0 {
                return Err(PipelineError::MalformedPayload(format!(
                    "{}: {} undecodable stream line(s) and no text",
                    provider.name(),
                    self.malformed_lines
                )));
            }
            if self.payload_lines == 0 {
                return Err(PipelineError::MalformedPayload(format!(
                    "{}: response is not an event stream",
                    provider.name()
                )));
            }
            return Err(PipelineError::EmptyResponse);
        }
        Ok(Finish::Completed)
    }

    /// Interrupt the transport, then kill it if it outlives the grace period.
    async fn cancel_transport(&mut self) {
        self.transition(EngineState::Cancelling);
        let grace = self.timeouts.cancel_grace;
        let Some(handle) = self.ctx.transport.as_mut() else {
            return;
        };

        handle.interrupt();
        if wait_for_exit(handle, grace).await {
            return;
        }
        tracing::debug!("transport ignored interrupt; killing it");
        handle.kill();
        if !wait_for_exit(handle, grace).await {
            tracing::warn!("transport still running after kill; abandoning it");
        }
    }
}

async fn next_event(transport: &mut Option<TransportHandle>) -> Option<TransportEvent> {
    match transport {
        Some(handle) => handle.recv().await,
        None => None,
    }
}

/// Discard output until the transport exits; false on timeout.
async fn wait_for_exit(handle: &mut TransportHandle, grace: Duration) -> bool {
    let drain = async {
        while let Some(ev) = handle.recv().await {
            if matches!(ev, TransportEvent::Exited(_)) {
                break;
            }
        }
    };
    tokio::time::timeout(grace, drain).await.is_ok()
}

/// Write the request body where the transport can read it, keeping it out of
/// the process argument list.
fn stage_body(body: &[u8]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("chatpipe-body-")
        .suffix(".json")
        .tempfile()
        .map_err(PipelineError::Staging)?;
    file.write_all(body)
        .and_then(|_| file.flush())
        .map_err(PipelineError::Staging)?;
    Ok(file)
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use crate::provider::{Message, RequestDescriptor};
    use crate::registry::ProviderRegistry;
    use crate::request;
    use crate::sink::{ChannelSink, SinkEvent};
    use crate::config::ProviderSettings;
    use crate::transport::process::spawn_process;
    use crate::transport::HttpTransport;
    use std::collections::HashMap;
    use tokio::process::Command;
    use tokio::sync::mpsc;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Transport that runs a shell script in place of curl. The script sees
    /// the staged body path as `$1`.
    #[derive(Debug)]
    pub(crate) struct ScriptTransport(pub String);

    impl Transport for ScriptTransport {
        fn name(&self) -> &'static str {
            "script"
        }

        fn spawn(&self, call: TransportCall<'_>) -> Result<TransportHandle> {
            let mut cmd = Command::new("/bin/sh");
            cmd.arg("-c").arg(&self.0).arg("sh").arg(call.body_path);
            spawn_process(cmd, vec![])
        }
    }

    pub(crate) fn registry() -> ProviderRegistry {
        ProviderRegistry::with_builtin().with_env(|_| Some("test-key".to_string()))
    }

    pub(crate) fn fast_timeouts() -> Timeouts {
        Timeouts {
            cancel_grace: Duration::from_millis(300),
            ..Timeouts::default()
        }
    }

    async fn run_script(provider: &str, streaming: bool, script: &str) -> (Outcome, Vec<SinkEvent>) {
        let desc = RequestDescriptor::new(provider, vec![Message::user("hi")]).streaming(streaming);
        let prepared = request::build(&registry(), &desc).unwrap();
        let (sink, rx) = ChannelSink::new();
        let engine = ExecutionEngine::new(
            prepared,
            Arc::new(ScriptTransport(script.to_string())),
            fast_timeouts(),
            Box::new(sink),
        );
        assert_eq!(engine.state(), EngineState::Idle);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let outcome = engine.run(cancel_rx, || {}).await;
        (outcome, drain(rx))
    }

    fn drain(mut rx: mpsc::UnboundedReceiver<SinkEvent>) -> Vec<SinkEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    const OK_HEAD: &str = r"printf 'HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\n'";

    #[tokio::test]
    async fn openai_stream_delivers_chunks_then_completion() {
        let script = format!(
            r#"{OK_HEAD}
printf '%s\n\n' 'data: {{"choices":[{{"delta":{{"content":"Hel"}}}}]}}'
printf '%s\n\n' 'data: {{"choices":[{{"delta":{{"content":"lo"}}}}]}}'
printf 'data: [DONE]\n\n'"#
        );
        let (outcome, events) = run_script("openai", true, &script).await;
        assert!(matches!(outcome, Outcome::Completed(ref t) if t == "Hello"));
        assert_eq!(
            events,
            vec![
                SinkEvent::Chunk("Hel".into()),
                SinkEvent::Chunk("lo".into()),
                SinkEvent::Complete("Hello".into()),
            ]
        );
    }

    #[tokio::test]
    async fn lines_split_across_writes_are_reassembled() {
        let script = format!(
            r#"{OK_HEAD}
printf '%s' 'data: {{"choices":[{{"delta":{{"con'
sleep 0.1
printf '%s\n\n' 'tent":"joined"}}}}]}}'
printf 'data: {{broken\n\n'
printf '%s\n' 'data: {{"choices":[{{"delta":{{"content":"!"}}}}]}}'"#
        );
        let (outcome, events) = run_script("openai", true, &script).await;
        assert!(matches!(outcome, Outcome::Completed(ref t) if t == "joined!"));
        let chunks: String = events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Chunk(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, "joined!");
    }

    #[tokio::test]
    async fn claude_buffered_response_completes() {
        let script = r#"printf 'HTTP/1.1 200 OK\r\n\r\n{"content":[{"text":"Hi"}]}'"#;
        let (outcome, events) = run_script("claude", false, script).await;
        assert!(matches!(outcome, Outcome::Completed(ref t) if t == "Hi"));
        assert_eq!(
            events,
            vec![SinkEvent::Chunk("Hi".into()), SinkEvent::Complete("Hi".into())]
        );
    }

    #[tokio::test]
    async fn ollama_json_lines_stream() {
        let script = r#"printf 'HTTP/1.1 200 OK\r\n\r\n'
printf '%s\n' '{"message":{"content":"a"},"done":false}'
printf '%s\n' '{"message":{"content":"b"},"done":false}'
printf '%s\n' '{"message":{"content":""},"done":true}'"#;
        let (outcome, _) = run_script("ollama", true, script).await;
        assert!(matches!(outcome, Outcome::Completed(ref t) if t == "ab"));
    }

    #[tokio::test]
    async fn connect_failure_exit_code_is_classified() {
        let script = "echo 'curl: (7) Failed to connect' >&2; exit 7";
        let (outcome, events) = run_script("openai", true, script).await;
        assert!(matches!(outcome, Outcome::Failed(PipelineError::TransportFailure(_))));
        match events.as_slice() {
            [SinkEvent::Error(msg)] => {
                assert!(msg.starts_with("Could not connect to host"), "{msg}");
                assert!(msg.contains("Failed to connect"));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_payload_with_success_exit_is_an_error() {
        let script = r#"printf 'HTTP/1.1 200 OK\r\n\r\n{"error":{"message":"rate limited"}}'"#;
        let (outcome, events) = run_script("openai", false, script).await;
        assert!(matches!(outcome, Outcome::Failed(PipelineError::ProviderRejected { .. })));
        match events.as_slice() {
            [SinkEvent::Error(msg)] => assert!(msg.ends_with("rate limited"), "{msg}"),
            other => panic!("unexpected events: {other:?}"),
        }

        let (outcome, _) = run_script("openai", true, script).await;
        assert!(matches!(outcome, Outcome::Failed(PipelineError::ProviderRejected { .. })));
    }

    #[tokio::test]
    async fn empty_body_is_never_a_successful_completion() {
        for streaming in [true, false] {
            let (outcome, events) = run_script("openai", streaming, r"printf 'HTTP/1.1 200 OK\r\n\r\n'").await;
            assert!(matches!(outcome, Outcome::Failed(PipelineError::EmptyResponse)));
            assert_eq!(events.len(), 1);
        }
        let (outcome, _) = run_script("openai", false, "true").await;
        assert!(matches!(outcome, Outcome::Failed(PipelineError::EmptyResponse)));
    }

    #[tokio::test]
    async fn http_error_status_waits_for_body() {
        let script = r#"printf 'HTTP/1.1 401 Unauthorized\r\n\r\n'
sleep 0.1
printf '{\n  "error": {\n    "message": "Incorrect API key provided"\n  }\n}\n'"#;
        let (outcome, _) = run_script("openai", true, script).await;
        match outcome {
            Outcome::Failed(PipelineError::ProviderRejected { message, .. }) => {
                assert_eq!(message, "Incorrect API key provided")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let (outcome, _) = run_script("openai", false, r"printf 'HTTP/1.1 502 Bad Gateway\r\n\r\nupstream error'").await;
        match outcome {
            Outcome::Failed(PipelineError::TransportFailure(msg)) => {
                assert_eq!(msg, "HTTP 502: upstream error")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mid_stream_error_stops_delivery() {
        let script = r#"printf 'HTTP/1.1 200 OK\r\n\r\n'
printf '%s\n\n' 'data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"par"}}'
printf '%s\n\n' 'data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}'
printf '%s\n\n' 'data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"tial"}}'"#;
        let (outcome, events) = run_script("claude", true, script).await;
        assert!(matches!(outcome, Outcome::Failed(PipelineError::ProviderRejected { .. })));
        assert_eq!(
            events,
            vec![
                SinkEvent::Chunk("par".into()),
                SinkEvent::Error("claude: Overloaded".into()),
            ]
        );
    }

    #[tokio::test]
    async fn transport_reads_the_staged_body() {
        // Echo the staged body back as the assistant reply.
        let script = r#"printf 'HTTP/1.1 200 OK\r\n\r\n{"content":[{"text":'
sed 's/.*"content":\("[^"]*"\).*/\1/' "$1"
printf '}]}'"#;
        let (outcome, _) = run_script("claude", false, script).await;
        assert!(matches!(outcome, Outcome::Completed(ref t) if t == "hi"));
    }

    #[tokio::test]
    async fn proxy_connect_head_is_not_taken_for_the_response() {
        let script = r#"printf 'HTTP/1.1 200 Connection established\r\n\r\n'
printf 'HTTP/2 401\r\ncontent-type: application/json\r\n\r\n'
printf '%s' '{"error":{"message":"bad key"}}'"#;
        let (outcome, _) = run_script("openai", true, script).await;
        match outcome {
            Outcome::Failed(PipelineError::ProviderRejected { message, .. }) => assert_eq!(message, "bad key"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let script = r#"printf 'HTTP/1.1 200 Connection established\r\n\r\nHTTP/2 200\r\n\r\n'
printf '%s' '{"choices":[{"message":{"content":"through proxy"}}]}'"#;
        let (outcome, _) = run_script("openai", false, script).await;
        assert!(matches!(outcome, Outcome::Completed(ref t) if t == "through proxy"));
    }

    #[tokio::test]
    async fn stream_without_text_is_not_a_completion() {
        let (outcome, events) = run_script("openai", true, r"printf 'HTTP/1.1 200 OK\r\n\r\n<html>oops</html>\n'").await;
        assert!(matches!(outcome, Outcome::Failed(PipelineError::MalformedPayload(_))), "{outcome:?}");
        assert!(matches!(events.as_slice(), [SinkEvent::Error(_)]));

        let script = r"printf 'HTTP/1.1 200 OK\r\n\r\ndata: {broken\n\ndata: [DONE]\n\n'";
        let (outcome, _) = run_script("openai", true, script).await;
        assert!(matches!(outcome, Outcome::Failed(PipelineError::MalformedPayload(_))), "{outcome:?}");

        let script = r"printf 'HTTP/1.1 200 OK\r\n\r\ndata: [DONE]\n\n'";
        let (outcome, _) = run_script("openai", true, script).await;
        assert!(matches!(outcome, Outcome::Failed(PipelineError::EmptyResponse)), "{outcome:?}");
    }

    #[tokio::test]
    async fn request_timeout_surfaces_as_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_string(r#"{"choices":[{"message":{"content":"late"}}]}"#),
            )
            .mount(&server)
            .await;

        let reg = registry().with_overrides(HashMap::from([(
            "openai".to_string(),
            ProviderSettings {
                endpoint: Some(format!("{}/v1/chat/completions", server.uri())),
                ..Default::default()
            },
        )]));
        let timeouts = Timeouts {
            request: Duration::from_millis(200),
            ..fast_timeouts()
        };
        let desc = RequestDescriptor::new("openai", vec![Message::user("hi")]).streaming(false);
        let prepared = request::build(&reg, &desc).unwrap();
        let (sink, rx) = ChannelSink::new();
        let engine = ExecutionEngine::new(
            prepared,
            Arc::new(HttpTransport::new(timeouts).unwrap()),
            timeouts,
            Box::new(sink),
        );
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let outcome = tokio::time::timeout(Duration::from_secs(3), engine.run(cancel_rx, || {}))
            .await
            .unwrap();
        match outcome {
            Outcome::Failed(PipelineError::TransportFailure(msg)) => {
                assert!(msg.starts_with("Request timed out (exit code 28)"), "{msg}")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(drain(rx).as_slice(), [SinkEvent::Error(_)]));
    }

    #[tokio::test]
    async fn cancellation_yields_one_cancelled_callback() {
        let script = format!(
            r#"{OK_HEAD}
printf '%s\n\n' 'data: {{"choices":[{{"delta":{{"content":"par"}}}}]}}'
exec sleep 30"#
        );
        let desc = RequestDescriptor::new("openai", vec![Message::user("hi")]);
        let prepared = request::build(&registry(), &desc).unwrap();
        let (sink, mut rx) = ChannelSink::new();
        let engine = ExecutionEngine::new(
            prepared,
            Arc::new(ScriptTransport(script)),
            fast_timeouts(),
            Box::new(sink),
        );
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(engine.run(cancel_rx, || {}));

        assert_eq!(rx.recv().await, Some(SinkEvent::Chunk("par".into())));
        cancel_tx.send(()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, Outcome::Cancelled));
        assert_eq!(drain(rx), vec![SinkEvent::Cancelled]);
    }

    #[tokio::test]
    async fn cancel_escalates_to_kill_when_interrupt_is_ignored() {
        let script = format!("{OK_HEAD}\ntrap '' INT\nwhile :; do sleep 0.05; done");
        let desc = RequestDescriptor::new("openai", vec![Message::user("hi")]);
        let prepared = request::build(&registry(), &desc).unwrap();
        let (sink, rx) = ChannelSink::new();
        let engine = ExecutionEngine::new(
            prepared,
            Arc::new(ScriptTransport(script)),
            fast_timeouts(),
            Box::new(sink),
        );
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(engine.run(cancel_rx, || {}));
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel_tx.send(()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, Outcome::Cancelled));
        assert_eq!(drain(rx), vec![SinkEvent::Cancelled]);
    }
}
