use anyhow::Context;
use chatpipe::{
    Config, CurlTransport, HttpTransport, Outcome, ProviderRegistry, RequestDescriptor, SessionManager, SinkEvent,
    Transport, TransportKind,
};
use std::future::Future;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The terminal is the only sink this binary drives.
const SINK_ID: &str = "stdout";

const DEFAULT_PROVIDER: &str = "openai";

pub fn build_session(cfg: &Config, transport: Option<TransportKind>) -> anyhow::Result<SessionManager> {
    let timeouts = cfg.timeouts();
    let registry = ProviderRegistry::with_builtin().with_overrides(cfg.providers.clone());

    let transport: Arc<dyn Transport> = match transport.unwrap_or(cfg.transport) {
        TransportKind::Curl => Arc::new(CurlTransport::new(cfg.curl_program.clone())),
        TransportKind::Http => Arc::new(HttpTransport::new(timeouts).context("failed to build HTTP client")?),
    };
    tracing::debug!(transport = transport.name(), "transport selected");

    Ok(SessionManager::new(Arc::new(registry), transport, timeouts))
}

pub fn default_provider(cfg: &Config) -> String {
    cfg.provider.clone().unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
}

pub fn cmd_providers(session: &SessionManager, streaming: bool) -> anyhow::Result<()> {
    let registry = session.registry();
    let mut out = std::io::stdout().lock();
    for name in registry.names() {
        let model = registry.resolve_model(name)?;
        let endpoint = registry.resolve_endpoint(name, &model, streaming)?;
        let needs_key = registry
            .lookup(name)
            .and_then(|p| p.api_key_env_var().map(str::to_string));
        let key = match (needs_key, registry.resolve_api_key(name)) {
            (_, Some(_)) => "key: set".to_string(),
            (Some(var), None) => format!("key: missing ({var})"),
            (None, None) => "key: not required".to_string(),
        };
        writeln!(out, "{name:<12} {model:<32} {endpoint}  [{key}]")?;
    }
    Ok(())
}

pub async fn cmd_send(session: &SessionManager, desc: RequestDescriptor) -> anyhow::Result<ExitCode> {
    let (sink, mut events) = chatpipe::ChannelSink::new();
    let handle = session
        .send(SINK_ID, &desc, Box::new(sink))
        .with_context(|| format!("failed to start request to {}", desc.provider))?;

    let mut out = std::io::stdout();
    let wrote_text = relay(&mut events, tokio::signal::ctrl_c(), || {
        let status = session.cancel(SINK_ID);
        tracing::debug!(status = status.message(), "interrupt received");
    }, &mut out)
    .await?;
    if wrote_text {
        writeln!(out)?;
    }

    Ok(match handle.outcome().await {
        Outcome::Completed(_) => ExitCode::SUCCESS,
        Outcome::Failed(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
        Outcome::Cancelled => {
            eprintln!("cancelled");
            ExitCode::from(130)
        }
    })
}

/// Copy chunks to `out` until a terminal event, calling `on_interrupt` the
/// first time `interrupt` fires. Returns whether any text was written.
async fn relay<W: Write>(
    events: &mut mpsc::UnboundedReceiver<SinkEvent>,
    interrupt: impl Future<Output = io::Result<()>>,
    mut on_interrupt: impl FnMut(),
    out: &mut W,
) -> io::Result<bool> {
    tokio::pin!(interrupt);
    let mut listening = true;
    let mut wrote_text = false;
    loop {
        tokio::select! {
            biased;
            res = &mut interrupt, if listening => {
                listening = false;
                match res {
                    Ok(()) => on_interrupt(),
                    Err(e) => tracing::warn!(error = %e, "failed to listen for Ctrl-C"),
                }
            }
            ev = events.recv() => match ev {
                Some(SinkEvent::Chunk(text)) => {
                    out.write_all(text.as_bytes())?;
                    out.flush().ok();
                    wrote_text = true;
                }
                // Terminal event; the outcome carries the details.
                Some(_) | None => return Ok(wrote_text),
            },
        }
    }
}
