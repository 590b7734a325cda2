use super::process::spawn_process;
use super::{Transport, TransportCall, TransportHandle};
use crate::error::{PipelineError, Result};
use std::fmt::Write as _;
use std::io::Write as _;
use tokio::process::Command;

/// Runs each request through an external `curl` process.
///
/// URL and headers go into a private config file handed over with
/// `--config`, so credentials never show up in the process argument list.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    program: String,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self::new("curl")
    }
}

impl CurlTransport {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Quote a value for curl's config-file syntax.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub(crate) fn render_config(call: &TransportCall<'_>) -> String {
    let mut cfg = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(cfg, "url = {}", quote(call.url));
    cfg.push_str("request = \"POST\"\n");
    // Response head goes to stdout ahead of the body.
    cfg.push_str("include\n");
    // Keep a proxy's CONNECT reply out of the response head.
    cfg.push_str("suppress-connect-headers\n");
    cfg.push_str("silent\nshow-error\nno-buffer\n");
    let _ = writeln!(cfg, "max-time = {}", call.timeouts.request.as_secs().max(1));
    let _ = writeln!(cfg, "connect-timeout = {}", call.timeouts.connect.as_secs().max(1));
    let _ = writeln!(
        cfg,
        "data-binary = {}",
        quote(&format!("@{}", call.body_path.display()))
    );
    for (name, value) in call.headers {
        let _ = writeln!(cfg, "header = {}", quote(&format!("{name}: {value}")));
    }
    // Suppress `100 Continue` heads for large bodies.
    cfg.push_str("header = \"Expect:\"\n");
    cfg
}

impl Transport for CurlTransport {
    fn name(&self) -> &'static str {
        "curl"
    }

    fn spawn(&self, call: TransportCall<'_>) -> Result<TransportHandle> {
        let mut config = tempfile::Builder::new()
            .prefix("chatpipe-curl-")
            .suffix(".conf")
            .tempfile()
            .map_err(PipelineError::Staging)?;
        config
            .write_all(render_config(&call).as_bytes())
            .and_then(|_| config.flush())
            .map_err(PipelineError::Staging)?;

        let mut cmd = Command::new(&self.program);
        // --disable must come first to skip ~/.curlrc.
        cmd.arg("--disable").arg("--config").arg(config.path());

        spawn_process(cmd, vec![config])
    }
}
