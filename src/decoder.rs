use crate::error::{PipelineError, Result};
use crate::provider::{Provider, StreamFraming};
use serde_json::Value;

/// What one line of a streamed body amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Text(String),
    /// The provider reported an error in-band.
    Error(String),
    /// A payload with nothing to display, `[DONE]` included.
    Empty,
    /// Not a payload line.
    Skip,
    /// A payload line that is not valid JSON.
    Malformed,
}

/// Decode a single streamed line. Malformed JSON is logged and skipped.
pub fn decode_stream_line(line: &str, provider: &dyn Provider) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }

    let payload = match provider.stream_framing() {
        // `event:`, `id:`, `retry:` and `:` comments carry nothing we display.
        StreamFraming::Sse => match line.strip_prefix("data:") {
            Some(rest) => rest.trim(),
            None => return LineEvent::Skip,
        },
        StreamFraming::JsonLines => line,
    };
    if payload.is_empty() {
        return LineEvent::Skip;
    }
    if payload == "[DONE]" {
        return LineEvent::Empty;
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(provider = provider.name(), error = %e, "dropping malformed stream line");
            return LineEvent::Malformed;
        }
    };

    if let Some(msg) = provider.parse_error(&value) {
        return LineEvent::Error(msg);
    }
    match provider.parse_stream_event(&value) {
        Some(text) => LineEvent::Text(text),
        None => LineEvent::Empty,
    }
}

/// Decode a complete, non-streamed body.
pub fn decode_whole_body(body: &[u8], provider: &dyn Provider) -> Result<String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(PipelineError::EmptyResponse);
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PipelineError::MalformedPayload(format!("{}: {e}", provider.name())))?;

    if let Some(msg) = provider.parse_error(&value) {
        return Err(PipelineError::rejected(provider.name(), msg));
    }
    if let Some(text) = provider.parse_response(&value).filter(|t| !t.is_empty()) {
        return Ok(text);
    }
    if let Some(text) = fallback_text(&value) {
        tracing::debug!(provider = provider.name(), "response parser found nothing; used fallback fields");
        return Ok(text);
    }
    Ok(format!("[no text found in {} response]", provider.name()))
}

const FALLBACK_POINTERS: &[&str] = &[
    "/choices/0/message/content",
    "/choices/0/text",
    "/message/content",
    "/content/0/text",
    "/candidates/0/content/parts/0/text",
    "/response",
    "/output",
    "/text",
    "/content",
];

fn fallback_text(value: &Value) -> Option<String> {
    FALLBACK_POINTERS
        .iter()
        .filter_map(|p| value.pointer(p)?.as_str())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Rolling buffer over raw transport output.
///
/// The transport prints the HTTP response head before the body. Everything up
/// to the first blank line is treated as the head, exactly once; the rest is
/// body, kept whole for diagnostics and, in line mode, split into lines.
/// Interim heads (`1xx`, a proxy's `Connection established`) that precede the
/// final head are discarded.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    line_mode: bool,
    received: bool,
    head: Vec<u8>,
    head_done: bool,
    status: Option<u16>,
    body: Vec<u8>,
    pending: Vec<u8>,
}

impl ResponseBuffer {
    pub fn new(line_mode: bool) -> Self {
        Self {
            line_mode,
            ..Default::default()
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.head_done {
            self.append_body(chunk);
            return;
        }

        self.received |= !chunk.is_empty();
        self.head.extend_from_slice(chunk);
        loop {
            let Some((end, sep)) = find_blank_line(&self.head) else {
                return;
            };
            let rest = self.head.split_off(end + sep);
            self.head.truncate(end);
            if is_interim_head(&self.head) {
                tracing::debug!(head = %String::from_utf8_lossy(&self.head), "skipping interim response head");
                self.head = rest;
                continue;
            }

            self.head_done = true;
            self.status = parse_status(&self.head);
            if let Some(status) = self.status.filter(|s| *s >= 400) {
                // Not fatal yet: the body usually explains the failure.
                tracing::debug!(status, "server answered with an error status");
            }
            self.append_body(&rest);
            return;
        }
    }

    fn append_body(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
        if self.line_mode {
            self.pending.extend_from_slice(bytes);
        }
    }

    /// Pop the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        if line.ends_with(b"\r") {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever partial line is left once the transport has finished.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    pub fn head_complete(&self) -> bool {
        self.head_done
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the transport produced any output at all.
    pub fn received_anything(&self) -> bool {
        self.received
    }
}

/// Position and length of the first CRLFCRLF or LFLF separator.
fn find_blank_line(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// A head that is followed by another one: informational `1xx`, or the
/// reply to a proxy `CONNECT`.
fn is_interim_head(head: &[u8]) -> bool {
    match parse_status(head) {
        Some(status) if (100..200).contains(&status) => true,
        Some(200) => {
            let first = head.split(|&b| b == b'\n').next().unwrap_or_default();
            String::from_utf8_lossy(first)
                .to_ascii_lowercase()
                .contains("connection established")
        }
        _ => false,
    }
}

fn parse_status(head: &[u8]) -> Option<u16> {
    let head = std::str::from_utf8(head).ok()?;
    let first = head.lines().next()?;
    if !first.starts_with("HTTP/") {
        return None;
    }
    first.split_whitespace().nth(1)?.parse().ok()
}
