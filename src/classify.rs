use crate::provider::error_field;
use crate::transport::TransportExit;
use serde_json::Value;

const MAX_RAW_BODY: usize = 300;
const ERROR_WORDS: &[&str] = &[
    "error",
    "invalid",
    "unauthorized",
    "forbidden",
    "denied",
    "not found",
    "exceeded",
    "too many",
    "unavailable",
];

/// Human-readable cause for a curl exit code.
pub fn exit_cause(code: i32) -> &'static str {
    match code {
        1 => "Unsupported protocol",
        2 => "Transport failed to initialize",
        3 => "Malformed request URL",
        5 => "Could not resolve proxy",
        6 => "Could not resolve host (DNS failure)",
        7 => "Could not connect to host",
        16 => "HTTP/2 framing error",
        18 => "Partial response received",
        22 => "HTTP error response",
        23 => "Failed writing received data",
        26 => "Failed reading the request body",
        28 => "Request timed out",
        35 => "TLS handshake failed",
        47 => "Too many redirects",
        52 => "Server returned an empty response",
        55 => "Failed sending request data",
        56 => "Failure receiving network data",
        60 => "Server certificate could not be verified",
        _ => "Request failed",
    }
}

/// Error text recoverable from a response body.
///
/// Structured bodies are searched for `error.message`, `error` and `message`;
/// anything else is used verbatim only if it is short and reads like an error.
pub fn body_error(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => structured_error(&value),
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            if text.is_empty() || text.len() > MAX_RAW_BODY {
                return None;
            }
            let lower = text.to_ascii_lowercase();
            ERROR_WORDS
                .iter()
                .any(|w| lower.contains(w))
                .then(|| text.to_string())
        }
    }
}

fn structured_error(value: &Value) -> Option<String> {
    if let Value::Array(items) = value {
        return items.iter().find_map(structured_error);
    }
    error_field(value).or_else(|| {
        value
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
    })
}

fn append_details(msg: &mut String, stderr: &[u8], body: &[u8]) {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        msg.push_str(": ");
        msg.push_str(stderr);
    }
    if let Some(err) = body_error(body) {
        msg.push_str(": ");
        msg.push_str(&err);
    }
}

/// Message for a transport that exited unsuccessfully.
pub fn describe_exit(exit: &TransportExit, stderr: &[u8], body: &[u8]) -> String {
    let mut msg = match (exit.code, exit.signal) {
        (Some(code), _) => format!("{} (exit code {code})", exit_cause(code)),
        (None, Some(sig)) => format!("Transport terminated by signal {sig}"),
        (None, None) => "Transport ended without an exit status".to_string(),
    };
    append_details(&mut msg, stderr, body);
    msg
}

/// Message for a transfer that completed but carried an HTTP error status.
pub fn describe_status(status: u16, stderr: &[u8], body: &[u8]) -> String {
    let mut msg = format!("HTTP {status}");
    append_details(&mut msg, stderr, body);
    msg
}
