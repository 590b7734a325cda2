use super::{encode, error_field, non_empty, Headers, Message, Provider, RequestOptions, StreamFraming};
use crate::error::Result;
use serde_json::{json, Value};

/// Local Ollama server. No credentials; streams one JSON object per line.
#[derive(Debug, Clone, Default)]
pub struct OllamaProvider;

impl OllamaProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        "llama3.2"
    }

    fn default_endpoint(&self) -> &str {
        "http://localhost:11434/api/chat"
    }

    fn api_key_env_var(&self) -> Option<&str> {
        None
    }

    fn stream_framing(&self) -> StreamFraming {
        StreamFraming::JsonLines
    }

    fn build_headers(&self, _model: &str, _messages: &[Message], api_key: Option<&str>) -> Result<Headers> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        // Reverse proxies in front of Ollama commonly expect a bearer token.
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.push(("Authorization".to_string(), format!("Bearer {key}")));
        }
        Ok(headers)
    }

    fn build_body(
        &self,
        model: &str,
        messages: &[Message],
        streaming: bool,
        options: &RequestOptions,
    ) -> Result<Vec<u8>> {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": streaming,
        });
        let mut opts = serde_json::Map::new();
        if let Some(t) = options.temperature {
            opts.insert("temperature".into(), json!(t));
        }
        if let Some(n) = options.max_tokens {
            opts.insert("num_predict".into(), json!(n));
        }
        if !opts.is_empty() {
            body["options"] = Value::Object(opts);
        }
        encode(&body)
    }

    fn parse_response(&self, body: &Value) -> Option<String> {
        Some(body.pointer("/message/content")?.as_str()?.to_string())
    }

    fn parse_stream_event(&self, event: &Value) -> Option<String> {
        non_empty(event.pointer("/message/content")?.as_str()?.to_string())
    }

    fn parse_error(&self, payload: &Value) -> Option<String> {
        error_field(payload)
    }
}
