use super::{encode, error_field, non_empty, require_key, Headers, Message, Provider, RequestOptions, Role};
use crate::error::Result;
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic messages API, registered as `claude`.
#[derive(Debug, Clone, Default)]
pub struct AnthropicProvider;

impl AnthropicProvider {
    pub fn new() -> Self {
        Self
    }
}

/// System prompts travel as a top-level field, not as messages.
fn split_system(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system = Vec::new();
    let mut rest = Vec::new();
    for m in messages {
        match m.role {
            Role::System => system.push(m.content.as_str()),
            role => rest.push(json!({"role": role.as_str(), "content": m.content})),
        }
    }
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n"))
    };
    (system, rest)
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "claude"
    }

    fn default_model(&self) -> &str {
        "claude-3-5-sonnet-20241022"
    }

    fn default_endpoint(&self) -> &str {
        "https://api.anthropic.com/v1/messages"
    }

    fn api_key_env_var(&self) -> Option<&str> {
        Some("ANTHROPIC_API_KEY")
    }

    fn build_headers(&self, _model: &str, _messages: &[Message], api_key: Option<&str>) -> Result<Headers> {
        let key = require_key(self, api_key)?;
        Ok(vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("x-api-key".to_string(), key.to_string()),
            ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
        ])
    }

    fn build_body(
        &self,
        model: &str,
        messages: &[Message],
        streaming: bool,
        options: &RequestOptions,
    ) -> Result<Vec<u8>> {
        let (system, messages) = split_system(messages);
        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": streaming,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        encode(&body)
    }

    fn parse_response(&self, body: &Value) -> Option<String> {
        let blocks = body.get("content")?.as_array()?;
        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str).map_or(true, |t| t == "text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect();
        Some(text)
    }

    fn parse_stream_event(&self, event: &Value) -> Option<String> {
        if event.get("type")?.as_str()? != "content_block_delta" {
            return None;
        }
        let delta = event.get("delta")?;
        if delta.get("type").and_then(Value::as_str) != Some("text_delta") {
            return None;
        }
        non_empty(delta.get("text")?.as_str()?.to_string())
    }

    fn parse_error(&self, payload: &Value) -> Option<String> {
        error_field(payload)
    }
}
