pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
mod types;

pub use types::{Message, RequestDescriptor, RequestOptions, Role};

use crate::error::{PipelineError, Result};
use serde_json::Value;
use std::fmt;

/// Ordered `(name, value)` header pairs.
pub type Headers = Vec<(String, String)>;

/// Where a provider expects its credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPlacement {
    /// Sent in a header built by [`Provider::build_headers`].
    Header,
    /// Appended to the endpoint as a query parameter, immediately before dispatch.
    Query(&'static str),
}

/// How incremental responses are framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFraming {
    /// `data: {...}` lines, with `event:`/comment lines in between.
    Sse,
    /// One whole JSON document per line.
    JsonLines,
}

/// Provider capability set.
///
/// One implementation per wire dialect; instances are registered by name in
/// [`crate::registry::ProviderRegistry`] and never mutated afterwards.
pub trait Provider: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;

    fn default_endpoint(&self) -> &str;

    /// Environment variable holding the credential, if the provider needs one.
    fn api_key_env_var(&self) -> Option<&str>;

    fn key_placement(&self) -> KeyPlacement {
        KeyPlacement::Header
    }

    fn stream_framing(&self) -> StreamFraming {
        StreamFraming::Sse
    }

    /// Expand an endpoint for a concrete model. Providers whose URL does not
    /// depend on the model return it untouched.
    fn endpoint_for(&self, endpoint: &str, _model: &str, _streaming: bool) -> String {
        endpoint.to_string()
    }

    fn build_headers(&self, model: &str, messages: &[Message], api_key: Option<&str>)
        -> Result<Headers>;

    fn build_body(
        &self,
        model: &str,
        messages: &[Message],
        streaming: bool,
        options: &RequestOptions,
    ) -> Result<Vec<u8>>;

    /// Text of a complete, non-streamed response.
    fn parse_response(&self, body: &Value) -> Option<String>;

    /// Displayable delta carried by one stream event, if any.
    fn parse_stream_event(&self, event: &Value) -> Option<String>;

    fn parse_error(&self, payload: &Value) -> Option<String>;
}

pub(crate) fn require_key<'a>(provider: &dyn Provider, api_key: Option<&'a str>) -> Result<&'a str> {
    match api_key {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(PipelineError::auth_missing(
            provider.name(),
            provider.api_key_env_var(),
        )),
    }
}

pub(crate) fn encode<T: serde::Serialize>(body: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(body).map_err(|e| PipelineError::MalformedPayload(e.to_string()))
}

/// `{"error": {"message": ...}}` or `{"error": "..."}`.
pub(crate) fn error_field(payload: &Value) -> Option<String> {
    let err = payload.get("error")?;
    let msg = match err {
        Value::String(s) => s.clone(),
        Value::Object(_) => err.get("message")?.as_str()?.to_string(),
        _ => return None,
    };
    if msg.trim().is_empty() { None } else { Some(msg) }
}

pub(crate) fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

/// Every provider this crate ships, in registration order.
pub fn builtin() -> Vec<Box<dyn Provider>> {
    vec![
        Box::new(openai::OpenAiCompatible::openai()),
        Box::new(openai::OpenAiCompatible::openrouter()),
        Box::new(openai::OpenAiCompatible::groq()),
        Box::new(openai::OpenAiCompatible::deepseek()),
        Box::new(anthropic::AnthropicProvider::new()),
        Box::new(ollama::OllamaProvider::new()),
        Box::new(gemini::GeminiProvider::new()),
    ]
}
