use super::{encode, error_field, non_empty, require_key, Headers, KeyPlacement, Message, Provider, RequestOptions, Role};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Google Generative Language API.
///
/// The model is part of the URL and the API key travels as the `key` query
/// parameter, appended by the engine right before the transport starts.
#[derive(Debug, Clone, Default)]
pub struct GeminiProvider;

impl GeminiProvider {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

/// Concatenate all text parts of the first candidate.
fn extract_text(value: &Value) -> Option<String> {
    let r: GenerateContentResponse = serde_json::from_value(value.clone()).ok()?;
    let content = r.candidates.into_iter().next()?.content?;
    let out: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    Some(out)
}

impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        "gemini-1.5-flash"
    }

    fn default_endpoint(&self) -> &str {
        "https://generativelanguage.googleapis.com/v1beta/models/{model}:{method}"
    }

    fn api_key_env_var(&self) -> Option<&str> {
        Some("GEMINI_API_KEY")
    }

    fn key_placement(&self) -> KeyPlacement {
        KeyPlacement::Query("key")
    }

    fn endpoint_for(&self, endpoint: &str, model: &str, streaming: bool) -> String {
        // streamGenerateContent only emits SSE framing with alt=sse.
        let method = if streaming {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        endpoint.replace("{model}", model).replace("{method}", method)
    }

    fn build_headers(&self, _model: &str, _messages: &[Message], api_key: Option<&str>) -> Result<Headers> {
        require_key(self, api_key)?;
        Ok(vec![("Content-Type".to_string(), "application/json".to_string())])
    }

    fn build_body(
        &self,
        _model: &str,
        messages: &[Message],
        _streaming: bool,
        options: &RequestOptions,
    ) -> Result<Vec<u8>> {
        let mut system = Vec::new();
        let mut contents = Vec::new();
        for m in messages {
            match m.role {
                Role::System => system.push(m.content.as_str()),
                Role::User => contents.push(Content::text(Some("user"), &m.content)),
                Role::Assistant => contents.push(Content::text(Some("model"), &m.content)),
            }
        }

        let generation_config = if options.temperature.is_some() || options.max_tokens.is_some() {
            Some(GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            })
        } else {
            None
        };

        let req = GenerateContentRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| Content::text(None, &system.join("\n"))),
            generation_config,
        };
        encode(&req)
    }

    fn parse_response(&self, body: &Value) -> Option<String> {
        // Non-streamed replies occasionally arrive wrapped in a one-element array.
        match body {
            Value::Array(items) => items.iter().filter_map(extract_text).reduce(|a, b| a + &b),
            other => extract_text(other),
        }
    }

    fn parse_stream_event(&self, event: &Value) -> Option<String> {
        non_empty(extract_text(event)?)
    }

    fn parse_error(&self, payload: &Value) -> Option<String> {
        match payload {
            Value::Array(items) => items.iter().find_map(error_field),
            other => error_field(other),
        }
    }
}
