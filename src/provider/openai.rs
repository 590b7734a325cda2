use super::{encode, error_field, non_empty, require_key, Headers, Message, Provider, RequestOptions};
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;

/// OpenAI chat-completions dialect, shared by every compatible service.
#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    name: String,
    endpoint: String,
    env_var: Option<String>,
    model: String,
}

impl OpenAiCompatible {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        env_var: Option<&str>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            env_var: env_var.map(str::to_string),
            model: model.into(),
        }
    }

    pub fn openai() -> Self {
        Self::new(
            "openai",
            "https://api.openai.com/v1/chat/completions",
            Some("OPENAI_API_KEY"),
            "gpt-4o-mini",
        )
    }

    pub fn openrouter() -> Self {
        Self::new(
            "openrouter",
            "https://openrouter.ai/api/v1/chat/completions",
            Some("OPENROUTER_API_KEY"),
            "openai/gpt-4o-mini",
        )
    }

    pub fn groq() -> Self {
        Self::new(
            "groq",
            "https://api.groq.com/openai/v1/chat/completions",
            Some("GROQ_API_KEY"),
            "llama-3.1-8b-instant",
        )
    }

    pub fn deepseek() -> Self {
        Self::new(
            "deepseek",
            "https://api.deepseek.com/chat/completions",
            Some("DEEPSEEK_API_KEY"),
            "deepseek-chat",
        )
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl Provider for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn default_endpoint(&self) -> &str {
        &self.endpoint
    }

    fn api_key_env_var(&self) -> Option<&str> {
        self.env_var.as_deref()
    }

    fn build_headers(&self, _model: &str, _messages: &[Message], api_key: Option<&str>) -> Result<Headers> {
        let key = require_key(self, api_key)?;
        Ok(vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {key}")),
        ])
    }

    fn build_body(
        &self,
        model: &str,
        messages: &[Message],
        streaming: bool,
        options: &RequestOptions,
    ) -> Result<Vec<u8>> {
        let req = ChatCompletionRequest {
            model,
            messages,
            stream: streaming,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        encode(&req)
    }

    fn parse_response(&self, body: &Value) -> Option<String> {
        let text = body
            .pointer("/choices/0/message/content")?
            .as_str()?
            .to_string();
        Some(text)
    }

    fn parse_stream_event(&self, event: &Value) -> Option<String> {
        let delta = event.pointer("/choices/0/delta/content")?.as_str()?;
        non_empty(delta.to_string())
    }

    fn parse_error(&self, payload: &Value) -> Option<String> {
        error_field(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use serde_json::json;

    #[test]
    fn headers_carry_bearer_token() {
        let p = OpenAiCompatible::openai();
        let h = p.build_headers("gpt-4o-mini", &[], Some("sk-test")).unwrap();
        assert!(h.contains(&("Authorization".to_string(), "Bearer sk-test".to_string())));
    }

    #[test]
    fn missing_key_is_auth_error() {
        let p = OpenAiCompatible::groq();
        let err = p.build_headers("m", &[], None).unwrap_err();
        assert!(matches!(err, PipelineError::AuthMissing { ref provider, .. } if provider == "groq"));
    }

    #[test]
    fn body_keeps_roles_and_stream_flag() {
        let p = OpenAiCompatible::openai();
        let msgs = vec![Message::system("be brief"), Message::user("hi")];
        let bytes = p
            .build_body("gpt-4o-mini", &msgs, true, &RequestOptions::default())
            .unwrap();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["stream"], json!(true));
        assert_eq!(v["messages"][0]["role"], json!("system"));
        assert_eq!(v["messages"][1]["content"], json!("hi"));
        assert!(v.get("temperature").is_none());
    }

    #[test]
    fn stream_event_skips_role_only_deltas() {
        let p = OpenAiCompatible::openai();
        let role_only = json!({"choices":[{"delta":{"role":"assistant"}}]});
        let empty = json!({"choices":[{"delta":{"content":""}}]});
        let text = json!({"choices":[{"delta":{"content":"Hel"}}]});
        assert_eq!(p.parse_stream_event(&role_only), None);
        assert_eq!(p.parse_stream_event(&empty), None);
        assert_eq!(p.parse_stream_event(&text).as_deref(), Some("Hel"));
    }

    #[test]
    fn parses_whole_response() {
        let p = OpenAiCompatible::openai();
        let body = json!({"choices":[{"message":{"role":"assistant","content":"Hello"}}]});
        assert_eq!(p.parse_response(&body).as_deref(), Some("Hello"));
    }
}
