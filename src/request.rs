use crate::error::{PipelineError, Result};
use crate::provider::{Headers, KeyPlacement, Provider, RequestDescriptor, RequestOptions};
use crate::registry::ProviderRegistry;
use reqwest::Url;
use std::fmt;
use std::sync::Arc;

/// A request ready for the transport: endpoint, headers and serialized body.
///
/// Query-string credentials are held back until [`PreparedRequest::dispatch_url`]
/// so the plain endpoint can be logged freely.
pub struct PreparedRequest {
    pub provider: Arc<dyn Provider>,
    pub model: String,
    pub endpoint: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub streaming: bool,
    query_key: Option<(&'static str, String)>,
}

impl PreparedRequest {
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Endpoint with any query-parameter credential appended.
    pub(crate) fn dispatch_url(&self) -> Result<String> {
        let Some((param, key)) = &self.query_key else {
            return Ok(self.endpoint.clone());
        };
        let mut url = Url::parse(&self.endpoint).map_err(|e| PipelineError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair(param, key);
        Ok(url.to_string())
    }
}

fn is_secret_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "authorization" || name.contains("key") || name.contains("token")
}

impl fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                let v = if is_secret_header(k) { "<redacted>" } else { v.as_str() };
                (k.as_str(), v)
            })
            .collect();
        f.debug_struct("PreparedRequest")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("headers", &headers)
            .field("body_len", &self.body.len())
            .field("streaming", &self.streaming)
            .field("query_key", &self.query_key.as_ref().map(|(p, _)| *p))
            .finish()
    }
}

/// Resolve provider, model, credentials and endpoint, then serialize the body.
pub fn build(registry: &ProviderRegistry, desc: &RequestDescriptor) -> Result<PreparedRequest> {
    let provider = registry
        .lookup(&desc.provider)
        .ok_or_else(|| PipelineError::UnknownProvider(desc.provider.clone()))?;

    let model = match &desc.model {
        Some(m) => m.clone(),
        None => registry.resolve_model(&desc.provider)?,
    };
    let endpoint = registry.resolve_endpoint(&desc.provider, &model, desc.streaming)?;
    let api_key = registry.resolve_api_key(&desc.provider);

    let headers = provider.build_headers(&model, &desc.messages, api_key.as_deref())?;

    let configured = registry.options(&desc.provider);
    let options = RequestOptions {
        temperature: desc.options.temperature.or(configured.temperature),
        max_tokens: desc.options.max_tokens.or(configured.max_tokens),
    };
    let body = provider.build_body(&model, &desc.messages, desc.streaming, &options)?;

    let query_key = match provider.key_placement() {
        KeyPlacement::Query(param) => api_key.map(|k| (param, k)),
        KeyPlacement::Header => None,
    };

    let prepared = PreparedRequest {
        provider,
        model,
        endpoint,
        headers,
        body,
        streaming: desc.streaming,
        query_key,
    };
    tracing::debug!(request = ?prepared, "built request");
    Ok(prepared)
}
