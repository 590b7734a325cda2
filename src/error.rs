use thiserror::Error;

/// Errors surfaced by the request pipeline.
///
/// Cancellation is not represented here: it is a normal terminal outcome,
/// see [`crate::engine::Outcome`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no API key for {provider} (set {hint})")]
    AuthMissing { provider: String, hint: String },

    #[error("malformed response payload: {0}")]
    MalformedPayload(String),

    #[error("empty response from server")]
    EmptyResponse,

    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("{0}")]
    TransportFailure(String),

    #[error("{provider}: {message}")]
    ProviderRejected { provider: String, message: String },

    #[error("a request is already in progress for this conversation")]
    RequestInProgress,

    #[error("invalid endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("failed to stage request: {0}")]
    Staging(#[source] std::io::Error),

    /// The task driving the request died before reporting an outcome.
    #[error("request task failed: {0}")]
    TaskFailed(String),
}

impl PipelineError {
    pub fn auth_missing(provider: impl Into<String>, env_var: Option<&str>) -> Self {
        let provider = provider.into();
        let hint = match env_var {
            Some(var) => format!("{var} or providers.{provider}.api_key"),
            None => format!("providers.{provider}.api_key"),
        };
        Self::AuthMissing { provider, hint }
    }

    pub fn rejected(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderRejected {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
