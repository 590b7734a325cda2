use crate::config::ProviderSettings;
use crate::error::{PipelineError, Result};
use crate::provider::{self, Provider, RequestOptions};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Read-only key lookup used for credentials, normally the process environment.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Name-keyed table of provider capability sets plus user overrides.
///
/// Built once at startup and then shared read-only (usually behind an `Arc`)
/// by every in-flight request.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    overrides: HashMap<String, ProviderSettings>,
    env: EnvLookup,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            overrides: HashMap::new(),
            env: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Registry pre-populated with every built-in provider.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        for p in provider::builtin() {
            let name = p.name().to_string();
            reg.register(name, Arc::from(p));
        }
        reg
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, ProviderSettings>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Last registration for a name wins.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        if self.providers.insert(name.clone(), provider).is_some() {
            tracing::debug!(provider = %name, "replaced provider registration");
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    fn require(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.lookup(name)
            .ok_or_else(|| PipelineError::UnknownProvider(name.to_string()))
    }

    fn settings(&self, name: &str) -> Option<&ProviderSettings> {
        self.overrides.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Configured endpoint or provider default, expanded for `model`.
    pub fn resolve_endpoint(&self, name: &str, model: &str, streaming: bool) -> Result<String> {
        let p = self.require(name)?;
        let base = self
            .settings(name)
            .and_then(|s| s.endpoint.as_deref())
            .unwrap_or_else(|| p.default_endpoint());
        Ok(p.endpoint_for(base, model, streaming))
    }

    /// Explicit configuration first, then the provider's environment variable.
    pub fn resolve_api_key(&self, name: &str) -> Option<String> {
        if let Some(key) = self.settings(name).and_then(|s| s.api_key.clone()) {
            return Some(key);
        }
        let var = self.lookup(name)?.api_key_env_var()?.to_string();
        (self.env)(&var).filter(|v| !v.trim().is_empty())
    }

    pub fn resolve_model(&self, name: &str) -> Result<String> {
        let p = self.require(name)?;
        Ok(self
            .settings(name)
            .and_then(|s| s.model.clone())
            .unwrap_or_else(|| p.default_model().to_string()))
    }

    /// Sampling options configured for a provider.
    pub fn options(&self, name: &str) -> RequestOptions {
        self.settings(name)
            .map(|s| RequestOptions {
                temperature: s.temperature,
                max_tokens: s.max_tokens,
            })
            .unwrap_or_default()
    }
}
