use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider used when none is given on the command line.
    pub provider: Option<String>,

    /// Ask for incremental delivery unless disabled.
    pub stream: bool,

    pub transport: TransportKind,

    /// Program spawned by the curl transport.
    pub curl_program: String,

    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,

    /// How long a cancelled transport gets to exit before it is killed.
    pub cancel_grace_millis: u64,

    /// Per-provider overrides, keyed by registered provider name.
    pub providers: HashMap<String, ProviderSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: None,
            stream: true,
            transport: TransportKind::Curl,
            curl_program: "curl".to_string(),
            request_timeout_secs: 300,
            connect_timeout_secs: 30,
            cancel_grace_millis: 2000,
            providers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Curl,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Transport-level limits shared by every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request: Duration,
    pub connect: Duration,
    pub cancel_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Config::default().timeouts()
    }
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            request: Duration::from_secs(self.request_timeout_secs),
            connect: Duration::from_secs(self.connect_timeout_secs),
            cancel_grace: Duration::from_millis(self.cancel_grace_millis),
        }
    }
}
