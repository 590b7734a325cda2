//! Streaming chat-completion pipeline for several LLM providers.
//!
//! A [`RequestDescriptor`] is resolved against the [`ProviderRegistry`] into a
//! provider-specific HTTP request, executed by a [`Transport`], and decoded
//! into ordered text chunks delivered to a [`Sink`], followed by exactly one
//! terminal outcome.

pub mod classify;
pub mod config;
pub mod context;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod paths;
pub mod provider;
pub mod registry;
pub mod request;
pub mod session;
pub mod sink;
pub mod transport;

pub use config::{Config, Timeouts, TransportKind};
pub use engine::{ExecutionEngine, Outcome};
pub use error::{PipelineError, Result};
pub use provider::{Message, Provider, RequestDescriptor, RequestOptions, Role};
pub use registry::ProviderRegistry;
pub use session::{CancelStatus, RequestHandle, SessionManager};
pub use sink::{ChannelSink, Sink, SinkEvent};
pub use transport::{CurlTransport, HttpTransport, Transport};
