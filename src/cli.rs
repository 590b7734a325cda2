use chatpipe::TransportKind;
use clap::{Parser, Subcommand};

/// Send a prompt to an LLM provider and stream the reply to stdout
#[derive(Debug, Parser)]
#[command(name = "chatpipe")]
#[command(version)]
#[command(about = "Streaming chat client for several LLM providers", long_about = None)]
pub struct Args {
    /// Provider name (default: config `provider` or "openai")
    #[arg(short = 'p', long = "provider")]
    pub provider: Option<String>,

    /// Model name (default: config `providers.<name>.model` or the provider default)
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// System prompt sent before the user message
    #[arg(long = "system", value_name = "TEXT")]
    pub system: Option<String>,

    /// Wait for the whole response instead of streaming it
    #[arg(long = "no-stream")]
    pub no_stream: bool,

    /// Override the configured transport
    #[arg(long = "transport", value_enum)]
    pub transport: Option<TransportKind>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text; read from stdin when omitted
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List registered providers with their resolved model and endpoint
    Providers,
}
