mod app;
mod cli;

use anyhow::Context;
use chatpipe::{paths, Config, Message, RequestDescriptor};
use clap::Parser;
use std::io::{IsTerminal, Read};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config_file = paths::config_file()?;
    let cfg = Config::load_optional(&config_file)?.unwrap_or_default();
    tracing::debug!(?config_file, provider = ?cfg.provider, transport = ?cfg.transport, "resolved config");

    let streaming = cfg.stream && !args.no_stream;
    let session = app::build_session(&cfg, args.transport)?;

    if let Some(cli::Command::Providers) = args.cmd {
        app::cmd_providers(&session, streaming)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() && !std::io::stdin().is_terminal() {
        std::io::stdin()
            .read_to_string(&mut prompt)
            .context("failed to read prompt from stdin")?;
    }
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: chatpipe \"Hello\" or pipe text on stdin");
    }

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(prompt.trim()));

    let provider = args.provider.unwrap_or_else(|| app::default_provider(&cfg));
    let mut desc = RequestDescriptor::new(provider, messages).streaming(streaming);
    if let Some(model) = args.model {
        desc = desc.with_model(model);
    }

    app::cmd_send(&session, desc).await
}
