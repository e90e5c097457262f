//! `switchboard`: command-line client for the operator console.
//!
//! Every subcommand opens the resource channels it needs over WebSocket and
//! drives them through the sync engine, so reconnects, request correlation
//! and listing retries behave exactly as in the interactive console.

mod cli;
mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use commands::Console;
use config::ConsoleConfig;
use switchboard_sync::transport::WebSocketTransport;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	setup_tracing(cli.verbose);

	let mut config = ConsoleConfig::discover(cli.config.as_deref())?;
	config.apply_cli(&cli);
	let endpoint = config.endpoint()?;
	info!(server = %endpoint.base_url, "starting switchboard");

	let console = Console {
		config,
		endpoint,
		transport: Arc::new(WebSocketTransport),
	};

	match cli.command {
		Command::Watch { kind, sort, desc } => commands::watch(&console, kind, sort, desc).await,
		Command::Ls { session, paths } => commands::ls(&console, &session, paths).await,
		Command::Get { session } => commands::get(&console, &session).await,
		Command::Kill { session } => commands::kill(&console, &session).await,
		Command::Exec { session, command } => commands::exec(&console, &session, &command).await,
	}
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::fmt::format::FmtSpan;
	use tracing_subscriber::prelude::*;

	let default_filter = || {
		if verbose {
			EnvFilter::new("switchboard_sync=debug,switchboard_cli=debug,info")
		} else {
			EnvFilter::new("info")
		}
	};

	// SWITCHBOARD_LOG_DIR keeps stdout clean for table output.
	if let Some(log_dir) = std::env::var("SWITCHBOARD_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("switchboard.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_span_events(FmtSpan::CLOSE)
				.with_target(true);

			tracing_subscriber::registry().with(filter).with(file_layer).init();

			tracing::info!(path = ?log_path, "tracing initialized");
			return;
		}
	}

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter()))
		.with_writer(std::io::stderr)
		.init();
}
