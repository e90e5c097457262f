//! Console configuration file.
//!
//! ```toml
//! server_url = "wss://console.example:8443/ws"
//! token = "..."
//! prefs_path = "/home/op/.config/switchboard/prefs.json"
//!
//! [sync]
//! heartbeat_interval_ms = 20000
//! backoff_ceiling_ms = 10000
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::Deserialize;
use switchboard_sync::{Endpoint, SyncConfig};

use crate::cli::Cli;

const APP_DIR: &str = "switchboard";

/// Settings read from `config.toml`, then overridden by flags.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
	/// Server base URL.
	pub server_url: Option<String>,
	/// Connect-time token.
	pub token: Option<String>,
	/// Where view preferences are kept.
	pub prefs_path: Option<PathBuf>,
	/// Engine tunables.
	pub sync: SyncConfig,
}

impl ConsoleConfig {
	/// `<config dir>/switchboard/config.toml`.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
	}

	/// Parses and validates a configuration file.
	pub fn load(path: &Path) -> anyhow::Result<Self> {
		let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
		Self::parse(&text).with_context(|| format!("in {}", path.display()))
	}

	/// Parses and validates configuration text.
	pub fn parse(text: &str) -> anyhow::Result<Self> {
		let config: Self = toml::from_str(text)?;
		config.sync.validate()?;
		Ok(config)
	}

	/// Loads `explicit` if given (it must exist), else the default file if present.
	pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Self> {
		if let Some(path) = explicit {
			return Self::load(path);
		}
		match Self::default_path() {
			Some(path) if path.exists() => Self::load(&path),
			_ => Ok(Self::default()),
		}
	}

	/// Applies command-line overrides.
	pub fn apply_cli(&mut self, cli: &Cli) {
		if let Some(server) = &cli.server {
			self.server_url = Some(server.clone());
		}
		if let Some(token) = &cli.token {
			self.token = Some(token.clone());
		}
	}

	/// Base endpoint shared by every channel.
	pub fn endpoint(&self) -> anyhow::Result<Endpoint> {
		let Some(url) = &self.server_url else {
			bail!("no server configured; pass --server or set server_url in the config file");
		};
		let endpoint = Endpoint::new(url.clone(), "");
		endpoint.url()?;
		Ok(match &self.token {
			Some(token) => endpoint.with_token(token.clone()),
			None => endpoint,
		})
	}

	/// Preferences file, falling back to `<config dir>/switchboard/prefs.json`.
	pub fn prefs_path(&self) -> Option<PathBuf> {
		self.prefs_path
			.clone()
			.or_else(|| dirs::config_dir().map(|d| d.join(APP_DIR).join("prefs.json")))
	}
}
