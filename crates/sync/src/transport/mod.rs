//! Duplex text-frame transports.
//!
//! A [`Transport`] opens a [`Link`]: a pair of channels carrying whole text frames.
//! The link's I/O runs in its own task, so the channel actor only ever sees
//! frames, transport errors, or a closed inbound queue (graceful close).

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::{Error, Result};

pub mod memory;
pub mod websocket;

pub use memory::{MemoryPeer, MemoryTransport, ServerConn};
pub use websocket::WebSocketTransport;

/// Where a resource channel connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	/// Server base URL (`wss://host:port/ws`).
	pub base_url: String,
	/// Channel path appended to the base (`sessions`, `files`, ...).
	pub path: String,
	/// Credential passed as the `token` query parameter at connect time.
	pub token: Option<String>,
}

impl Endpoint {
	/// Creates an unauthenticated endpoint.
	pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			path: path.into(),
			token: None,
		}
	}

	/// Sets the connect-time token.
	#[must_use]
	pub fn with_token(mut self, token: impl Into<String>) -> Self {
		self.token = Some(token.into());
		self
	}

	/// Same server and credentials, different channel.
	#[must_use]
	pub fn for_path(&self, path: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			..self.clone()
		}
	}

	/// Full connect URL: `<base>/<path>?token=<token>`.
	pub fn url(&self) -> Result<Url> {
		let mut base = Url::parse(&self.base_url).map_err(|e| Error::Config(format!("invalid server url {}: {e}", self.base_url)))?;
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}
		let mut url = base
			.join(self.path.trim_start_matches('/'))
			.map_err(|e| Error::Config(format!("invalid channel path {}: {e}", self.path)))?;
		if let Some(token) = &self.token {
			url.query_pairs_mut().append_pair("token", token);
		}
		Ok(url)
	}
}

impl std::fmt::Display for Endpoint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}/{}", self.base_url.trim_end_matches('/'), self.path.trim_start_matches('/'))
	}
}

/// An open duplex link.
///
/// Dropping `outbound` asks the I/O task to close the connection. `inbound`
/// yields `Err` on transport failure and `None` on graceful close.
#[derive(Debug)]
pub struct Link {
	/// Frames to write.
	pub outbound: mpsc::UnboundedSender<String>,
	/// Frames read.
	pub inbound: mpsc::UnboundedReceiver<Result<String>>,
}

impl Link {
	/// Queues a frame for writing. Fails once the I/O task is gone.
	pub fn send(&self, frame: String) -> Result<()> {
		self.outbound
			.send(frame)
			.map_err(|_| Error::Transport("link closed".into()))
	}
}

/// Connector for resource channels.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	/// Opens a link to `endpoint`.
	async fn connect(&self, endpoint: &Endpoint) -> Result<Link>;
}
