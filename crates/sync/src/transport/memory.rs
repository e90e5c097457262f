//! In-process transport.
//!
//! [`MemoryTransport`] hands every accepted connection to a [`MemoryPeer`] which
//! plays the server: it reads client envelopes, writes server frames, and can
//! drop, fail or refuse links. Used by the engine's tests and by demos that run
//! without a backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use switchboard_proto::{Inbound, Outbound};
use tokio::sync::mpsc;
use tracing::warn;

use super::{Endpoint, Link, Transport};
use crate::{Error, Result};

/// Client side of the in-process transport.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
	accept_tx: mpsc::UnboundedSender<ServerConn>,
	refusing: Arc<AtomicBool>,
}

/// Server side of the in-process transport.
#[derive(Debug)]
pub struct MemoryPeer {
	accept_rx: mpsc::UnboundedReceiver<ServerConn>,
	refusing: Arc<AtomicBool>,
}

impl MemoryTransport {
	/// Creates a connected transport/peer pair.
	pub fn pair() -> (Self, MemoryPeer) {
		let (accept_tx, accept_rx) = mpsc::unbounded_channel();
		let refusing = Arc::new(AtomicBool::new(false));
		(
			Self {
				accept_tx,
				refusing: refusing.clone(),
			},
			MemoryPeer { accept_rx, refusing },
		)
	}
}

#[async_trait]
impl Transport for MemoryTransport {
	async fn connect(&self, endpoint: &Endpoint) -> Result<Link> {
		if self.refusing.load(Ordering::Acquire) {
			return Err(Error::Transport(format!("connection refused: {endpoint}")));
		}
		let (out_tx, out_rx) = mpsc::unbounded_channel();
		let (in_tx, in_rx) = mpsc::unbounded_channel();
		let conn = ServerConn {
			endpoint: endpoint.clone(),
			from_client: out_rx,
			to_client: in_tx,
		};
		self.accept_tx
			.send(conn)
			.map_err(|_| Error::Transport("memory peer dropped".into()))?;
		Ok(Link {
			outbound: out_tx,
			inbound: in_rx,
		})
	}
}

impl MemoryPeer {
	/// Waits for the next client connection.
	pub async fn accept(&mut self) -> Option<ServerConn> {
		self.accept_rx.recv().await
	}

	/// Returns an already-pending connection without waiting.
	pub fn try_accept(&mut self) -> Option<ServerConn> {
		self.accept_rx.try_recv().ok()
	}

	/// Makes subsequent connect attempts fail.
	pub fn set_refusing(&self, refusing: bool) {
		self.refusing.store(refusing, Ordering::Release);
	}
}

/// One accepted in-process connection, seen from the server.
#[derive(Debug)]
pub struct ServerConn {
	/// Endpoint the client connected to.
	pub endpoint: Endpoint,
	from_client: mpsc::UnboundedReceiver<String>,
	to_client: mpsc::UnboundedSender<Result<String>>,
}

impl ServerConn {
	/// Next raw client frame; `None` once the client closed the link.
	pub async fn recv_frame(&mut self) -> Option<String> {
		self.from_client.recv().await
	}

	/// Next client envelope, skipping frames that do not decode.
	pub async fn recv(&mut self) -> Option<Outbound> {
		loop {
			let frame = self.from_client.recv().await?;
			match Outbound::decode(&frame) {
				Ok(out) => return Some(out),
				Err(e) => warn!(error = %e, "sync.memory.undecodable_client_frame"),
			}
		}
	}

	/// Next client envelope whose action is not `ping`.
	pub async fn recv_request(&mut self) -> Option<Outbound> {
		loop {
			let out = self.recv().await?;
			if out.action != switchboard_proto::action::PING {
				return Some(out);
			}
		}
	}

	/// Client envelope already queued, without waiting.
	pub fn try_recv(&mut self) -> Option<Outbound> {
		while let Ok(frame) = self.from_client.try_recv() {
			if let Ok(out) = Outbound::decode(&frame) {
				return Some(out);
			}
		}
		None
	}

	/// Writes a server frame. Returns false once the client is gone.
	pub fn send(&self, frame: &Inbound) -> bool {
		self.send_raw(frame.encode())
	}

	/// Writes arbitrary text, well-formed or not.
	pub fn send_raw(&self, text: impl Into<String>) -> bool {
		self.to_client.send(Ok(text.into())).is_ok()
	}

	/// Fails the link with a transport error.
	pub fn fail(self, reason: &str) {
		let _ = self.to_client.send(Err(Error::Transport(reason.to_owned())));
	}

	/// Closes the link gracefully.
	pub fn close(self) {}
}
