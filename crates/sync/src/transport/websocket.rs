//! WebSocket transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::{Endpoint, Link, Transport};
use crate::{Error, Result};

/// Connects resource channels over WebSocket text frames.
///
/// The token travels as a query parameter; TLS is chosen by the URL scheme.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
	async fn connect(&self, endpoint: &Endpoint) -> Result<Link> {
		let url = endpoint.url()?;
		let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
			.await
			.map_err(|e| Error::Transport(format!("connect {endpoint}: {e}")))?;
		debug!(endpoint = %endpoint, "sync.ws.connected");

		let (mut sink, mut stream) = ws.split();
		let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
		let (in_tx, in_rx) = mpsc::unbounded_channel::<Result<String>>();
		let label = endpoint.to_string();

		tokio::spawn(async move {
			loop {
				tokio::select! {
					frame = out_rx.recv() => match frame {
						Some(text) => {
							if let Err(e) = sink.send(Message::Text(text.into())).await {
								warn!(endpoint = %label, error = %e, "sync.ws.write_failed");
								let _ = in_tx.send(Err(Error::Transport(e.to_string())));
								break;
							}
						}
						None => {
							let _ = sink.close().await;
							break;
						}
					},
					msg = stream.next() => match msg {
						Some(Ok(Message::Text(text))) => {
							if in_tx.send(Ok(text.as_str().to_owned())).is_err() {
								break;
							}
						}
						Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
							Ok(text) => {
								if in_tx.send(Ok(text)).is_err() {
									break;
								}
							}
							Err(_) => warn!(endpoint = %label, len = bytes.len(), "sync.ws.non_utf8_frame_dropped"),
						},
						Some(Ok(Message::Close(frame))) => {
							debug!(endpoint = %label, ?frame, "sync.ws.closed_by_peer");
							break;
						}
						Some(Ok(_)) => {}
						Some(Err(e)) => {
							let _ = in_tx.send(Err(Error::Transport(e.to_string())));
							break;
						}
						None => break,
					},
				}
			}
		});

		Ok(Link {
			outbound: out_tx,
			inbound: in_rx,
		})
	}
}
