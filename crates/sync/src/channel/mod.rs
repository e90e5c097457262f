//! Resource channel: one persistent duplex link per collection.
//!
//! [`ResourceChannel::spawn`] starts a tokio task that owns the channel's
//! [`Supervisor`](crate::Supervisor), [`Correlator`](crate::Correlator),
//! [`ResourceCache`](crate::ResourceCache) and outbox. Nothing else touches
//! them: callers talk to the task through a [`ChannelHandle`], which queues
//! commands on a single-consumer mpsc and reads published state from watch
//! channels.
//!
//! # Inbound routing
//!
//! * `snapshot`/`added`/`updated`/`removed` are applied to the cache whatever
//!   their `req_id`, and the resulting delta is published.
//! * Frames carrying a `req_id` are then offered to the correlator.
//! * `error` frames are surfaced to observers and to the waiting caller.
//! * A frame that does not decode is dropped; the link stays up.
//!
//! # Disconnects
//!
//! Requests already written to a link that goes away resolve with
//! [`Error::Cancelled`](crate::Error::Cancelled). Requests queued while
//! disconnected stay in the outbox and are flushed after the next connect,
//! ahead of the snapshot request.

mod actor;
mod handle;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use switchboard_proto::Identified;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

pub use self::handle::ChannelHandle;
use crate::cache::Delta;
use crate::config::SyncConfig;
use crate::kind::ResourceKind;
use crate::observer::EventBus;
use crate::supervisor::ConnectionState;
use crate::transport::{Endpoint, Transport};

/// Records a channel can cache.
pub trait Record: Identified + Clone + PartialEq + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Identified + Clone + PartialEq + DeserializeOwned + Send + Sync + 'static {}

/// Notification published by a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent<R> {
	/// A connect attempt started.
	Connecting {
		/// Failed attempts since the last successful connect.
		failures: u32,
	},
	/// The link is up.
	Connected,
	/// The link went away or a connect attempt failed.
	Disconnected {
		/// Transport-level cause.
		reason: String,
		/// Delay before the next attempt.
		retry_in: Duration,
	},
	/// The cache changed.
	Delta(Delta<R>),
	/// The server answered with an `error` frame.
	ServerError(String),
	/// A frame was dropped because it did not decode.
	ProtocolError(String),
}

/// Spawner for resource channel actors.
pub struct ResourceChannel;

impl ResourceChannel {
	/// Starts a channel for `kind` and returns its handle.
	///
	/// The endpoint's path is taken from `kind`. The first connect attempt is
	/// made immediately. Must be called from within a tokio runtime.
	pub fn spawn<R: Record>(kind: ResourceKind, transport: Arc<dyn Transport>, endpoint: &Endpoint, config: SyncConfig) -> ChannelHandle<R> {
		let endpoint = endpoint.for_path(kind.path());
		let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
		let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
		let (records_tx, records_rx) = watch::channel(Arc::new(Vec::new()));
		let events = EventBus::new();
		let cancel = CancellationToken::new();

		let actor = actor::ChannelActor::new(kind, transport, endpoint, config, state_tx, records_tx, events.clone());
		tokio::spawn(actor.run(cmd_rx, cancel.clone()));

		ChannelHandle::new(kind, cmd_tx, state_rx, records_rx, events, cancel)
	}
}
