//! Public handle to a resource channel.

use std::sync::Arc;
use std::time::Duration;

use switchboard_proto::{Inbound, Params};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::ChannelEvent;
use super::actor::Command;
use crate::correlator::ReplyCallback;
use crate::kind::ResourceKind;
use crate::observer::{EventBus, Subscription};
use crate::supervisor::ConnectionState;
use crate::{Error, Result};

/// Handle to a running resource channel.
///
/// Cheap to clone. The channel shuts down when [`ChannelHandle::shutdown`] is
/// called or when every handle has been dropped.
pub struct ChannelHandle<R> {
	kind: ResourceKind,
	cmd_tx: mpsc::UnboundedSender<Command>,
	state_rx: watch::Receiver<ConnectionState>,
	records_rx: watch::Receiver<Arc<Vec<R>>>,
	events: EventBus<ChannelEvent<R>>,
	cancel: CancellationToken,
}

impl<R> Clone for ChannelHandle<R> {
	fn clone(&self) -> Self {
		Self {
			kind: self.kind,
			cmd_tx: self.cmd_tx.clone(),
			state_rx: self.state_rx.clone(),
			records_rx: self.records_rx.clone(),
			events: self.events.clone(),
			cancel: self.cancel.clone(),
		}
	}
}

impl<R> std::fmt::Debug for ChannelHandle<R> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChannelHandle")
			.field("kind", &self.kind)
			.field("state", &*self.state_rx.borrow())
			.finish_non_exhaustive()
	}
}

impl<R: 'static> ChannelHandle<R> {
	pub(super) fn new(
		kind: ResourceKind,
		cmd_tx: mpsc::UnboundedSender<Command>,
		state_rx: watch::Receiver<ConnectionState>,
		records_rx: watch::Receiver<Arc<Vec<R>>>,
		events: EventBus<ChannelEvent<R>>,
		cancel: CancellationToken,
	) -> Self {
		Self {
			kind,
			cmd_tx,
			state_rx,
			records_rx,
			events,
			cancel,
		}
	}

	/// Collection this channel serves.
	pub fn kind(&self) -> ResourceKind {
		self.kind
	}

	/// Sends a request, optionally parking `callback` for its reply.
	///
	/// Returns as soon as the request is queued. While disconnected the request
	/// waits in the outbox; if the outbox is full, `callback` receives
	/// [`Error::Transport`].
	pub fn send(&self, action: impl Into<String>, params: Params, callback: Option<ReplyCallback>) -> Result<()> {
		self.enqueue(action.into(), params, callback, None)
	}

	/// Like [`ChannelHandle::send`], but `callback` resolves with
	/// [`Error::Timeout`] after `timeout` instead of the configured request timeout.
	pub fn send_with_timeout(
		&self,
		action: impl Into<String>,
		params: Params,
		callback: ReplyCallback,
		timeout: Duration,
	) -> Result<()> {
		self.enqueue(action.into(), params, Some(callback), Some(timeout))
	}

	fn enqueue(&self, action: String, params: Params, callback: Option<ReplyCallback>, timeout: Option<Duration>) -> Result<()> {
		self.cmd_tx
			.send(Command::Send {
				action,
				params,
				callback,
				timeout,
			})
			.map_err(|_| Error::ServiceStopped)
	}

	/// Sends a request and waits for its reply.
	///
	/// Resolves with [`Error::Server`] for an `error` reply and
	/// [`Error::Cancelled`] if the link drops after the request was written.
	pub async fn request(&self, action: impl Into<String>, params: Params) -> Result<Inbound> {
		let (reply_tx, reply_rx) = oneshot::channel();
		let callback: ReplyCallback = Box::new(move |outcome| {
			let _ = reply_tx.send(outcome);
		});
		self.send(action, params, Some(callback))?;
		reply_rx.await.map_err(|_| Error::ServiceStopped)?
	}

	/// Registers an observer callback.
	#[must_use = "dropping the subscription unregisters the callback"]
	pub fn subscribe(&self, callback: impl Fn(&ChannelEvent<R>) + Send + Sync + 'static) -> Subscription {
		self.events.subscribe(callback)
	}

	/// The channel's event bus.
	pub fn events(&self) -> &EventBus<ChannelEvent<R>> {
		&self.events
	}

	/// Latest published cache contents.
	pub fn records(&self) -> Arc<Vec<R>> {
		Arc::clone(&self.records_rx.borrow())
	}

	/// Receiver for cache contents, updated after every non-empty delta.
	pub fn watch_records(&self) -> watch::Receiver<Arc<Vec<R>>> {
		self.records_rx.clone()
	}

	/// Current connection state.
	pub fn state(&self) -> ConnectionState {
		*self.state_rx.borrow()
	}

	/// Receiver for connection state changes.
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.state_rx.clone()
	}

	/// Waits until the channel is connected.
	pub async fn connected(&self) -> Result<()> {
		let mut rx = self.state_rx.clone();
		rx.wait_for(|s| *s == ConnectionState::Connected)
			.await
			.map(|_| ())
			.map_err(|_| Error::ServiceStopped)
	}

	/// Whether the actor is still running.
	pub fn is_running(&self) -> bool {
		!self.cmd_tx.is_closed()
	}

	/// Stops the channel and waits for its task to finish.
	///
	/// Every pending callback resolves with [`Error::Cancelled`] and the cache
	/// is cleared. Idempotent.
	pub async fn shutdown(&self) {
		self.cancel.cancel();
		self.cmd_tx.closed().await;
	}
}
