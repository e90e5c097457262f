//! The task that owns one channel's state machines.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use switchboard_proto::{Inbound, MessageKind, Params, RequestId, action};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{ChannelEvent, Record};
use crate::cache::{Delta, ResourceCache};
use crate::config::SyncConfig;
use crate::correlator::{Correlator, ReplyCallback};
use crate::kind::ResourceKind;
use crate::observer::EventBus;
use crate::supervisor::{ConnectionState, Supervisor};
use crate::transport::{Endpoint, Link, Transport};
use crate::{Error, Result};

/// Message from a handle to the actor.
pub(crate) enum Command {
	Send {
		action: String,
		params: Params,
		callback: Option<ReplyCallback>,
		/// Overrides the configured request timeout.
		timeout: Option<Duration>,
	},
}

/// A request encoded while no link was up.
struct Queued {
	id: RequestId,
	frame: String,
	/// Whether a callback is parked for it; untracked requests never expire.
	tracked: bool,
}

pub(super) struct ChannelActor<R> {
	kind: ResourceKind,
	transport: Arc<dyn Transport>,
	endpoint: Endpoint,
	config: SyncConfig,
	supervisor: Supervisor,
	correlator: Correlator,
	cache: ResourceCache<R>,
	outbox: VecDeque<Queued>,
	link: Option<Link>,
	connecting: Option<BoxFuture<'static, Result<Link>>>,
	state_tx: watch::Sender<ConnectionState>,
	records_tx: watch::Sender<Arc<Vec<R>>>,
	events: EventBus<ChannelEvent<R>>,
}

impl<R: Record> ChannelActor<R> {
	pub(super) fn new(
		kind: ResourceKind,
		transport: Arc<dyn Transport>,
		endpoint: Endpoint,
		config: SyncConfig,
		state_tx: watch::Sender<ConnectionState>,
		records_tx: watch::Sender<Arc<Vec<R>>>,
		events: EventBus<ChannelEvent<R>>,
	) -> Self {
		let supervisor = Supervisor::new(&config, Instant::now());
		Self {
			kind,
			transport,
			endpoint,
			config,
			supervisor,
			correlator: Correlator::new(),
			cache: ResourceCache::new(),
			outbox: VecDeque::new(),
			link: None,
			connecting: None,
			state_tx,
			records_tx,
			events,
		}
	}

	pub(super) async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
		debug!(channel = %self.kind, endpoint = %self.endpoint, "sync.channel.start");
		loop {
			let wake = self.next_wake();
			tokio::select! {
				_ = cancel.cancelled() => break,
				cmd = cmd_rx.recv() => match cmd {
					Some(cmd) => self.on_command(cmd, Instant::now()),
					None => break,
				},
				result = poll_connect(&mut self.connecting) => {
					self.connecting = None;
					self.on_connect_result(result, Instant::now());
				}
				frame = recv_link(&mut self.link) => match frame {
					Some(Ok(text)) => self.on_frame(&text, Instant::now()),
					Some(Err(e)) => self.on_link_lost(&e.to_string(), Instant::now()),
					None => self.on_link_lost("closed by peer", Instant::now()),
				},
				_ = sleep_until(wake) => self.on_timer(Instant::now()),
			}
		}
		self.teardown(&mut cmd_rx);
	}

	fn on_command(&mut self, cmd: Command, now: Instant) {
		match cmd {
			Command::Send {
				action,
				params,
				callback,
				timeout,
			} => {
				let max_age = timeout.or(self.config.request_timeout());
				self.send_request(&action, params, callback, max_age, now);
			}
		}
	}

	fn send_request(&mut self, action: &str, params: Params, callback: Option<ReplyCallback>, max_age: Option<Duration>, now: Instant) {
		if self.link.is_none() && self.outbox.len() >= self.config.outbox_limit {
			warn!(channel = %self.kind, action, limit = self.config.outbox_limit, "sync.channel.outbox_full");
			if let Some(callback) = callback {
				callback(Err(Error::Transport("outbox full".into())));
			}
			return;
		}

		let (id, frame) = self.correlator.register(action, params, callback, now, max_age);
		if self.link.is_some() {
			self.write(id, frame, now);
		} else {
			trace!(channel = %self.kind, req_id = %id, action, "sync.channel.queued");
			let tracked = self.correlator.contains(&id);
			self.outbox.push_back(Queued { id, frame, tracked });
		}
	}

	/// Writes to the live link; on failure the frame goes back to the outbox and the link is dropped.
	fn write(&mut self, id: RequestId, frame: String, now: Instant) {
		let tracked = self.correlator.contains(&id);
		let Some(link) = &self.link else {
			self.outbox.push_back(Queued { id, frame, tracked });
			return;
		};
		match link.send(frame.clone()) {
			Ok(()) => self.correlator.mark_written(&id),
			Err(e) => {
				self.outbox.push_front(Queued { id, frame, tracked });
				self.on_link_lost(&e.to_string(), now);
			}
		}
	}

	fn on_connect_result(&mut self, result: Result<Link>, now: Instant) {
		match result {
			Ok(link) => {
				self.supervisor.on_connected(now);
				self.link = Some(link);
				info!(channel = %self.kind, endpoint = %self.endpoint, "sync.channel.connected");
				self.publish_state();
				self.events.emit(&ChannelEvent::Connected);

				if !self.outbox.is_empty() {
					debug!(channel = %self.kind, count = self.outbox.len(), "sync.channel.flush_outbox");
				}
				while let Some(Queued { id, frame, .. }) = self.outbox.pop_front() {
					self.write(id, frame, now);
					if self.link.is_none() {
						return;
					}
				}

				if let Some(snapshot) = self.kind.snapshot_action() {
					let (id, frame) = self.correlator.register(snapshot, Params::new(), None, now, None);
					self.write(id, frame, now);
				}
			}
			Err(e) => {
				let retry_in = self.supervisor.on_disconnected(now);
				warn!(
					channel = %self.kind,
					error = %e,
					failures = self.supervisor.failures(),
					retry_ms = retry_in.as_millis() as u64,
					"sync.channel.connect_failed"
				);
				self.publish_state();
				self.events.emit(&ChannelEvent::Disconnected {
					reason: e.to_string(),
					retry_in,
				});
			}
		}
	}

	fn on_link_lost(&mut self, reason: &str, now: Instant) {
		if self.link.take().is_none() {
			return;
		}
		let cancelled = self.correlator.cancel_written();
		let retry_in = self.supervisor.on_disconnected(now);
		warn!(
			channel = %self.kind,
			reason,
			cancelled,
			queued = self.outbox.len(),
			retry_ms = retry_in.as_millis() as u64,
			"sync.channel.disconnected"
		);
		self.publish_state();
		self.events.emit(&ChannelEvent::Disconnected {
			reason: reason.to_owned(),
			retry_in,
		});
	}

	fn on_frame(&mut self, text: &str, now: Instant) {
		self.supervisor.on_inbound(now);
		let frame = match Inbound::decode(text) {
			Ok(frame) => frame,
			Err(e) => {
				warn!(channel = %self.kind, error = %e, "sync.channel.protocol_error");
				self.events.emit(&ChannelEvent::ProtocolError(e.to_string()));
				return;
			}
		};

		match frame.message_kind() {
			kind if kind.is_push() => match frame.push::<R>() {
				Ok(Some(push)) => {
					let delta = self.cache.apply(push);
					self.publish_delta(delta);
				}
				Ok(None) => {}
				Err(e) => {
					warn!(channel = %self.kind, error = %e, "sync.channel.protocol_error");
					self.events.emit(&ChannelEvent::ProtocolError(e.to_string()));
					return;
				}
			},
			MessageKind::Error => {
				let message = frame.error_message().unwrap_or_default().to_owned();
				info!(channel = %self.kind, req_id = ?frame.req_id, error = %message, "sync.channel.server_error");
				self.events.emit(&ChannelEvent::ServerError(message));
			}
			MessageKind::Pong => trace!(channel = %self.kind, "sync.channel.pong"),
			_ => {}
		}

		if frame.req_id.is_some() {
			self.correlator.on_reply(frame);
		}
	}

	fn on_timer(&mut self, now: Instant) {
		if self.supervisor.state() == ConnectionState::Disconnected
			&& self.connecting.is_none()
			&& self.supervisor.reconnect_at().is_some_and(|at| now >= at)
		{
			self.begin_connect();
		}

		if self.supervisor.is_idle(now) {
			self.on_link_lost("idle timeout", now);
		}

		if self.supervisor.next_heartbeat().is_some_and(|at| now >= at) {
			let (id, frame) = self.correlator.register(action::PING, Params::new(), None, now, None);
			trace!(channel = %self.kind, req_id = %id, "sync.channel.ping");
			self.supervisor.heartbeat_sent(now);
			if let Some(Err(e)) = self.link.as_ref().map(|link| link.send(frame)) {
				self.on_link_lost(&e.to_string(), now);
			}
		}

		if self.correlator.expire(now) > 0 {
			let correlator = &self.correlator;
			self.outbox.retain(|q| !q.tracked || correlator.contains(&q.id));
		}
	}

	fn begin_connect(&mut self) {
		if !self.supervisor.begin_connect() {
			return;
		}
		debug!(channel = %self.kind, failures = self.supervisor.failures(), "sync.channel.connecting");
		self.publish_state();
		self.events.emit(&ChannelEvent::Connecting {
			failures: self.supervisor.failures(),
		});

		let transport = Arc::clone(&self.transport);
		let endpoint = self.endpoint.clone();
		self.connecting = Some(Box::pin(async move { transport.connect(&endpoint).await }));
	}

	fn next_wake(&self) -> Option<Instant> {
		let reconnect = if self.connecting.is_none() { self.supervisor.reconnect_at() } else { None };
		[
			reconnect,
			self.supervisor.next_heartbeat(),
			self.supervisor.idle_deadline(),
			self.correlator.next_expiry(),
		]
			.into_iter()
			.flatten()
			.min()
	}

	fn publish_state(&self) {
		self.state_tx.send_replace(self.supervisor.state());
	}

	fn publish_delta(&self, delta: Delta<R>) {
		if delta.is_empty() {
			return;
		}
		debug!(
			channel = %self.kind,
			added = delta.added.len(),
			removed = delta.removed.len(),
			changed = delta.changed.len(),
			"sync.channel.delta"
		);
		self.records_tx.send_replace(Arc::new(self.cache.to_vec()));
		self.events.emit(&ChannelEvent::Delta(delta));
	}

	fn teardown(mut self, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) {
		cmd_rx.close();
		while let Ok(Command::Send { callback, .. }) = cmd_rx.try_recv() {
			if let Some(callback) = callback {
				callback(Err(Error::ServiceStopped));
			}
		}
		self.correlator.cancel_all();
		self.outbox.clear();
		self.link = None;
		self.connecting = None;
		self.supervisor.shutdown();
		self.cache.clear();
		self.records_tx.send_replace(Arc::new(Vec::new()));
		self.publish_state();
		debug!(channel = %self.kind, "sync.channel.stopped");
	}
}

async fn poll_connect(connecting: &mut Option<BoxFuture<'static, Result<Link>>>) -> Result<Link> {
	match connecting {
		Some(fut) => fut.await,
		None => std::future::pending().await,
	}
}

async fn recv_link(link: &mut Option<Link>) -> Option<Result<String>> {
	match link {
		Some(link) => link.inbound.recv().await,
		None => std::future::pending().await,
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}
