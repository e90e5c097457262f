//! Remote file browser.
//!
//! A [`FileBrowser`] drives one file-listing view over the files channel. Its
//! task owns a [`NavigationController`] and a [`TableView`] of entries, so at
//! most one `list` request is in flight per view and bursts of navigation
//! collapse to the latest target.
//!
//! Requests carry the target `path`; replies (`listing`) echo it next to
//! their `items`. A committed listing replaces the table wholesale, since
//! entries of different directories are unrelated.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use switchboard_proto::{FileEntry, Inbound, Params, Session, action};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::ChannelHandle;
use crate::config::SyncConfig;
use crate::correlator::ReplyCallback;
use crate::nav::{NavAction, NavigationController, ReplyOutcome, TimeoutOutcome};
use crate::observer::{EventBus, Subscription};
use crate::reconcile::{SortSpec, TableView};
use crate::supervisor::ConnectionState;
use crate::{Error, Result};

/// Committed contents of the view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
	/// Directory shown, if any listing was committed yet.
	pub path: Option<String>,
	/// Entries in display order.
	pub entries: Vec<FileEntry>,
}

/// Notification published by a file browser.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserEvent {
	/// A listing was committed or re-sorted.
	Listing(Arc<Listing>),
	/// A reply for a superseded or unknown target was discarded.
	Stale {
		/// Target the reply echoed.
		path: String,
	},
	/// The listing timed out more than once and is being retried.
	Retrying {
		/// Target being retried.
		path: String,
		/// Consecutive timeouts so far.
		attempt: u32,
	},
	/// The navigation was abandoned after repeated timeouts.
	Failed {
		/// Abandoned target.
		path: String,
		/// Always [`Error::Timeout`].
		error: Error,
	},
	/// The server rejected the listing.
	ServerError {
		/// Requested target.
		path: String,
		/// Server message.
		message: String,
	},
}

enum BrowserCommand {
	Navigate(String),
	SetSort(Option<SortSpec>),
}

/// A listing outcome delivered back to the browser task.
struct ListReply {
	target: String,
	/// Send counter value of the request this answers.
	sent: u64,
	outcome: Result<Inbound>,
}

/// Handle to a running file browser.
///
/// The browser task stops once every handle has been dropped or the files
/// channel stops.
#[derive(Debug, Clone)]
pub struct FileBrowser {
	cmd_tx: mpsc::UnboundedSender<BrowserCommand>,
	events: EventBus<BrowserEvent>,
	listing_rx: watch::Receiver<Arc<Listing>>,
}

impl std::fmt::Debug for BrowserCommand {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Navigate(path) => f.debug_tuple("Navigate").field(path).finish(),
			Self::SetSort(sort) => f.debug_tuple("SetSort").field(sort).finish(),
		}
	}
}

impl FileBrowser {
	/// Starts a browser for `session` over a files channel.
	///
	/// Polled sessions get a busy-timeout of two beacon intervals plus grace;
	/// push sessions use the push default.
	pub fn spawn(channel: ChannelHandle<FileEntry>, session: &Session, config: &SyncConfig, sort: Option<SortSpec>) -> Self {
		let beacon = session.beacon_interval_ms.map(Duration::from_millis);
		let timeout = config.list_timeout(beacon);
		// Outlives every retry of one navigation, so late replies are still matched.
		let request_lifetime = timeout * config.max_consecutive_timeouts.saturating_add(1);
		let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
		let (listing_tx, listing_rx) = watch::channel(Arc::new(Listing::default()));
		let events = EventBus::new();
		let (reply_tx, reply_rx) = mpsc::unbounded_channel();

		debug!(session = %session.id, timeout_ms = timeout.as_millis() as u64, "sync.browser.start");
		let task = BrowserTask {
			session: session.id.clone(),
			state_rx: channel.watch_state(),
			channel,
			nav: NavigationController::new(timeout, config.max_consecutive_timeouts),
			view: TableView::with_sort(sort),
			resend_on_connect: false,
			sent: 0,
			request_lifetime,
			reply_tx,
			listing_tx,
			events: events.clone(),
		};
		tokio::spawn(task.run(cmd_rx, reply_rx));

		Self { cmd_tx, events, listing_rx }
	}

	/// Requests a listing of `path`.
	pub fn navigate(&self, path: impl Into<String>) -> Result<()> {
		self.cmd_tx
			.send(BrowserCommand::Navigate(path.into()))
			.map_err(|_| Error::ServiceStopped)
	}

	/// Changes the sort of the committed listing.
	pub fn set_sort(&self, sort: Option<SortSpec>) -> Result<()> {
		self.cmd_tx.send(BrowserCommand::SetSort(sort)).map_err(|_| Error::ServiceStopped)
	}

	/// Registers an observer callback.
	#[must_use = "dropping the subscription unregisters the callback"]
	pub fn subscribe(&self, callback: impl Fn(&BrowserEvent) + Send + Sync + 'static) -> Subscription {
		self.events.subscribe(callback)
	}

	/// The browser's event bus.
	pub fn events(&self) -> &EventBus<BrowserEvent> {
		&self.events
	}

	/// Latest committed listing.
	pub fn listing(&self) -> Arc<Listing> {
		Arc::clone(&self.listing_rx.borrow())
	}

	/// Receiver for committed listings.
	pub fn watch_listing(&self) -> watch::Receiver<Arc<Listing>> {
		self.listing_rx.clone()
	}
}

struct BrowserTask {
	session: String,
	channel: ChannelHandle<FileEntry>,
	state_rx: watch::Receiver<ConnectionState>,
	nav: NavigationController,
	view: TableView<FileEntry>,
	/// The in-flight request was lost with the link and must be re-sent.
	resend_on_connect: bool,
	/// Number of listing requests sent so far.
	sent: u64,
	request_lifetime: Duration,
	reply_tx: mpsc::UnboundedSender<ListReply>,
	listing_tx: watch::Sender<Arc<Listing>>,
	events: EventBus<BrowserEvent>,
}

impl BrowserTask {
	async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<BrowserCommand>, mut reply_rx: mpsc::UnboundedReceiver<ListReply>) {
		let mut connected = *self.state_rx.borrow_and_update() == ConnectionState::Connected;
		loop {
			// The busy guard is paused while offline; reconnecting re-arms it.
			let deadline = if connected { self.nav.deadline() } else { None };
			tokio::select! {
				cmd = cmd_rx.recv() => match cmd {
					Some(cmd) => self.on_command(cmd, Instant::now()),
					None => break,
				},
				Some(reply) = reply_rx.recv() => self.on_reply(reply, Instant::now()),
				changed = self.state_rx.changed() => {
					if changed.is_err() {
						break;
					}
					let now_connected = *self.state_rx.borrow_and_update() == ConnectionState::Connected;
					if now_connected && !connected {
						self.on_connected(Instant::now());
					}
					connected = now_connected;
				}
				_ = sleep_until(deadline) => self.on_timeout(Instant::now()),
			}
		}
		debug!(session = %self.session, "sync.browser.stopped");
	}

	fn on_command(&mut self, cmd: BrowserCommand, now: Instant) {
		match cmd {
			BrowserCommand::Navigate(path) => match self.nav.navigate(path, now) {
				NavAction::Send(target) => self.send_list(target),
				NavAction::Queued { .. } => {}
			},
			BrowserCommand::SetSort(sort) => {
				if self.view.set_sort(sort) {
					self.publish();
				}
			}
		}
	}

	fn send_list(&mut self, target: String) {
		self.resend_on_connect = false;
		self.sent += 1;
		let sent = self.sent;
		let mut params = Params::new();
		params.insert("path".into(), Value::String(target.clone()));
		params.insert("session".into(), Value::String(self.session.clone()));

		let reply_tx = self.reply_tx.clone();
		let requested = target.clone();
		let callback: ReplyCallback = Box::new(move |outcome| {
			let _ = reply_tx.send(ListReply {
				target: requested,
				sent,
				outcome,
			});
		});
		debug!(session = %self.session, path = %target, "sync.browser.list");
		if let Err(e) = self.channel.send_with_timeout(action::LIST, params, callback, self.request_lifetime) {
			warn!(session = %self.session, path = %target, error = %e, "sync.browser.send_failed");
		}
	}

	fn on_reply(&mut self, reply: ListReply, now: Instant) {
		let ListReply { target, sent, outcome } = reply;
		let frame = match outcome {
			Ok(frame) => frame,
			Err(Error::Server(message)) => {
				if let ReplyOutcome::Commit(path) = self.resolve_failed(&target, now) {
					info!(session = %self.session, path = %path, error = %message, "sync.browser.server_error");
					self.events.emit(&BrowserEvent::ServerError { path, message });
				}
				return;
			}
			Err(e @ (Error::Cancelled | Error::Timeout(_))) if sent == self.sent && self.nav.in_flight() == Some(target.as_str()) => {
				self.on_request_lost(&e, now);
				return;
			}
			Err(e) => {
				debug!(session = %self.session, path = %target, error = %e, "sync.browser.request_failed");
				return;
			}
		};

		let echoed = frame.get_str("path").unwrap_or(&target).to_owned();
		let entries: Vec<FileEntry> = match frame.field("items") {
			Ok(entries) => entries,
			Err(e) => {
				warn!(session = %self.session, path = %echoed, error = %e, "sync.browser.protocol_error");
				let _ = self.resolve_failed(&echoed, now);
				return;
			}
		};

		match self.nav.on_reply(&echoed, now) {
			ReplyOutcome::Commit(path) => {
				debug!(session = %self.session, path = %path, entries = entries.len(), "sync.browser.commit");
				self.view.rebuild(entries);
				self.publish();
			}
			ReplyOutcome::Superseded { next, .. } => self.send_list(next),
			ReplyOutcome::Stale => self.events.emit(&BrowserEvent::Stale { path: echoed }),
		}
	}

	/// Resolves the in-flight request without committing, draining any pending target.
	fn resolve_failed(&mut self, echoed: &str, now: Instant) -> ReplyOutcome {
		let outcome = self.nav.on_error_reply(echoed, now);
		match &outcome {
			ReplyOutcome::Superseded { next, .. } => self.send_list(next.clone()),
			ReplyOutcome::Stale => self.events.emit(&BrowserEvent::Stale { path: echoed.to_owned() }),
			ReplyOutcome::Commit(_) => {}
		}
		outcome
	}

	fn on_timeout(&mut self, now: Instant) {
		match self.nav.on_timeout(now) {
			TimeoutOutcome::NotDue => {}
			TimeoutOutcome::Retry { target, attempt, escalated } => {
				if escalated {
					self.events.emit(&BrowserEvent::Retrying {
						path: target.clone(),
						attempt,
					});
				}
				self.send_list(target);
			}
			TimeoutOutcome::GaveUp { target, .. } => {
				self.events.emit(&BrowserEvent::Failed {
					error: Error::Timeout(target.clone()),
					path: target,
				});
			}
		}
	}

	/// The latest request for the in-flight target was dropped before any reply.
	fn on_request_lost(&mut self, error: &Error, now: Instant) {
		let connected = *self.state_rx.borrow() == ConnectionState::Connected;
		match error {
			Error::Cancelled if connected => {
				// The link already came back; no transition will follow to re-send it.
				if let Some(target) = self.nav.on_reconnect(now) {
					debug!(session = %self.session, path = %target, "sync.browser.resend");
					self.send_list(target);
				}
			}
			// Expiry with a live link is left to the busy guard.
			_ if connected => {}
			_ => self.resend_on_connect = true,
		}
	}

	fn on_connected(&mut self, now: Instant) {
		let busy = self.nav.is_busy();
		let Some(target) = self.nav.on_reconnect(now) else {
			return;
		};
		if busy && !self.resend_on_connect {
			debug!(session = %self.session, path = %target, "sync.browser.guard_rearmed");
			return;
		}
		debug!(session = %self.session, path = %target, "sync.browser.relist");
		self.send_list(target);
	}

	fn publish(&self) {
		let listing = Arc::new(Listing {
			path: self.nav.committed().map(str::to_owned),
			entries: self.view.rows().to_vec(),
		});
		self.listing_tx.send_replace(Arc::clone(&listing));
		self.events.emit(&BrowserEvent::Listing(listing));
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}

#[cfg(test)]
mod tests;
