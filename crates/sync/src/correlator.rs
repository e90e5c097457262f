//! Request/reply correlation.
//!
//! Every outbound request gets a fresh [`RequestId`]. A callback, if provided, is
//! parked under that id and invoked at most once: by the matching reply, by
//! expiry, or by cancellation when the link it was written to goes away.
//! Replies with unknown or already-consumed ids are ignored, which covers
//! duplicates and late replies after a retry.

use std::collections::HashMap;
use std::time::Duration;

use switchboard_proto::{Inbound, Outbound, Params, RequestId};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{Error, Result};

/// Callback receiving the outcome of one request.
pub type ReplyCallback = Box<dyn FnOnce(Result<Inbound>) + Send>;

struct Pending {
	action: String,
	/// When the request resolves with [`Error::Timeout`], if ever.
	deadline: Option<Instant>,
	/// Whether the frame reached a live link. Unwritten requests survive a disconnect.
	written: bool,
	callback: ReplyCallback,
}

/// Pending-request table for one channel.
///
/// Owned by the channel actor; never shared.
#[derive(Default)]
pub struct Correlator {
	pending: HashMap<RequestId, Pending>,
}

impl std::fmt::Debug for Correlator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Correlator").field("pending", &self.pending.len()).finish()
	}
}

impl Correlator {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Assigns an id to a request, parks `callback`, and returns the encoded frame.
	///
	/// A parked callback older than `max_age` is resolved by [`Correlator::expire`];
	/// `None` keeps it until a reply, cancellation or teardown.
	pub fn register(
		&mut self,
		action: &str,
		params: Params,
		callback: Option<ReplyCallback>,
		now: Instant,
		max_age: Option<Duration>,
	) -> (RequestId, String) {
		let id = RequestId::generate();
		let frame = Outbound::new(action, params, id.clone()).encode();
		if let Some(callback) = callback {
			self.pending.insert(
				id.clone(),
				Pending {
					action: action.to_owned(),
					deadline: max_age.map(|age| now + age),
					written: false,
					callback,
				},
			);
		}
		trace!(req_id = %id, action, "sync.correlator.register");
		(id, frame)
	}

	/// Records that the request's frame was handed to a live link.
	pub fn mark_written(&mut self, id: &RequestId) {
		if let Some(p) = self.pending.get_mut(id) {
			p.written = true;
		}
	}

	/// Dispatches a reply to its callback.
	///
	/// `error` frames resolve the callback with [`Error::Server`]. Returns false
	/// when the frame carries no id or the id is unknown.
	pub fn on_reply(&mut self, frame: Inbound) -> bool {
		let Some(id) = frame.req_id.clone() else {
			return false;
		};
		let Some(pending) = self.pending.remove(&id) else {
			debug!(req_id = %id, kind = %frame.kind, "sync.correlator.unmatched_reply");
			return false;
		};
		let outcome = match frame.error_message() {
			Some(msg) => Err(Error::Server(msg.to_owned())),
			None => Ok(frame),
		};
		(pending.callback)(outcome);
		true
	}

	/// Cancels every request already written to a link that has now closed.
	///
	/// Returns the number of cancelled requests.
	pub fn cancel_written(&mut self) -> usize {
		let ids: Vec<_> = self.pending.iter().filter(|(_, p)| p.written).map(|(id, _)| id.clone()).collect();
		for id in &ids {
			if let Some(p) = self.pending.remove(id) {
				(p.callback)(Err(Error::Cancelled));
			}
		}
		ids.len()
	}

	/// Cancels everything, written or not. Used on teardown.
	pub fn cancel_all(&mut self) {
		for (_, p) in self.pending.drain() {
			(p.callback)(Err(Error::Cancelled));
		}
	}

	/// Resolves requests past their deadline with [`Error::Timeout`].
	pub fn expire(&mut self, now: Instant) -> usize {
		let ids: Vec<_> = self
			.pending
			.iter()
			.filter(|(_, p)| p.deadline.is_some_and(|deadline| now >= deadline))
			.map(|(id, _)| id.clone())
			.collect();
		for id in &ids {
			if let Some(p) = self.pending.remove(id) {
				debug!(req_id = %id, action = %p.action, "sync.correlator.expired");
				(p.callback)(Err(Error::Timeout(p.action)));
			}
		}
		ids.len()
	}

	/// Earliest instant at which [`Correlator::expire`] could resolve something.
	pub fn next_expiry(&self) -> Option<Instant> {
		self.pending.values().filter_map(|p| p.deadline).min()
	}

	/// Whether a callback is parked under `id`.
	pub fn contains(&self, id: &RequestId) -> bool {
		self.pending.contains_key(id)
	}

	/// Number of parked callbacks.
	pub fn len(&self) -> usize {
		self.pending.len()
	}

	/// Whether no callback is parked.
	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}
}
