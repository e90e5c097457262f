//! Real-time resource synchronization engine for the operator console.
//!
//! Each remote collection (sessions, listeners, operators, file listings) is kept
//! live over its own persistent duplex channel. The engine is layered leaf-first:
//!
//! * [`correlator::Correlator`]: request ids, pending replies, at-most-once dispatch.
//! * [`supervisor::Supervisor`] and [`backoff::Backoff`]: connection lifetime,
//!   heartbeat and bounded exponential reconnect.
//! * [`cache::ResourceCache`]: last-known-good records, rebuilt on snapshot and
//!   patched by incremental events.
//! * [`reconcile::TableView`]: in-place, state-preserving table patches.
//! * [`nav::NavigationController`]: one in-flight listing per file view,
//!   last-write-wins queueing, busy-timeout retry and stale-reply rejection.
//! * [`live::LiveTable`] and [`prefs::PrefsStore`]: a channel's records as a
//!   patched table whose sort survives restarts.
//!
//! The async actors in [`channel`] and [`browser`] wire those state machines to a
//! [`transport::Transport`]. Every state machine is owned by exactly one tokio
//! task and is mutated only from that task; other tasks talk to it through a
//! single-consumer command queue.
//!
//! # Error Handling
//!
//! Transport and protocol failures are absorbed inside the engine (reconnect or
//! drop the frame). Only [`Error::Server`] and persistent [`Error::Timeout`] reach
//! observers; see [`Error::is_surfaced`].
#![warn(missing_docs)]

use std::io;

pub mod actions;
pub mod backoff;
pub mod browser;
pub mod cache;
pub mod channel;
pub mod config;
pub mod correlator;
pub mod kind;
pub mod live;
pub mod nav;
pub mod observer;
pub mod prefs;
pub mod reconcile;
pub mod supervisor;
pub mod transport;

pub use actions::{ExecOutput, SessionActions};
pub use backoff::Backoff;
pub use browser::{BrowserEvent, FileBrowser, Listing};
pub use cache::{Delta, ResourceCache};
pub use channel::{ChannelEvent, ChannelHandle, Record, ResourceChannel};
pub use config::SyncConfig;
pub use correlator::Correlator;
pub use kind::ResourceKind;
pub use live::{LiveTable, TableUpdate};
pub use nav::{NavAction, NavigationController, ReplyOutcome, TimeoutOutcome};
pub use observer::{EventBus, Subscription};
pub use prefs::{PrefsStore, ViewPrefs};
pub use reconcile::{Patch, SortDirection, SortSpec, TableView};
pub use supervisor::{ConnectionState, Supervisor};
pub use transport::{Endpoint, Link, Transport};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Socket-level failure; triggers backoff-reconnect.
	#[error("transport error: {0}")]
	Transport(String),
	/// A malformed frame; the frame is dropped and the connection kept.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// A well-formed `error` frame from the server.
	#[error("server error: {0}")]
	Server(String),
	/// A reply whose echoed target no longer matches the in-flight request.
	#[error("stale reply for {target}")]
	StaleReply {
		/// Target echoed by the reply.
		target: String,
	},
	/// No reply arrived in time.
	#[error("request timed out: {0}")]
	Timeout(String),
	/// The channel dropped before the reply arrived.
	#[error("request cancelled: channel closed before reply")]
	Cancelled,
	/// The owning actor has shut down.
	#[error("service stopped")]
	ServiceStopped,
	/// Configuration failed validation or parsing.
	#[error("invalid configuration: {0}")]
	Config(String),
	/// Local filesystem failure (preference persistence).
	#[error("{0}")]
	Io(String),
}

impl Error {
	/// Returns true for errors the UI layer is allowed to display.
	///
	/// Transport, protocol and stale-reply failures are recovered internally.
	#[must_use]
	pub const fn is_surfaced(&self) -> bool {
		matches!(self, Self::Server(_) | Self::Timeout(_))
	}
}

impl From<switchboard_proto::ProtocolError> for Error {
	fn from(e: switchboard_proto::ProtocolError) -> Self {
		Self::Protocol(e.to_string())
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::Io(e.to_string())
	}
}
