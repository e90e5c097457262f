//! A channel's records presented as a live, state-preserving table.

use switchboard_proto::Tabular;
use tokio::sync::mpsc;

use crate::cache::Delta;
use crate::channel::{ChannelEvent, ChannelHandle, Record};
use crate::observer::Subscription;
use crate::prefs::PrefsStore;
use crate::reconcile::{Patch, SortSpec, TableView};
use crate::supervisor::ConnectionState;

/// What changed in a [`LiveTable`] after one channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum TableUpdate {
	/// Rows were patched.
	Patched(Vec<Patch>),
	/// The connection status changed.
	Status(ConnectionState),
	/// The server reported an error.
	ServerError(String),
}

/// Table view fed by a resource channel.
///
/// Owned by the UI task: every mutation of the view happens in
/// [`LiveTable::next`] or in the sort/selection methods, all on the owner.
/// Sort changes are persisted through the optional [`PrefsStore`] under the
/// table's name.
pub struct LiveTable<R> {
	name: String,
	channel: ChannelHandle<R>,
	view: TableView<R>,
	events: mpsc::UnboundedReceiver<ChannelEvent<R>>,
	_subscription: Subscription,
	prefs: Option<PrefsStore>,
}

impl<R: Record + Tabular> LiveTable<R> {
	/// Subscribes to `channel` and seeds the view with its current records.
	///
	/// The initial sort comes from `prefs` if one was saved for `name`.
	pub fn new(channel: ChannelHandle<R>, name: impl Into<String>, prefs: Option<PrefsStore>) -> Self {
		let name = name.into();
		let (subscription, events) = channel.events().forward();
		let sort = prefs.as_ref().and_then(|p| p.current().sort_for(&name).cloned());
		let mut view = TableView::with_sort(sort);
		view.reconcile(&Delta {
			added: channel.records().to_vec(),
			..Delta::default()
		});
		Self {
			name,
			channel,
			view,
			events,
			_subscription: subscription,
			prefs,
		}
	}

	/// Waits for the next channel event and folds it into the view.
	///
	/// Returns `None` once the channel has stopped.
	pub async fn next(&mut self) -> Option<TableUpdate> {
		loop {
			let update = match self.events.recv().await? {
				ChannelEvent::Delta(delta) => TableUpdate::Patched(self.view.reconcile(&delta)),
				ChannelEvent::Connecting { .. } => TableUpdate::Status(ConnectionState::Connecting),
				ChannelEvent::Connected => TableUpdate::Status(ConnectionState::Connected),
				ChannelEvent::Disconnected { .. } => TableUpdate::Status(ConnectionState::Disconnected),
				ChannelEvent::ServerError(message) => TableUpdate::ServerError(message),
				ChannelEvent::ProtocolError(_) => continue,
			};
			return Some(update);
		}
	}

	/// Changes the sort and persists it.
	pub fn set_sort(&mut self, sort: Option<SortSpec>) -> bool {
		let reordered = self.view.set_sort(sort.clone());
		self.persist_sort(sort);
		reordered
	}

	/// Sorts by `column`, flipping direction if already sorted by it, and persists the result.
	pub fn toggle_sort(&mut self, column: &str) -> bool {
		let reordered = self.view.toggle_sort(column);
		self.persist_sort(self.view.sort().cloned());
		reordered
	}

	/// The table.
	pub fn view(&self) -> &TableView<R> {
		&self.view
	}

	/// The table, for selection and scrolling.
	pub fn view_mut(&mut self) -> &mut TableView<R> {
		&mut self.view
	}

	/// The channel feeding this table.
	pub fn channel(&self) -> &ChannelHandle<R> {
		&self.channel
	}

	/// Name under which preferences are stored.
	pub fn name(&self) -> &str {
		&self.name
	}

	fn persist_sort(&self, sort: Option<SortSpec>) {
		if let Some(prefs) = &self.prefs {
			prefs.update(|p| p.set_sort(&self.name, sort));
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::time::Duration;

	use pretty_assertions::assert_eq;
	use serde_json::json;
	use switchboard_proto::{Inbound, Session};

	use super::*;
	use crate::channel::ResourceChannel;
	use crate::config::SyncConfig;
	use crate::kind::ResourceKind;
	use crate::prefs::ViewPrefs;
	use crate::transport::{Endpoint, MemoryTransport};

	fn push(kind: &str, payload: serde_json::Value) -> Inbound {
		let serde_json::Value::Object(payload) = payload else {
			unreachable!()
		};
		Inbound::new(kind, payload)
	}

	fn hosts(table: &LiveTable<Session>) -> Vec<&str> {
		table.view().rows().iter().map(|s| s.hostname.as_str()).collect()
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn deltas_patch_rows_and_keep_selection() {
		let (transport, mut peer) = MemoryTransport::pair();
		let channel = ResourceChannel::spawn(ResourceKind::Sessions, Arc::new(transport), &Endpoint::new("ws://t/", ""), SyncConfig::default());
		let mut prefs = ViewPrefs::default();
		prefs.set_sort("sessions", Some(SortSpec::ascending("hostname")));
		let dir = tempfile::tempdir().unwrap();
		let store = PrefsStore::spawn(dir.path().join("prefs.json"), prefs, Duration::from_millis(100));
		let mut table = LiveTable::new(channel, "sessions", Some(store.clone()));

		assert_eq!(table.next().await, Some(TableUpdate::Status(ConnectionState::Connecting)));
		assert_eq!(table.next().await, Some(TableUpdate::Status(ConnectionState::Connected)));

		let mut conn = peer.accept().await.unwrap();
		conn.recv_request().await.unwrap();
		conn.send(&push("snapshot", json!({"items": [{"id": "1", "hostname": "web"}, {"id": "2", "hostname": "db"}]})));
		assert!(matches!(table.next().await, Some(TableUpdate::Patched(_))));
		assert_eq!(hosts(&table), vec!["db", "web"]);

		table.view_mut().select("1");
		conn.send(&push("added", json!({"item": {"id": "3", "hostname": "app"}})));
		conn.send(&push("removed", json!({"id": "2"})));
		table.next().await.unwrap();
		table.next().await.unwrap();
		assert_eq!(hosts(&table), vec!["app", "web"]);
		assert_eq!(table.view().selected_rows().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["1"]);

		assert!(table.toggle_sort("hostname"));
		assert_eq!(hosts(&table), vec!["web", "app"]);
		assert_eq!(store.current().sort_for("sessions"), Some(&SortSpec::descending("hostname")));
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn protocol_errors_are_not_surfaced() {
		let (transport, mut peer) = MemoryTransport::pair();
		let channel = ResourceChannel::spawn(ResourceKind::Operators, Arc::new(transport), &Endpoint::new("ws://t/", ""), SyncConfig::default());
		let mut table: LiveTable<switchboard_proto::Operator> = LiveTable::new(channel, "operators", None);
		table.next().await.unwrap();
		table.next().await.unwrap();

		let mut conn = peer.accept().await.unwrap();
		conn.recv_request().await.unwrap();
		conn.send_raw("garbage");
		conn.send(&push("error", json!({"error": "rate limited"})));
		assert_eq!(table.next().await, Some(TableUpdate::ServerError("rate limited".into())));
	}
}
