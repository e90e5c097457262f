//! Subcommand implementations.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, bail};
use switchboard_proto::{FileEntry, Listener, Operator, Session, Tabular};
use switchboard_sync::{
	BrowserEvent, ChannelHandle, ConnectionState, Endpoint, FileBrowser, LiveTable, PrefsStore, Record, ResourceChannel,
	ResourceKind, SessionActions, SortDirection, SortSpec, TableUpdate, Transport,
};
use tracing::{debug, info, warn};

use crate::cli::WatchKind;
use crate::config::ConsoleConfig;

/// Shared state for one invocation.
pub struct Console {
	pub config: ConsoleConfig,
	pub endpoint: Endpoint,
	pub transport: Arc<dyn Transport>,
}

impl Console {
	fn channel<R: Record>(&self, kind: ResourceKind) -> ChannelHandle<R> {
		ResourceChannel::spawn(kind, Arc::clone(&self.transport), &self.endpoint, self.config.sync.clone())
	}

	fn sessions(&self) -> SessionActions {
		SessionActions::new(self.channel(ResourceKind::Sessions))
	}
}

/// Columns printed for each watched collection.
pub fn columns(kind: WatchKind) -> &'static [&'static str] {
	match kind {
		WatchKind::Sessions => &["id", "hostname", "username", "os", "arch", "last_seen"],
		WatchKind::Listeners => &["id", "name", "protocol", "host", "port", "status"],
		WatchKind::Operators => &["id", "name", "role", "online"],
	}
}

/// Tab-separated rendering of `rows`.
pub fn render<'a, R: Tabular + 'a>(columns: &[&str], rows: impl IntoIterator<Item = &'a R>) -> String {
	let mut out = columns.join("\t");
	out.push('\n');
	for row in rows {
		let cells: Vec<String> = columns.iter().map(|c| row.field(c).to_string()).collect();
		let _ = writeln!(out, "{}", cells.join("\t"));
	}
	out
}

pub async fn watch(console: &Console, kind: WatchKind, sort: Option<String>, desc: bool) -> anyhow::Result<()> {
	match kind {
		WatchKind::Sessions => watch_table::<Session>(console, kind, sort, desc).await,
		WatchKind::Listeners => watch_table::<Listener>(console, kind, sort, desc).await,
		WatchKind::Operators => watch_table::<Operator>(console, kind, sort, desc).await,
	}
}

async fn watch_table<R: Record + Tabular>(console: &Console, kind: WatchKind, sort: Option<String>, desc: bool) -> anyhow::Result<()> {
	let resource = ResourceKind::from(kind);
	let prefs = match console.config.prefs_path() {
		Some(path) => match PrefsStore::open(path, console.config.sync.persist_debounce()).await {
			Ok(store) => Some(store),
			Err(e) => {
				warn!(error = %e, "cli.prefs.unavailable");
				None
			}
		},
		None => None,
	};

	let channel = console.channel::<R>(resource);
	let mut table = LiveTable::new(channel.clone(), resource.path(), prefs.clone());
	if let Some(column) = sort {
		let direction = if desc { SortDirection::Descending } else { SortDirection::Ascending };
		table.set_sort(Some(SortSpec { column, direction }));
	}

	let columns = columns(kind);
	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			update = table.next() => match update {
				Some(TableUpdate::Patched(patches)) => {
					debug!(channel = %resource, ?patches, "cli.watch.patched");
					print!("{}", render(columns, table.view().rows()));
					println!();
				}
				Some(TableUpdate::Status(state)) => {
					info!(channel = %resource, %state, "cli.watch.status");
					if state == ConnectionState::Disconnected {
						eprintln!("{resource}: disconnected, retrying");
					}
				}
				Some(TableUpdate::ServerError(message)) => eprintln!("{resource}: server error: {message}"),
				None => break,
			},
		}
	}

	channel.shutdown().await;
	if let Some(prefs) = prefs {
		prefs.flush().await?;
	}
	Ok(())
}

pub async fn ls(console: &Console, session_id: &str, paths: Vec<String>) -> anyhow::Result<()> {
	let Some(last) = paths.last().cloned() else {
		bail!("no path given");
	};
	let sessions = console.sessions();
	let session = sessions.get(session_id).await.with_context(|| format!("looking up session {session_id}"))?;

	let files = console.channel::<FileEntry>(ResourceKind::Files);
	let browser = FileBrowser::spawn(files.clone(), &session, &console.config.sync, Some(SortSpec::ascending("name")));
	let (_sub, mut events) = browser.events().forward();
	for path in paths {
		browser.navigate(path)?;
	}

	let result = loop {
		let Some(event) = events.recv().await else {
			break Err(anyhow::anyhow!("file browser stopped"));
		};
		match event {
			BrowserEvent::Listing(listing) if listing.path.as_deref() == Some(last.as_str()) => {
				print!("{}", render_listing(&listing.entries));
				break Ok(());
			}
			BrowserEvent::Listing(listing) => debug!(path = ?listing.path, "cli.ls.intermediate"),
			BrowserEvent::Retrying { path, attempt } => eprintln!("{path}: no reply yet, retrying (attempt {attempt})"),
			BrowserEvent::Stale { path } => debug!(%path, "cli.ls.stale"),
			BrowserEvent::Failed { path, error } => break Err(anyhow::anyhow!("{path}: {error}")),
			BrowserEvent::ServerError { path, message } => break Err(anyhow::anyhow!("{path}: {message}")),
		}
	};

	files.shutdown().await;
	result
}

fn render_listing(entries: &[FileEntry]) -> String {
	let mut out = String::new();
	for entry in entries {
		let size = entry.size.map(|s| s.to_string()).unwrap_or_default();
		let name = if entry.folder { format!("{}/", entry.name) } else { entry.name.clone() };
		let _ = writeln!(out, "{size:>12}  {}  {name}", entry.modified.as_deref().unwrap_or("-"));
	}
	out
}

pub async fn get(console: &Console, session_id: &str) -> anyhow::Result<()> {
	let session = console.sessions().get(session_id).await?;
	println!("{}", serde_json::to_string_pretty(&session)?);
	Ok(())
}

pub async fn kill(console: &Console, session_id: &str) -> anyhow::Result<()> {
	console.sessions().kill(session_id).await?;
	println!("killed {session_id}");
	Ok(())
}

pub async fn exec(console: &Console, session_id: &str, command: &[String]) -> anyhow::Result<()> {
	let result = console.sessions().exec(session_id, &command.join(" ")).await?;
	print!("{}", result.output);
	match result.exit_code {
		Some(code) if code != 0 => bail!("remote command exited with status {code}"),
		_ => Ok(()),
	}
}
