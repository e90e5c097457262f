//! Persisted view preferences.
//!
//! Sort choices are kept per view name and written to a JSON file. Writes are
//! debounced: a burst of changes inside the quiet period produces a single
//! write. Each write goes to a sibling temp file which is then renamed over
//! the target, so a crash never leaves a truncated file behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::reconcile::SortSpec;
use crate::{Error, Result};

/// Preferences for every view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewPrefs {
	/// Active sort per view name.
	#[serde(default)]
	pub sort: BTreeMap<String, SortSpec>,
}

impl ViewPrefs {
	/// Sort saved for `view`.
	pub fn sort_for(&self, view: &str) -> Option<&SortSpec> {
		self.sort.get(view)
	}

	/// Records (or clears) the sort of `view`.
	pub fn set_sort(&mut self, view: &str, sort: Option<SortSpec>) {
		match sort {
			Some(sort) => self.sort.insert(view.to_owned(), sort),
			None => self.sort.remove(view),
		};
	}
}

/// Debounced writer for [`ViewPrefs`].
///
/// Cheap to clone. The writer task exits, flushing any unsaved change, once
/// every clone has been dropped.
#[derive(Debug, Clone)]
pub struct PrefsStore {
	path: PathBuf,
	prefs_tx: watch::Sender<ViewPrefs>,
	saved_rx: watch::Receiver<u64>,
}

impl PrefsStore {
	/// Reads preferences from `path`. A missing file yields the defaults.
	pub async fn load(path: &Path) -> Result<ViewPrefs> {
		match tokio::fs::read(path).await {
			Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| Error::Config(format!("{}: {e}", path.display()))),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(path = %path.display(), "sync.prefs.missing");
				Ok(ViewPrefs::default())
			}
			Err(e) => Err(Error::Io(format!("{}: {e}", path.display()))),
		}
	}

	/// Loads `path` and starts a writer task for it.
	pub async fn open(path: impl Into<PathBuf>, debounce: Duration) -> Result<Self> {
		let path = path.into();
		let prefs = Self::load(&path).await?;
		Ok(Self::spawn(path, prefs, debounce))
	}

	/// Starts a writer task persisting changes to `path`.
	pub fn spawn(path: PathBuf, initial: ViewPrefs, debounce: Duration) -> Self {
		let (prefs_tx, prefs_rx) = watch::channel(initial);
		let (saved_tx, saved_rx) = watch::channel(0);
		tokio::spawn(run_writer(path.clone(), prefs_rx, saved_tx, debounce));
		Self { path, prefs_tx, saved_rx }
	}

	/// Current preferences.
	pub fn current(&self) -> ViewPrefs {
		self.prefs_tx.borrow().clone()
	}

	/// Applies `f` and schedules a write. No write is scheduled if nothing changed.
	pub fn update(&self, f: impl FnOnce(&mut ViewPrefs)) {
		self.prefs_tx.send_if_modified(|prefs| {
			let before = prefs.clone();
			f(prefs);
			*prefs != before
		});
	}

	/// Writes the current preferences now, bypassing the debounce.
	pub async fn flush(&self) -> Result<()> {
		let prefs = self.current();
		write_atomic(&self.path, &prefs).await
	}

	/// Number of completed debounced writes.
	pub fn saved(&self) -> watch::Receiver<u64> {
		self.saved_rx.clone()
	}

	/// File being written.
	pub fn path(&self) -> &Path {
		&self.path
	}
}

async fn run_writer(path: PathBuf, mut prefs_rx: watch::Receiver<ViewPrefs>, saved_tx: watch::Sender<u64>, debounce: Duration) {
	loop {
		if prefs_rx.changed().await.is_err() {
			return;
		}
		let mut open = true;
		while open {
			tokio::select! {
				changed = prefs_rx.changed() => open = changed.is_ok(),
				_ = tokio::time::sleep(debounce) => break,
			}
		}

		let prefs = prefs_rx.borrow_and_update().clone();
		match write_atomic(&path, &prefs).await {
			Ok(()) => {
				saved_tx.send_modify(|n| *n += 1);
				debug!(path = %path.display(), "sync.prefs.saved");
			}
			Err(e) => warn!(path = %path.display(), error = %e, "sync.prefs.write_failed"),
		}
		if !open {
			return;
		}
	}
}

async fn write_atomic(path: &Path, prefs: &ViewPrefs) -> Result<()> {
	let json = serde_json::to_vec_pretty(prefs).map_err(|e| Error::Io(e.to_string()))?;
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		tokio::fs::create_dir_all(parent).await?;
	}
	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".tmp");
	let tmp = PathBuf::from(tmp);
	tokio::fs::write(&tmp, json).await?;
	tokio::fs::rename(&tmp, path).await?;
	Ok(())
}
