//! The remote collections the console keeps live.

use switchboard_proto::action;

/// One resource collection, each on its own channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
	/// Active implant sessions.
	Sessions,
	/// Listeners accepting implant connections.
	Listeners,
	/// Operators connected to the team server.
	Operators,
	/// Remote filesystem listings.
	Files,
}

impl ResourceKind {
	/// Every kind.
	pub const ALL: [Self; 4] = [Self::Sessions, Self::Listeners, Self::Operators, Self::Files];

	/// Channel path relative to the server URL.
	pub const fn path(self) -> &'static str {
		match self {
			Self::Sessions => "sessions",
			Self::Listeners => "listeners",
			Self::Operators => "operators",
			Self::Files => "files",
		}
	}

	/// Action requesting a full snapshot after every (re)connect.
	///
	/// The files channel has none: listings are per directory and are
	/// re-requested by the file browser.
	pub const fn snapshot_action(self) -> Option<&'static str> {
		match self {
			Self::Files => None,
			_ => Some(action::LIST),
		}
	}

	/// Parses a channel path.
	pub fn from_path(path: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|k| k.path() == path)
	}
}

impl std::fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.path())
	}
}
