use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use switchboard_sync::ResourceKind;

#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "Live view of an operator console's sessions, listeners and files")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Configuration file (defaults to the platform config directory)
	#[arg(short, long, value_name = "PATH", global = true)]
	pub config: Option<PathBuf>,

	/// Server base URL, e.g. wss://console:8443/ws
	#[arg(long, value_name = "URL", global = true)]
	pub server: Option<String>,

	/// Authentication token
	#[arg(long, value_name = "TOKEN", global = true)]
	pub token: Option<String>,

	/// Verbose logging
	#[arg(short, long, global = true)]
	pub verbose: bool,

	/// Subcommand to execute.
	#[command(subcommand)]
	pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
	/// Follow a resource collection live
	Watch {
		/// Collection to follow
		#[arg(value_enum)]
		kind: WatchKind,
		/// Column to sort by (persisted for next time)
		#[arg(long, value_name = "COLUMN")]
		sort: Option<String>,
		/// Sort descending
		#[arg(long, requires = "sort")]
		desc: bool,
	},
	/// List remote directories of a session, one after another
	Ls {
		/// Session id
		session: String,
		/// Directories to visit; only the last one is printed
		#[arg(default_value = ".")]
		paths: Vec<String>,
	},
	/// Show one session
	Get {
		/// Session id
		session: String,
	},
	/// Terminate a session
	Kill {
		/// Session id
		session: String,
	},
	/// Run a command on a session
	Exec {
		/// Session id
		session: String,
		/// Command line
		#[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
		command: Vec<String>,
	},
}

/// Collections that can be watched as a table.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
	/// Active sessions
	Sessions,
	/// Listeners
	Listeners,
	/// Connected operators
	Operators,
}

impl From<WatchKind> for ResourceKind {
	fn from(kind: WatchKind) -> Self {
		match kind {
			WatchKind::Sessions => Self::Sessions,
			WatchKind::Listeners => Self::Listeners,
			WatchKind::Operators => Self::Operators,
		}
	}
}
