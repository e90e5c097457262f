//! Typed resource records.
//!
//! Each channel carries exactly one record type. Identity is the `id` field;
//! every other field may change between snapshots. Fields the console does not
//! know about are kept in `extra` so that equality stays structural over the
//! whole wire object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Params;

/// A record with a stable identity inside its collection.
pub trait Identified {
	/// Returns the record's id.
	fn id(&self) -> &str;
}

/// A record whose columns can be read for sorting and display.
pub trait Tabular: Identified {
	/// Returns the value shown in `column`, or [`FieldValue::Null`] if absent.
	fn field(&self, column: &str) -> FieldValue;
}

/// A sortable cell value.
///
/// Ordering is `Null < Bool < Int < Text`; values of the same variant compare
/// naturally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
	/// Missing or JSON `null`.
	Null,
	/// Boolean flag.
	Bool(bool),
	/// Integer quantity.
	Int(i64),
	/// Anything else, rendered as text.
	Text(String),
}

impl FieldValue {
	/// Converts an arbitrary JSON value.
	#[must_use]
	pub fn from_json(value: Option<&Value>) -> Self {
		match value {
			None | Some(Value::Null) => Self::Null,
			Some(Value::Bool(b)) => Self::Bool(*b),
			Some(Value::Number(n)) => n.as_i64().map_or_else(|| Self::Text(n.to_string()), Self::Int),
			Some(Value::String(s)) => Self::Text(s.clone()),
			Some(other) => Self::Text(other.to_string()),
		}
	}

	fn text(s: &str) -> Self {
		Self::Text(s.to_owned())
	}

	fn opt_int(n: Option<u64>) -> Self {
		n.map_or(Self::Null, |n| Self::Int(i64::try_from(n).unwrap_or(i64::MAX)))
	}
}

impl std::fmt::Display for FieldValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Null => Ok(()),
			Self::Bool(b) => write!(f, "{b}"),
			Self::Int(n) => write!(f, "{n}"),
			Self::Text(s) => f.write_str(s),
		}
	}
}

/// An active implant session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
	/// Session id.
	pub id: String,
	/// Remote host name.
	#[serde(default)]
	pub hostname: String,
	/// Remote user.
	#[serde(default)]
	pub username: String,
	/// Remote operating system.
	#[serde(default)]
	pub os: String,
	/// Remote architecture.
	#[serde(default)]
	pub arch: String,
	/// Remote process id.
	#[serde(default)]
	pub pid: Option<u64>,
	/// Check-in interval for polled (beacon) sessions; `None` for push sessions.
	#[serde(default)]
	pub beacon_interval_ms: Option<u64>,
	/// Last check-in timestamp as reported by the server.
	#[serde(default)]
	pub last_seen: Option<String>,
	/// Unknown fields.
	#[serde(flatten)]
	pub extra: Params,
}

impl Session {
	/// Returns true when the session talks over a polled beacon transport.
	#[must_use]
	pub fn is_polled(&self) -> bool {
		self.beacon_interval_ms.is_some()
	}
}

impl Identified for Session {
	fn id(&self) -> &str {
		&self.id
	}
}

impl Tabular for Session {
	fn field(&self, column: &str) -> FieldValue {
		match column {
			"id" => FieldValue::text(&self.id),
			"hostname" => FieldValue::text(&self.hostname),
			"username" => FieldValue::text(&self.username),
			"os" => FieldValue::text(&self.os),
			"arch" => FieldValue::text(&self.arch),
			"pid" => FieldValue::opt_int(self.pid),
			"beacon_interval_ms" => FieldValue::opt_int(self.beacon_interval_ms),
			"last_seen" => self.last_seen.as_deref().map_or(FieldValue::Null, FieldValue::text),
			other => FieldValue::from_json(self.extra.get(other)),
		}
	}
}

/// A listener accepting implant connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listener {
	/// Listener id.
	pub id: String,
	/// Display name.
	#[serde(default)]
	pub name: String,
	/// Protocol (`https`, `dns`, `tcp`, ...).
	#[serde(default)]
	pub protocol: String,
	/// Bind address.
	#[serde(default)]
	pub host: String,
	/// Bind port.
	#[serde(default)]
	pub port: Option<u16>,
	/// Server-reported status (`running`, `stopped`, ...).
	#[serde(default)]
	pub status: String,
	/// Unknown fields.
	#[serde(flatten)]
	pub extra: Params,
}

impl Identified for Listener {
	fn id(&self) -> &str {
		&self.id
	}
}

impl Tabular for Listener {
	fn field(&self, column: &str) -> FieldValue {
		match column {
			"id" => FieldValue::text(&self.id),
			"name" => FieldValue::text(&self.name),
			"protocol" => FieldValue::text(&self.protocol),
			"host" => FieldValue::text(&self.host),
			"port" => FieldValue::opt_int(self.port.map(u64::from)),
			"status" => FieldValue::text(&self.status),
			other => FieldValue::from_json(self.extra.get(other)),
		}
	}
}

/// A console operator account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
	/// Operator id.
	pub id: String,
	/// Login name.
	#[serde(default)]
	pub name: String,
	/// Role (`admin`, `operator`, ...).
	#[serde(default)]
	pub role: String,
	/// Whether the operator currently holds a console connection.
	#[serde(default)]
	pub online: bool,
	/// Unknown fields.
	#[serde(flatten)]
	pub extra: Params,
}

impl Identified for Operator {
	fn id(&self) -> &str {
		&self.id
	}
}

impl Tabular for Operator {
	fn field(&self, column: &str) -> FieldValue {
		match column {
			"id" => FieldValue::text(&self.id),
			"name" => FieldValue::text(&self.name),
			"role" => FieldValue::text(&self.role),
			"online" => FieldValue::Bool(self.online),
			other => FieldValue::from_json(self.extra.get(other)),
		}
	}
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
	/// Full remote path; unique within a listing.
	pub id: String,
	/// Base name.
	#[serde(default)]
	pub name: String,
	/// Whether the entry is a directory.
	#[serde(default)]
	pub folder: bool,
	/// Size in bytes, absent for directories.
	#[serde(default)]
	pub size: Option<u64>,
	/// Modification time as reported by the remote.
	#[serde(default)]
	pub modified: Option<String>,
	/// Unknown fields.
	#[serde(flatten)]
	pub extra: Params,
}

impl Identified for FileEntry {
	fn id(&self) -> &str {
		&self.id
	}
}

impl Tabular for FileEntry {
	fn field(&self, column: &str) -> FieldValue {
		match column {
			"id" | "path" => FieldValue::text(&self.id),
			"name" => FieldValue::text(&self.name),
			"folder" => FieldValue::Bool(self.folder),
			"size" => FieldValue::opt_int(self.size),
			"modified" => self.modified.as_deref().map_or(FieldValue::Null, FieldValue::text),
			other => FieldValue::from_json(self.extra.get(other)),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn unknown_fields_are_kept_and_compared() {
		let a: Session = serde_json::from_value(json!({"id": "s1", "hostname": "box", "sleep_jitter": 5})).unwrap();
		let b: Session = serde_json::from_value(json!({"id": "s1", "hostname": "box", "sleep_jitter": 9})).unwrap();
		assert_eq!(a.extra.get("sleep_jitter"), Some(&json!(5)));
		assert_ne!(a, b);
		assert_eq!(a.field("sleep_jitter"), FieldValue::Int(5));
	}

	#[test]
	fn missing_optional_fields_default() {
		let entry: FileEntry = serde_json::from_value(json!({"id": "/etc"})).unwrap();
		assert!(!entry.folder);
		assert_eq!(entry.size, None);
		assert_eq!(entry.field("size"), FieldValue::Null);
	}

	#[test]
	fn field_values_order_by_variant_then_value() {
		let mut values = vec![
			FieldValue::Text("b".into()),
			FieldValue::Int(3),
			FieldValue::Null,
			FieldValue::Text("a".into()),
			FieldValue::Bool(true),
			FieldValue::Int(-1),
		];
		values.sort();
		assert_eq!(
			values,
			vec![
				FieldValue::Null,
				FieldValue::Bool(true),
				FieldValue::Int(-1),
				FieldValue::Int(3),
				FieldValue::Text("a".into()),
				FieldValue::Text("b".into()),
			]
		);
	}

	#[test]
	fn polled_sessions_carry_beacon_interval() {
		let s: Session = serde_json::from_value(json!({"id": "b1", "beacon_interval_ms": 5000})).unwrap();
		assert!(s.is_polled());
		let s: Session = serde_json::from_value(json!({"id": "p1"})).unwrap();
		assert!(!s.is_polled());
	}
}
