//! Correlation identifiers.

use serde::{Deserialize, Serialize};

/// Correlation token linking an outbound request to its eventual reply.
///
/// Generated ids are random 128-bit values rendered as 32 hex digits, so they
/// are unique across channels and process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
	/// Generates a fresh random id.
	#[must_use]
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().simple().to_string())
	}

	/// Returns the id as it appears on the wire.
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<String> for RequestId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

impl From<&str> for RequestId {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}

impl std::fmt::Display for RequestId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}
