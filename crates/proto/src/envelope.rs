//! Request/response envelope codec.
//!
//! Encoding is infallible: an outbound envelope is always a JSON object. Decoding
//! reports a [`ProtocolError`] for anything that is not an object with a string
//! `type`, and the caller drops the frame.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::id::RequestId;

/// Free-form parameters or payload fields of an envelope.
pub type Params = serde_json::Map<String, Value>;

const ACTION_KEY: &str = "action";
const TYPE_KEY: &str = "type";
const REQ_ID_KEY: &str = "req_id";

/// Canonical outbound action names.
pub mod action {
	/// Request a full snapshot (or a directory listing on the files channel).
	pub const LIST: &str = "list";
	/// Request a single resource.
	pub const GET: &str = "get";
	/// Terminate a resource.
	pub const KILL: &str = "kill";
	/// Execute a command on a session.
	pub const EXEC: &str = "exec";
	/// Heartbeat no-op.
	pub const PING: &str = "ping";
}

/// Classification of an inbound `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
	/// Full authoritative listing of the collection.
	Snapshot,
	/// A single item appeared.
	Added,
	/// A single item changed.
	Updated,
	/// A single item disappeared.
	Removed,
	/// Well-formed server-side failure with a human-readable message.
	Error,
	/// Heartbeat answer.
	Pong,
	/// Any other reply type (`session`, `killed`, `exec_result`, `listing`, ...).
	Reply,
}

impl MessageKind {
	/// Maps a wire `type` string to its kind.
	#[must_use]
	pub fn from_type(kind: &str) -> Self {
		match kind {
			"snapshot" => Self::Snapshot,
			"added" => Self::Added,
			"updated" => Self::Updated,
			"removed" => Self::Removed,
			"error" => Self::Error,
			"pong" => Self::Pong,
			_ => Self::Reply,
		}
	}

	/// Returns true for kinds that mutate the resource cache.
	#[must_use]
	pub const fn is_push(self) -> bool {
		matches!(self, Self::Snapshot | Self::Added | Self::Updated | Self::Removed)
	}
}

/// A cache mutation carried by an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Push<R> {
	/// Replace the whole collection.
	Snapshot(Vec<R>),
	/// Insert one record.
	Added(R),
	/// Replace one record.
	Updated(R),
	/// Delete by id.
	Removed(String),
}

/// Client-to-server envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
	/// Action name.
	pub action: String,
	/// Action parameters, flattened into the top-level object.
	pub params: Params,
	/// Correlation id.
	pub req_id: RequestId,
}

impl Outbound {
	/// Creates an envelope.
	pub fn new(action: impl Into<String>, params: Params, req_id: RequestId) -> Self {
		Self {
			action: action.into(),
			params,
			req_id,
		}
	}

	/// Serializes to wire text.
	///
	/// `action` and `req_id` always win over same-named keys in `params`.
	#[must_use]
	pub fn encode(&self) -> String {
		let mut obj = self.params.clone();
		obj.insert(ACTION_KEY.into(), Value::String(self.action.clone()));
		obj.insert(REQ_ID_KEY.into(), Value::String(self.req_id.as_str().to_owned()));
		Value::Object(obj).to_string()
	}

	/// Parses wire text produced by [`Outbound::encode`].
	///
	/// Used by server-side peers (in-memory transport, tests) to read client frames.
	pub fn decode(text: &str) -> Result<Self, ProtocolError> {
		let Value::Object(mut obj) = serde_json::from_str::<Value>(text)? else {
			return Err(ProtocolError::NotObject);
		};
		let action = match obj.remove(ACTION_KEY) {
			Some(Value::String(action)) => action,
			_ => {
				return Err(ProtocolError::InvalidField {
					kind: "outbound".into(),
					field: ACTION_KEY,
				});
			}
		};
		let req_id = match obj.remove(REQ_ID_KEY) {
			Some(Value::String(id)) => RequestId::from(id),
			_ => return Err(ProtocolError::InvalidRequestId),
		};
		Ok(Self {
			action,
			params: obj,
			req_id,
		})
	}
}

/// Server-to-client envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
	/// Raw `type` field.
	pub kind: String,
	/// Echoed correlation id; absent on unsolicited pushes.
	pub req_id: Option<RequestId>,
	/// Remaining fields.
	pub payload: Params,
}

impl Inbound {
	/// Creates an unsolicited frame.
	pub fn new(kind: impl Into<String>, payload: Params) -> Self {
		Self {
			kind: kind.into(),
			req_id: None,
			payload,
		}
	}

	/// Attaches a correlation id.
	#[must_use]
	pub fn with_req_id(mut self, req_id: RequestId) -> Self {
		self.req_id = Some(req_id);
		self
	}

	/// Parses wire text.
	pub fn decode(text: &str) -> Result<Self, ProtocolError> {
		let Value::Object(mut obj) = serde_json::from_str::<Value>(text)? else {
			return Err(ProtocolError::NotObject);
		};
		let kind = match obj.remove(TYPE_KEY) {
			Some(Value::String(kind)) => kind,
			_ => return Err(ProtocolError::MissingType),
		};
		let req_id = match obj.remove(REQ_ID_KEY) {
			None | Some(Value::Null) => None,
			Some(Value::String(id)) => Some(RequestId::from(id)),
			Some(_) => return Err(ProtocolError::InvalidRequestId),
		};
		Ok(Self {
			kind,
			req_id,
			payload: obj,
		})
	}

	/// Serializes to wire text.
	#[must_use]
	pub fn encode(&self) -> String {
		let mut obj = self.payload.clone();
		obj.insert(TYPE_KEY.into(), Value::String(self.kind.clone()));
		if let Some(id) = &self.req_id {
			obj.insert(REQ_ID_KEY.into(), Value::String(id.as_str().to_owned()));
		}
		Value::Object(obj).to_string()
	}

	/// Classifies the `type` field.
	#[must_use]
	pub fn message_kind(&self) -> MessageKind {
		MessageKind::from_type(&self.kind)
	}

	/// Returns a string payload field.
	#[must_use]
	pub fn get_str(&self, field: &str) -> Option<&str> {
		self.payload.get(field).and_then(Value::as_str)
	}

	/// Human-readable message of an `error` frame.
	#[must_use]
	pub fn error_message(&self) -> Option<&str> {
		(self.message_kind() == MessageKind::Error).then(|| self.get_str("error").unwrap_or("unknown server error"))
	}

	/// Deserializes one payload field.
	pub fn field<T: DeserializeOwned>(&self, field: &'static str) -> Result<T, ProtocolError> {
		let value = self.payload.get(field).cloned().unwrap_or(Value::Null);
		serde_json::from_value(value).map_err(|_| ProtocolError::InvalidField {
			kind: self.kind.clone(),
			field,
		})
	}

	/// Deserializes the whole payload as `T`.
	pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
		serde_json::from_value(Value::Object(self.payload.clone())).map_err(|source| ProtocolError::Record {
			kind: self.kind.clone(),
			source,
		})
	}

	/// Extracts the cache mutation carried by this frame, if any.
	///
	/// Payload layout: `snapshot` carries `items: [record...]`, `added` and
	/// `updated` carry `item: record`, `removed` carries `id: string`.
	pub fn push<R: DeserializeOwned>(&self) -> Result<Option<Push<R>>, ProtocolError> {
		let push = match self.message_kind() {
			MessageKind::Snapshot => {
				let Some(Value::Array(items)) = self.payload.get("items") else {
					return Err(self.invalid("items"));
				};
				let records = items
					.iter()
					.map(|item| self.record(item))
					.collect::<Result<Vec<R>, _>>()?;
				Push::Snapshot(records)
			}
			MessageKind::Added => Push::Added(self.record(self.payload.get("item").ok_or_else(|| self.invalid("item"))?)?),
			MessageKind::Updated => Push::Updated(self.record(self.payload.get("item").ok_or_else(|| self.invalid("item"))?)?),
			MessageKind::Removed => Push::Removed(self.get_str("id").ok_or_else(|| self.invalid("id"))?.to_owned()),
			MessageKind::Error | MessageKind::Pong | MessageKind::Reply => return Ok(None),
		};
		Ok(Some(push))
	}

	fn record<R: DeserializeOwned>(&self, value: &Value) -> Result<R, ProtocolError> {
		serde_json::from_value(value.clone()).map_err(|source| ProtocolError::Record {
			kind: self.kind.clone(),
			source,
		})
	}

	fn invalid(&self, field: &'static str) -> ProtocolError {
		ProtocolError::InvalidField {
			kind: self.kind.clone(),
			field,
		}
	}
}
