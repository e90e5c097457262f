//! Error types for frame decoding.

use thiserror::Error;

/// A frame that could not be turned into a well-formed envelope.
///
/// Decoding failures never tear down a channel: the frame is dropped and the
/// error is reported to the caller for logging.
#[derive(Debug, Error)]
pub enum ProtocolError {
	/// The frame is not valid JSON.
	#[error("malformed JSON frame: {0}")]
	Json(#[from] serde_json::Error),

	/// The frame is valid JSON but not an object.
	#[error("frame is not a JSON object")]
	NotObject,

	/// The envelope lacks a string `type` field.
	#[error("frame has no string `type` field")]
	MissingType,

	/// `req_id` is present but not a string.
	#[error("frame has a non-string `req_id`")]
	InvalidRequestId,

	/// A payload field required by the message type is absent or mistyped.
	#[error("`{kind}` frame has invalid field `{field}`")]
	InvalidField {
		/// Message type of the frame.
		kind: String,
		/// Offending field name.
		field: &'static str,
	},

	/// A record inside the payload does not match the channel's record type.
	#[error("`{kind}` frame carries an undecodable record: {source}")]
	Record {
		/// Message type of the frame.
		kind: String,
		/// Underlying deserialization failure.
		source: serde_json::Error,
	},
}
