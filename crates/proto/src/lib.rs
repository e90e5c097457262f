//! Wire types for the console resource sync protocol.
//!
//! Every resource collection (sessions, listeners, operators, file listings) is
//! carried over its own duplex channel of JSON text frames:
//!
//! * Outbound: `{"action": <string>, ...params, "req_id": <string>}`
//! * Inbound: `{"type": <string>, ...payload, "req_id"?: <string>}`
//!
//! `req_id` is echoed only on request/response pairs. Unsolicited pushes
//! (`snapshot`, `added`, `updated`, `removed`) omit it.
//!
//! This crate is stateless: [`envelope`] encodes and decodes frames, [`records`]
//! defines the typed rows each channel carries.

#![warn(missing_docs)]

pub mod envelope;
pub mod error;
pub mod id;
pub mod records;

pub use envelope::{Inbound, MessageKind, Outbound, Params, Push, action};
pub use error::ProtocolError;
pub use id::RequestId;
pub use records::{FieldValue, FileEntry, Identified, Listener, Operator, Session, Tabular};
