//! Typed session actions over the sessions channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_proto::{Inbound, Params, Session, action};

use crate::channel::ChannelHandle;
use crate::{Error, Result};

/// Output of a remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
	/// Combined output text.
	#[serde(default)]
	pub output: String,
	/// Exit status, if the implant reports one.
	#[serde(default)]
	pub exit_code: Option<i64>,
}

/// `get`/`kill`/`exec` against one sessions channel.
#[derive(Debug, Clone)]
pub struct SessionActions {
	channel: ChannelHandle<Session>,
}

impl SessionActions {
	/// Wraps a sessions channel handle.
	pub fn new(channel: ChannelHandle<Session>) -> Self {
		Self { channel }
	}

	/// Fetches one session (`get` -> `session`).
	pub async fn get(&self, id: &str) -> Result<Session> {
		let reply = self.call(action::GET, id_params(id), "session").await?;
		Ok(reply.field("session")?)
	}

	/// Terminates a session (`kill` -> `killed`).
	pub async fn kill(&self, id: &str) -> Result<()> {
		self.call(action::KILL, id_params(id), "killed").await.map(|_| ())
	}

	/// Runs a command in a session (`exec` -> `exec_result`).
	pub async fn exec(&self, id: &str, command: &str) -> Result<ExecOutput> {
		let mut params = id_params(id);
		params.insert("command".into(), Value::String(command.to_owned()));
		let reply = self.call(action::EXEC, params, "exec_result").await?;
		Ok(reply.payload_as()?)
	}

	async fn call(&self, action: &str, params: Params, expected: &str) -> Result<Inbound> {
		let reply = self.channel.request(action, params).await?;
		if reply.kind != expected {
			return Err(Error::Protocol(format!("unexpected `{}` reply to `{action}`", reply.kind)));
		}
		Ok(reply)
	}
}

fn id_params(id: &str) -> Params {
	let mut params = Params::new();
	params.insert("id".into(), Value::String(id.to_owned()));
	params
}
