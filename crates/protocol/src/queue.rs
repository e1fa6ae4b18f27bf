//! Queue document and command types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type-specific command fields, stored as siblings of `type` on disk.
pub type Payload = Map<String, Value>;

/// The persisted queue document.
///
/// Top-level fields other than `commands` are kept in [`extra`](Self::extra)
/// and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueDocument {
	#[serde(default)]
	pub commands: Vec<Command>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl QueueDocument {
	pub fn new(commands: Vec<Command>) -> Self {
		Self {
			commands,
			extra: Map::new(),
		}
	}

	/// Positions of commands that still need to run, in stored order.
	pub fn pending_indices(&self) -> Vec<usize> {
		self.commands
			.iter()
			.enumerate()
			.filter(|(_, cmd)| cmd.state().is_pending())
			.map(|(idx, _)| idx)
			.collect()
	}

	pub fn len(&self) -> usize {
		self.commands.len()
	}

	pub fn is_empty(&self) -> bool {
		self.commands.is_empty()
	}
}

/// Lifecycle status of a [`Command`].
///
/// `pending` is never written; an absent `status` field means pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
	#[default]
	Pending,
	Executed,
	Failed,
}

impl CommandStatus {
	pub fn is_pending(&self) -> bool {
		matches!(self, CommandStatus::Pending)
	}

	pub fn is_terminal(&self) -> bool {
		!self.is_pending()
	}
}

impl std::fmt::Display for CommandStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CommandStatus::Pending => write!(f, "pending"),
			CommandStatus::Executed => write!(f, "executed"),
			CommandStatus::Failed => write!(f, "failed"),
		}
	}
}

/// One requested action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
	/// Handler selector, e.g. `x_post` or `screenshot`.
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "CommandStatus::is_pending")]
	pub status: CommandStatus,
	/// Handler success payload; only set when executed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Failure reason; only set when failed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, with = "crate::timestamp", skip_serializing_if = "Option::is_none")]
	pub executed_at: Option<DateTime<Utc>>,
	#[serde(default, with = "crate::timestamp", skip_serializing_if = "Option::is_none")]
	pub failed_at: Option<DateTime<Utc>>,
	#[serde(flatten)]
	pub payload: Payload,
}

impl Command {
	/// Creates a pending command.
	pub fn new(kind: impl Into<String>, payload: Payload) -> Self {
		Self {
			kind: kind.into(),
			status: CommandStatus::Pending,
			result: None,
			error: None,
			executed_at: None,
			failed_at: None,
			payload,
		}
	}

	/// Effective status, honoring the legacy `"executed": true` and
	/// `"failed": true` markers written by older queue producers.
	pub fn state(&self) -> CommandStatus {
		if self.status.is_terminal() {
			return self.status;
		}
		if legacy_flag(&self.payload, "executed") {
			CommandStatus::Executed
		} else if legacy_flag(&self.payload, "failed") {
			CommandStatus::Failed
		} else {
			CommandStatus::Pending
		}
	}

	/// Transitions `pending -> executed`. Returns `false` and leaves the
	/// command untouched when it is already terminal.
	pub fn mark_executed(&mut self, result: Value, at: DateTime<Utc>) -> bool {
		if self.state().is_terminal() {
			return false;
		}
		self.status = CommandStatus::Executed;
		self.result = Some(result);
		self.error = None;
		self.executed_at = Some(at);
		true
	}

	/// Transitions `pending -> failed`. Returns `false` and leaves the
	/// command untouched when it is already terminal.
	pub fn mark_failed(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> bool {
		if self.state().is_terminal() {
			return false;
		}
		self.status = CommandStatus::Failed;
		self.error = Some(error.into());
		self.result = None;
		self.failed_at = Some(at);
		true
	}
}

fn legacy_flag(payload: &Payload, key: &str) -> bool {
	payload.get(key).and_then(Value::as_bool).unwrap_or(false)
}
