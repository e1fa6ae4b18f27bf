use anyhow::{Context, Result, bail};
use cmdq::{Command, CommandStore, JsonFileStore, Payload, catalog};
use serde_json::Value;
use tracing::warn;

use crate::config::Config;

/// Fields the engine owns, including the legacy terminal markers.
const RESERVED_FIELDS: &[&str] = &["type", "status", "result", "error", "executedAt", "failedAt", "executed", "failed"];

/// Parses `--input` into a payload.
pub fn parse_input(input: Option<&str>) -> Result<Payload> {
	let Some(input) = input else {
		return Ok(Payload::new());
	};

	let payload = match serde_json::from_str::<Value>(input).context("--input is not valid JSON")? {
		Value::Object(payload) => payload,
		other => bail!("--input must be a JSON object, got {}", json_kind(&other)),
	};
	if let Some(field) = RESERVED_FIELDS.iter().find(|field| payload.contains_key(**field)) {
		bail!("--input may not set the reserved field `{field}`");
	}
	Ok(payload)
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

pub fn execute(config: &Config, kind: &str, input: Option<&str>) -> Result<()> {
	if kind.trim().is_empty() {
		bail!("command type may not be empty");
	}
	let payload = parse_input(input)?;

	match catalog::lookup(kind) {
		None => warn!(target = "cmdq.store", kind, "not a built-in command type"),
		Some(_) => {
			let missing = catalog::missing_fields(kind, &payload);
			if !missing.is_empty() {
				warn!(target = "cmdq.store", kind, missing = ?missing, "command is missing fields its handler reads");
			}
		}
	}

	let store = JsonFileStore::new(&config.queue_file);
	let index = store
		.append(Command::new(kind, payload))
		.with_context(|| format!("failed to queue command in {}", config.queue_file.display()))?;
	println!("queued {kind} as #{index}");
	Ok(())
}
