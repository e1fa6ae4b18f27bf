//! Handlers backed by an external program.
//!
//! The program is started once per command with the payload (plus `type`) as
//! a JSON object on stdin. It answers with one JSON object on stdout:
//! `{"success": false, "error": "..."}` is a failure, any other object is the
//! success result, and no output at all is an empty success. A non-zero exit
//! status is a fault. The child is killed if the dispatcher gives up on it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, bail};
use async_trait::async_trait;
use cmdq::{Handler, HandlerResult, Payload, SessionHandle};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Environment variable carrying the command type.
pub const ENV_COMMAND_TYPE: &str = "CMDQ_COMMAND_TYPE";
/// Environment variable carrying the session endpoint, when there is one.
pub const ENV_SESSION_ENDPOINT: &str = "CMDQ_SESSION_ENDPOINT";
/// Environment variable carrying the artifacts directory (screenshots).
pub const ENV_ARTIFACTS_DIR: &str = "CMDQ_ARTIFACTS_DIR";

#[derive(Debug, Clone)]
pub struct ProcessHandler {
	kind: String,
	program: String,
	args: Vec<String>,
	env: BTreeMap<String, String>,
	artifacts_dir: Option<PathBuf>,
}

impl ProcessHandler {
	pub fn new(kind: impl Into<String>, program: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			program: program.into(),
			args: Vec::new(),
			env: BTreeMap::new(),
			artifacts_dir: None,
		}
	}

	pub fn args<I, A>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = A>,
		A: Into<String>,
	{
		self.args.extend(args.into_iter().map(Into::into));
		self
	}

	pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.insert(key.into(), value.into());
		self
	}

	pub fn artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.artifacts_dir = Some(dir.into());
		self
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	pub fn program(&self) -> &str {
		&self.program
	}

	fn command(&self, session: &SessionHandle) -> Command {
		let mut cmd = Command::new(&self.program);
		cmd.args(&self.args)
			.envs(&self.env)
			.env(ENV_COMMAND_TYPE, &self.kind)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		if let Some(endpoint) = session.endpoint() {
			cmd.env(ENV_SESSION_ENDPOINT, endpoint);
		}
		if let Some(dir) = &self.artifacts_dir {
			cmd.env(ENV_ARTIFACTS_DIR, dir);
		}
		cmd
	}
}

#[async_trait]
impl Handler for ProcessHandler {
	async fn handle(&self, session: &SessionHandle, payload: &Payload) -> anyhow::Result<HandlerResult> {
		let mut input = payload.clone();
		input.insert("type".into(), Value::String(self.kind.clone()));
		let input = serde_json::to_vec(&input).context("failed to encode payload")?;

		let mut child = self
			.command(session)
			.spawn()
			.with_context(|| format!("failed to spawn `{}`", self.program))?;
		debug!(target = "cmdq.handler", kind = %self.kind, program = %self.program, pid = child.id(), "handler process started");

		let stdin = child.stdin.take();
		let feed = async move {
			if let Some(mut stdin) = stdin {
				// A program that ignores its input may close stdin early.
				if let Err(err) = stdin.write_all(&input).await {
					debug!(target = "cmdq.handler", error = %err, "handler process did not read its input");
				}
			}
		};
		let ((), output) = tokio::join!(feed, child.wait_with_output());
		let output = output.with_context(|| format!("failed to wait for `{}`", self.program))?;

		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr);
			match last_line(&stderr) {
				Some(line) => bail!("`{}` exited with {}: {line}", self.program, output.status),
				None => bail!("`{}` exited with {}", self.program, output.status),
			}
		}

		let stdout = String::from_utf8_lossy(&output.stdout);
		parse_answer(&stdout).with_context(|| format!("`{}` produced an invalid answer", self.program))
	}
}

fn last_line(text: &str) -> Option<&str> {
	text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

/// Normalizes a handler program's stdout into a [`HandlerResult`].
///
/// When the whole output is not a JSON object, the last non-empty line is
/// tried so programs may log progress before answering.
pub fn parse_answer(stdout: &str) -> anyhow::Result<HandlerResult> {
	let trimmed = stdout.trim();
	if trimmed.is_empty() {
		return Ok(HandlerResult::ok());
	}

	let object = match serde_json::from_str::<Value>(trimmed) {
		Ok(Value::Object(object)) => object,
		_ => match last_line(trimmed).map(serde_json::from_str::<Value>) {
			Some(Ok(Value::Object(object))) => object,
			_ => bail!("expected a JSON object on stdout, got: {}", truncate(trimmed, 200)),
		},
	};
	Ok(classify(object))
}

fn classify(object: Map<String, Value>) -> HandlerResult {
	if object.get("success") != Some(&Value::Bool(false)) {
		return HandlerResult::Success(Value::Object(object));
	}
	let reason = ["error", "reason", "message"]
		.iter()
		.find_map(|key| object.get(*key).and_then(Value::as_str))
		.unwrap_or("handler reported failure");
	HandlerResult::failure(reason)
}

fn truncate(text: &str, max: usize) -> &str {
	match text.char_indices().nth(max) {
		Some((idx, _)) => &text[..idx],
		None => text,
	}
}
