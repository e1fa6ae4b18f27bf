use anyhow::{Context, Result};
use cmdq::{Command, CommandStatus, CommandStore, JsonFileStore, QueueDocument};
use colored::Colorize;

use crate::cli::ListFormat;
use crate::config::Config;

pub fn execute(config: &Config, format: ListFormat) -> Result<()> {
	let store = JsonFileStore::new(&config.queue_file);
	let doc = store
		.load()
		.with_context(|| format!("failed to load {}", config.queue_file.display()))?;

	match format {
		ListFormat::Json => println!("{}", serde_json::to_string_pretty(&doc)?),
		ListFormat::Text => print!("{}", render_text(&doc)),
	}
	Ok(())
}

fn render_text(doc: &QueueDocument) -> String {
	if doc.is_empty() {
		return "queue is empty\n".to_string();
	}

	let mut out = String::new();
	let (mut pending, mut executed, mut failed) = (0, 0, 0);
	for (index, command) in doc.commands.iter().enumerate() {
		let state = command.state();
		let label = match state {
			CommandStatus::Pending => {
				pending += 1;
				"pending".yellow()
			}
			CommandStatus::Executed => {
				executed += 1;
				"executed".green()
			}
			CommandStatus::Failed => {
				failed += 1;
				"failed".red()
			}
		};
		out.push_str(&format!("{index:>4}  {label:<8}  {}", command.kind));
		if let Some(detail) = detail(command) {
			out.push_str(&format!("  {}", detail.dimmed()));
		}
		out.push('\n');
	}
	out.push_str(&format!("{} commands: {pending} pending, {executed} executed, {failed} failed\n", doc.len()));
	out
}

fn detail(command: &Command) -> Option<String> {
	match (&command.error, command.executed_at, command.failed_at) {
		(Some(error), _, Some(at)) => Some(format!("{} {error}", at.format("%Y-%m-%d %H:%M:%S"))),
		(Some(error), _, None) => Some(error.clone()),
		(None, Some(at), _) => Some(at.format("%Y-%m-%d %H:%M:%S").to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use cmdq::Payload;
	use serde_json::json;

	use super::*;

	#[test]
	fn empty_queue_says_so() {
		assert_eq!(render_text(&QueueDocument::default()), "queue is empty\n");
	}

	#[test]
	fn text_lists_every_command_with_totals() {
		colored::control::set_override(false);
		let mut doc: QueueDocument = serde_json::from_value(json!({ "commands": [
			{ "type": "x_post", "content": "hi", "status": "executed", "result": {}, "executedAt": "2024-05-01T12:00:00.000Z" },
			{ "type": "x_follow", "username": "x", "status": "failed", "error": "Already following", "failedAt": "2024-05-01T12:00:01.000Z" },
			{ "type": "screenshot", "executed": true },
		] }))
		.unwrap();
		doc.commands.push(Command::new("youtube_comment", Payload::new()));

		let text = render_text(&doc);
		let lines: Vec<_> = text.lines().collect();

		assert_eq!(lines.len(), 5);
		assert!(lines[0].contains("executed") && lines[0].contains("x_post") && lines[0].contains("2024-05-01 12:00:00"));
		assert!(lines[1].contains("failed") && lines[1].contains("Already following"));
		assert!(lines[2].contains("executed") && lines[2].contains("screenshot"));
		assert!(lines[3].contains("pending") && lines[3].contains("youtube_comment"));
		assert_eq!(lines[4], "4 commands: 1 pending, 2 executed, 1 failed");
	}
}
