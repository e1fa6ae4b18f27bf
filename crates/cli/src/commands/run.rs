use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cmdq::{CommandLoop, Dispatcher, JsonFileStore, PassReport, Registry, catalog};
use cmdq_runtime::ProcessHandler;
use colored::Colorize;
use tracing::{info, warn};

use crate::config::Config;
use crate::shutdown;

/// Registers one process handler per configured command type.
pub fn build_registry(config: &Config) -> Registry {
	let mut registry = Registry::new();
	for (kind, handler) in &config.handlers {
		if catalog::lookup(kind).is_none() {
			warn!(target = "cmdq.handler", kind = %kind, "handler configured for a type outside the built-in catalog");
		}

		let mut process = ProcessHandler::new(kind, &handler.program)
			.args(handler.args.iter().cloned())
			.artifacts_dir(&config.artifacts_dir);
		for (key, value) in &handler.env {
			process = process.env(key, value);
		}

		match handler.timeout_ms {
			Some(ms) => registry.register_with_timeout(kind, Arc::new(process), Duration::from_millis(ms)),
			None => registry.register(kind, Arc::new(process)),
		};
	}
	registry
}

fn ensure_dirs(config: &Config) -> Result<()> {
	if let Some(parent) = config.queue_file.parent().filter(|p| !p.as_os_str().is_empty()) {
		create_dir(parent)?;
	}
	create_dir(&config.artifacts_dir)
}

fn create_dir(dir: &Path) -> Result<()> {
	fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

pub async fn execute(config: &Config, once: bool) -> Result<()> {
	ensure_dirs(config)?;

	let registry = build_registry(config);
	if registry.is_empty() {
		warn!(target = "cmdq.handler", "no handlers configured, every pending command will fail as unknown");
	}
	info!(
		target = "cmdq.handler",
		kinds = ?registry.kinds().collect::<Vec<_>>(),
		"handlers registered"
	);

	let dispatcher = Dispatcher::new(registry).with_default_timeout(config.handler_timeout());
	let store = JsonFileStore::new(&config.queue_file);
	let mut command_loop = CommandLoop::new(store, dispatcher, config.loop_config());
	let mut sessions = config.session_manager()?;

	if once {
		let session = sessions.acquire().await.context("failed to acquire session")?;
		let report = command_loop.run_once(&session).await;
		sessions.release(session).await.context("failed to release session")?;
		print_report(&report);
		if report.load_failed {
			anyhow::bail!("queue {} could not be loaded", config.queue_file.display());
		}
		if report.unsaved > 0 {
			anyhow::bail!("an outcome could not be saved to {}", config.queue_file.display());
		}
		return Ok(());
	}

	let stop = command_loop.stop_handle();
	let finished = tokio::select! {
		summary = command_loop.run(sessions.as_mut()) => Some(summary),
		() = shutdown::until_forced(stop) => None,
	};
	let Some(summary) = finished else {
		// The running handler was dropped with the loop future. Dropping the
		// manager kills a launched browser; `process::exit` runs no destructors.
		drop(sessions);
		eprintln!("{} forced stop, the running command stays pending", "stopped:".bold());
		std::process::exit(shutdown::FORCED_EXIT_CODE);
	};
	let summary = summary.context("command loop failed")?;

	eprintln!(
		"{} {} passes, {} executed, {} failed",
		"stopped:".bold(),
		summary.passes,
		summary.executed.to_string().green(),
		summary.failed.to_string().red()
	);
	if summary.unsaved > 0 {
		anyhow::bail!("stopped with an outcome that was never saved to {}", config.queue_file.display());
	}
	Ok(())
}

fn print_report(report: &PassReport) {
	println!(
		"{} executed, {} failed, {} already done",
		report.executed.to_string().green(),
		report.failed.to_string().red(),
		report.skipped_terminal
	);
}
