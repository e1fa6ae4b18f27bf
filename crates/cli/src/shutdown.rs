//! Signal handling for `cmdq run`.

use cmdq::StopHandle;
use tracing::{info, warn};

/// Exit status after a forced stop.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Stops the loop on the first SIGINT/SIGTERM (Ctrl+C on Windows) and
/// resolves on the second one.
///
/// The caller abandons the running command when this resolves. Never
/// resolves when the signal handlers cannot be installed.
pub async fn until_forced(stop: StopHandle) {
	match wait_for_signal().await {
		Ok(name) => {
			info!(target = "cmdq.scheduler", signal = name, "stopping after the current command");
			stop.stop();
		}
		Err(err) => {
			warn!(target = "cmdq.scheduler", error = %err, "failed to install signal handlers");
			return std::future::pending().await;
		}
	}

	match wait_for_signal().await {
		Ok(name) => warn!(target = "cmdq.scheduler", signal = name, "second signal, abandoning the current command"),
		Err(_) => std::future::pending().await,
	}
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigterm = signal(SignalKind::terminate())?;
	let mut sigint = signal(SignalKind::interrupt())?;

	tokio::select! {
		_ = sigterm.recv() => Ok("SIGTERM"),
		_ = sigint.recv() => Ok("SIGINT"),
	}
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
	tokio::signal::ctrl_c().await?;
	Ok("Ctrl+C")
}
