//! Error types for session management.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// The browser process could not be spawned.
	#[error("failed to launch browser `{program}`: {source}")]
	LaunchFailed {
		program: String,
		#[source]
		source: std::io::Error,
	},

	/// The browser exited before printing its DevTools endpoint.
	#[error("browser exited before reporting a DevTools endpoint ({status}){}", last_line.as_ref().map(|l| format!(": {l}")).unwrap_or_default())]
	ExitedEarly { status: String, last_line: Option<String> },

	/// No DevTools endpoint appeared on stderr in time.
	#[error("browser did not report a DevTools endpoint within {0}ms")]
	StartupTimeout(u64),

	#[error("invalid session endpoint `{0}`: expected a ws://, wss://, http:// or https:// URL")]
	InvalidEndpoint(String),

	#[error("session already acquired")]
	AlreadyAcquired,

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}
