use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// The queue document exists but is not a valid queue.
	#[error("malformed queue document {}: {source}", path.display())]
	MalformedQueue {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	/// The queue document exists but could not be read.
	#[error("failed to read queue {}: {source}", path.display())]
	Unreadable {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to persist queue {}: {source}", path.display())]
	Persistence {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to lock queue {}: {source}", path.display())]
	Lock {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// A blocking store operation panicked or was cancelled.
	#[error("queue store task failed: {0}")]
	StoreTask(#[from] tokio::task::JoinError),

	#[error("failed to serialize queue: {0}")]
	Serialize(#[source] serde_json::Error),

	#[error("session acquisition failed: {0}")]
	SessionAcquire(String),

	#[error("session release failed: {0}")]
	SessionRelease(String),
}

impl Error {
	/// Returns `true` for errors raised while loading the queue.
	///
	/// The scheduler recovers from these by skipping the cycle.
	pub fn is_load_failure(&self) -> bool {
		matches!(self, Error::MalformedQueue { .. } | Error::Unreadable { .. })
	}
}
