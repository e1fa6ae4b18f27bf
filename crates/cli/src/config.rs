//! `config.json` loading and CLI overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cmdq::{Detached, LoopConfig, SessionManager};
use cmdq_runtime::{AttachSession, LaunchSession};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid config: {0}")]
	Invalid(String),
}

/// Engine configuration. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
	pub queue_file: PathBuf,
	pub artifacts_dir: PathBuf,
	pub poll_interval_ms: u64,
	pub handler_timeout_ms: u64,
	pub save_retries: u32,
	pub session: SessionConfig,
	pub handlers: BTreeMap<String, HandlerConfig>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			queue_file: PathBuf::from("data/commands.json"),
			artifacts_dir: PathBuf::from("screenshots"),
			poll_interval_ms: 30_000,
			handler_timeout_ms: 300_000,
			save_retries: 3,
			session: SessionConfig::default(),
			handlers: BTreeMap::new(),
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
	#[default]
	None,
	Attach,
	Launch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
	pub mode: SessionMode,
	/// DevTools endpoint for `attach`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub endpoint: Option<String>,
	/// Browser executable for `launch`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub command: Option<String>,
	pub args: Vec<String>,
	pub startup_timeout_ms: u64,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			mode: SessionMode::None,
			endpoint: None,
			command: None,
			args: Vec::new(),
			startup_timeout_ms: 30_000,
		}
	}
}

/// External program bound to one command type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerConfig {
	pub program: String,
	#[serde(default)]
	pub args: Vec<String>,
	#[serde(default)]
	pub env: BTreeMap<String, String>,
	/// Overrides `handlerTimeoutMs` for this type.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout_ms: Option<u64>,
}

/// Upper bound for `saveRetries`.
pub const MAX_SAVE_RETRIES: u32 = 100;

/// Values given on the command line, applied over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
	pub queue_file: Option<PathBuf>,
	pub poll_interval_ms: Option<u64>,
}

impl Config {
	/// Loads `path`, or the default location when `path` is `None`.
	///
	/// An explicit file must exist; a missing default file yields defaults.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		match path {
			Some(path) => Self::read(path),
			None => match default_config_path() {
				Some(path) if path.exists() => Self::read(&path),
				_ => Ok(Self::default()),
			},
		}
	}

	fn read(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		config.validate()?;
		Ok(config)
	}

	/// Applies `overrides` and validates the result.
	pub fn apply(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
		if let Some(queue_file) = overrides.queue_file {
			self.queue_file = queue_file;
		}
		if let Some(interval) = overrides.poll_interval_ms {
			self.poll_interval_ms = interval;
		}
		self.validate()
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.poll_interval_ms == 0 {
			return Err(ConfigError::Invalid("pollIntervalMs must be greater than zero".into()));
		}
		if self.save_retries > MAX_SAVE_RETRIES {
			return Err(ConfigError::Invalid(format!("saveRetries must be at most {MAX_SAVE_RETRIES}")));
		}
		if self.handler_timeout_ms == 0 {
			return Err(ConfigError::Invalid("handlerTimeoutMs must be greater than zero".into()));
		}
		for (kind, handler) in &self.handlers {
			if handler.program.trim().is_empty() {
				return Err(ConfigError::Invalid(format!("handler `{kind}` has an empty program")));
			}
			if handler.timeout_ms == Some(0) {
				return Err(ConfigError::Invalid(format!("handler `{kind}` has a zero timeoutMs")));
			}
		}
		match self.session.mode {
			SessionMode::Attach if self.session.endpoint.is_none() => {
				Err(ConfigError::Invalid("session mode `attach` requires `endpoint`".into()))
			}
			SessionMode::Launch if self.session.command.is_none() => {
				Err(ConfigError::Invalid("session mode `launch` requires `command`".into()))
			}
			_ => Ok(()),
		}
	}

	pub fn loop_config(&self) -> LoopConfig {
		LoopConfig {
			poll_interval: Duration::from_millis(self.poll_interval_ms),
			save_retries: self.save_retries,
			..LoopConfig::default()
		}
	}

	pub fn handler_timeout(&self) -> Duration {
		Duration::from_millis(self.handler_timeout_ms)
	}

	/// Builds the session manager selected by `session.mode`.
	pub fn session_manager(&self) -> Result<Box<dyn SessionManager>, ConfigError> {
		let session = &self.session;
		let manager: Box<dyn SessionManager> = match session.mode {
			SessionMode::None => Box::new(Detached),
			SessionMode::Attach => {
				let endpoint = session
					.endpoint
					.clone()
					.ok_or_else(|| ConfigError::Invalid("session mode `attach` requires `endpoint`".into()))?;
				Box::new(AttachSession::new(endpoint))
			}
			SessionMode::Launch => {
				let command = session
					.command
					.clone()
					.ok_or_else(|| ConfigError::Invalid("session mode `launch` requires `command`".into()))?;
				Box::new(
					LaunchSession::new(command, session.args.iter().cloned())
						.with_startup_timeout(Duration::from_millis(session.startup_timeout_ms)),
				)
			}
		};
		Ok(manager)
	}
}

/// `$XDG_CONFIG_HOME/cmdq/config.json`, falling back to the platform config dir.
pub fn default_config_path() -> Option<PathBuf> {
	std::env::var_os("XDG_CONFIG_HOME")
		.filter(|dir| !dir.is_empty())
		.map(PathBuf::from)
		.or_else(dirs::config_dir)
		.map(|dir| dir.join("cmdq").join("config.json"))
}
