//! Browser session managers.
//!
//! Both managers hand out a [`SessionHandle`] whose endpoint is the browser's
//! DevTools URL. Handlers connect to it themselves (for example through
//! `pw connect`); the engine never talks to the browser.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use cmdq::{SessionHandle, SessionManager};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const DEVTOOLS_MARKER: &str = "DevTools listening on ";

/// Default time a launched browser gets to print its endpoint.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Extracts the endpoint from a `DevTools listening on ws://...` stderr line.
pub fn parse_devtools_line(line: &str) -> Option<String> {
	let (_, rest) = line.split_once(DEVTOOLS_MARKER)?;
	let endpoint = rest.trim();
	(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")).then(|| endpoint.to_string())
}

fn is_endpoint_url(endpoint: &str) -> bool {
	["ws://", "wss://", "http://", "https://"]
		.iter()
		.any(|scheme| endpoint.len() > scheme.len() && endpoint.starts_with(scheme))
}

/// Reuses a browser that is already running.
#[derive(Debug, Clone)]
pub struct AttachSession {
	endpoint: String,
}

impl AttachSession {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self { endpoint: endpoint.into() }
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}
}

#[async_trait]
impl SessionManager for AttachSession {
	async fn acquire(&mut self) -> cmdq::Result<SessionHandle> {
		if !is_endpoint_url(&self.endpoint) {
			return Err(cmdq::Error::SessionAcquire(Error::InvalidEndpoint(self.endpoint.clone()).to_string()));
		}
		info!(target = "cmdq.session", endpoint = %self.endpoint, "attaching to running browser");
		Ok(SessionHandle::new("attach", Some(self.endpoint.clone())))
	}

	async fn release(&mut self, _handle: SessionHandle) -> cmdq::Result<()> {
		debug!(target = "cmdq.session", "detached from browser");
		Ok(())
	}
}

/// Starts a browser process for the lifetime of the loop.
///
/// The browser must be started with remote debugging enabled (for Chromium,
/// `--remote-debugging-port=0`) so it announces its endpoint on stderr.
#[derive(Debug)]
pub struct LaunchSession {
	program: String,
	args: Vec<String>,
	startup_timeout: Duration,
	browser: Option<Child>,
}

impl LaunchSession {
	pub fn new<I, A>(program: impl Into<String>, args: I) -> Self
	where
		I: IntoIterator<Item = A>,
		A: Into<String>,
	{
		Self {
			program: program.into(),
			args: args.into_iter().map(Into::into).collect(),
			startup_timeout: DEFAULT_STARTUP_TIMEOUT,
			browser: None,
		}
	}

	pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
		self.startup_timeout = timeout;
		self
	}

	/// Process id of the running browser.
	pub fn pid(&self) -> Option<u32> {
		self.browser.as_ref().and_then(Child::id)
	}

	fn label(&self) -> String {
		let name = Path::new(&self.program)
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_else(|| self.program.clone());
		format!("launch:{name}")
	}

	/// Spawns the browser and waits for its DevTools endpoint.
	pub async fn launch(&mut self) -> Result<String> {
		if self.browser.is_some() {
			return Err(Error::AlreadyAcquired);
		}

		let mut child = Command::new(&self.program)
			.args(&self.args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|source| Error::LaunchFailed {
				program: self.program.clone(),
				source,
			})?;
		debug!(target = "cmdq.session", program = %self.program, pid = child.id(), "browser spawned");

		let stderr = child
			.stderr
			.take()
			.ok_or_else(|| Error::Io(std::io::Error::other("browser stderr was not captured")))?;
		let mut lines = BufReader::new(stderr).lines();
		let mut last_line = None;
		let started = tokio::time::Instant::now();

		let scan = async {
			while let Some(line) = lines.next_line().await? {
				if let Some(endpoint) = parse_devtools_line(&line) {
					return Ok::<_, Error>(Some(endpoint));
				}
				debug!(target = "cmdq.session", line = %line, "browser stderr");
				last_line = Some(line);
			}
			Ok(None)
		};

		let scanned = tokio::time::timeout(self.startup_timeout, scan).await;
		let endpoint = match scanned {
			Ok(Ok(Some(endpoint))) => endpoint,
			Ok(Ok(None)) => {
				// stderr closed; the process may still be running.
				let remaining = self.startup_timeout.saturating_sub(started.elapsed());
				return match tokio::time::timeout(remaining, child.wait()).await {
					Ok(status) => Err(Error::ExitedEarly {
						status: status?.to_string(),
						last_line,
					}),
					Err(_) => {
						warn!(target = "cmdq.session", program = %self.program, "browser closed stderr without announcing an endpoint");
						let _ = child.kill().await;
						Err(Error::StartupTimeout(self.startup_timeout.as_millis() as u64))
					}
				};
			}
			Ok(Err(err)) => {
				let _ = child.kill().await;
				return Err(err);
			}
			Err(_) => {
				let _ = child.kill().await;
				return Err(Error::StartupTimeout(self.startup_timeout.as_millis() as u64));
			}
		};

		// Keep draining stderr so the browser never blocks on a full pipe.
		tokio::spawn(async move {
			while let Ok(Some(line)) = lines.next_line().await {
				debug!(target = "cmdq.session", line = %line, "browser stderr");
			}
		});

		info!(target = "cmdq.session", program = %self.program, endpoint = %endpoint, "browser launched");
		self.browser = Some(child);
		Ok(endpoint)
	}

	/// Kills and reaps the browser. Does nothing when none is running.
	pub async fn shutdown(&mut self) -> Result<()> {
		let Some(mut child) = self.browser.take() else {
			return Ok(());
		};

		if let Some(status) = child.try_wait()? {
			warn!(target = "cmdq.session", status = %status, "browser already exited");
			return Ok(());
		}
		child.kill().await?;
		info!(target = "cmdq.session", program = %self.program, "browser stopped");
		Ok(())
	}
}

#[async_trait]
impl SessionManager for LaunchSession {
	async fn acquire(&mut self) -> cmdq::Result<SessionHandle> {
		let endpoint = self
			.launch()
			.await
			.map_err(|err| cmdq::Error::SessionAcquire(err.to_string()))?;
		Ok(SessionHandle::new(self.label(), Some(endpoint)))
	}

	async fn release(&mut self, _handle: SessionHandle) -> cmdq::Result<()> {
		self.shutdown().await.map_err(|err| cmdq::Error::SessionRelease(err.to_string()))
	}
}
