//! The single automation session shared by all handlers.
//!
//! A [`SessionManager`] is acquired once when the loop starts and released
//! once when it stops. Handlers only ever borrow the [`SessionHandle`] for
//! the duration of one call.

use async_trait::async_trait;

use crate::error::Result;

/// Opaque handle to the automation session.
///
/// Not `Clone`; handlers receive `&SessionHandle` for one call only.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle {
	label: String,
	endpoint: Option<String>,
}

impl SessionHandle {
	pub fn new(label: impl Into<String>, endpoint: Option<String>) -> Self {
		Self {
			label: label.into(),
			endpoint,
		}
	}

	/// Handle for running without any browser session.
	pub fn detached() -> Self {
		Self::new("detached", None)
	}

	/// Short description for logs (`launch:chromium`, `attach`, ...).
	pub fn label(&self) -> &str {
		&self.label
	}

	/// CDP or WebSocket endpoint of the browser, when there is one.
	pub fn endpoint(&self) -> Option<&str> {
		self.endpoint.as_deref()
	}
}

/// Owner of the session lifecycle.
#[async_trait]
pub trait SessionManager: Send {
	async fn acquire(&mut self) -> Result<SessionHandle>;

	async fn release(&mut self, handle: SessionHandle) -> Result<()>;
}

/// Session manager for handlers that need no browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

#[async_trait]
impl SessionManager for Detached {
	async fn acquire(&mut self) -> Result<SessionHandle> {
		Ok(SessionHandle::detached())
	}

	async fn release(&mut self, _handle: SessionHandle) -> Result<()> {
		Ok(())
	}
}
