//! Action handler contract and the type-keyed registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cmdq_protocol::Payload;
use serde_json::Value;

use crate::session::SessionHandle;

/// Normalized handler answer.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResult {
	Success(Value),
	Failure(String),
}

impl HandlerResult {
	/// Success with an empty object as result.
	pub fn ok() -> Self {
		HandlerResult::Success(Value::Object(Default::default()))
	}

	pub fn failure(reason: impl Into<String>) -> Self {
		HandlerResult::Failure(reason.into())
	}
}

/// Implementation of one command type.
///
/// Returning `Err` (or panicking) is a fault; the dispatcher records it as a
/// command failure. Implementations must not keep the session handle and
/// must be callable repeatedly with different payloads.
#[async_trait]
pub trait Handler: Send + Sync {
	async fn handle(&self, session: &SessionHandle, payload: &Payload) -> anyhow::Result<HandlerResult>;
}

/// A registered handler plus its optional deadline override.
#[derive(Clone)]
pub struct Registration {
	pub handler: Arc<dyn Handler>,
	pub timeout: Option<Duration>,
}

impl std::fmt::Debug for Registration {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Registration").field("timeout", &self.timeout).finish_non_exhaustive()
	}
}

/// Outcome of looking up a command type.
#[derive(Debug)]
pub enum Resolution<'a> {
	Handler(&'a Registration),
	/// No handler registered for the contained type.
	Unknown(&'a str),
}

/// Maps command types to handlers.
#[derive(Debug, Default, Clone)]
pub struct Registry {
	handlers: BTreeMap<String, Registration>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` for `kind`, replacing any previous registration.
	pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn Handler>) -> &mut Self {
		self.insert(kind.into(), handler, None)
	}

	/// Registers `handler` with a deadline that overrides the dispatcher default.
	pub fn register_with_timeout(&mut self, kind: impl Into<String>, handler: Arc<dyn Handler>, timeout: Duration) -> &mut Self {
		self.insert(kind.into(), handler, Some(timeout))
	}

	fn insert(&mut self, kind: String, handler: Arc<dyn Handler>, timeout: Option<Duration>) -> &mut Self {
		self.handlers.insert(kind, Registration { handler, timeout });
		self
	}

	pub fn resolve<'a>(&'a self, kind: &'a str) -> Resolution<'a> {
		match self.handlers.get(kind) {
			Some(registration) => Resolution::Handler(registration),
			None => Resolution::Unknown(kind),
		}
	}

	pub fn contains(&self, kind: &str) -> bool {
		self.handlers.contains_key(kind)
	}

	/// Registered types in sorted order.
	pub fn kinds(&self) -> impl Iterator<Item = &str> {
		self.handlers.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.handlers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.is_empty()
	}
}
