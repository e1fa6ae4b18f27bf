//! Handler resolution, invocation and outcome normalization.
//!
//! Nothing a handler does escapes [`Dispatcher::dispatch`]: unknown types,
//! returned failures, returned errors, panics and deadline overruns all come
//! back as an [`Outcome`] that the scheduler writes onto the command.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use cmdq_protocol::Command;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::handler::{HandlerResult, Registry, Resolution};
use crate::session::SessionHandle;

/// Deadline applied when a registration has no override.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(300);

/// Why a command failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
	/// No handler registered for the command type.
	UnknownCommandType,
	/// The handler ran and answered with a failure.
	Rejected,
	/// The handler returned an error or panicked.
	HandlerFault,
	/// The handler did not finish before its deadline.
	HandlerTimeout,
}

impl FailureKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			FailureKind::UnknownCommandType => "unknown_command_type",
			FailureKind::Rejected => "rejected",
			FailureKind::HandlerFault => "handler_fault",
			FailureKind::HandlerTimeout => "handler_timeout",
		}
	}
}

impl std::fmt::Display for FailureKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Terminal result of dispatching one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	Executed(Value),
	Failed { kind: FailureKind, reason: String },
}

impl Outcome {
	fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
		Outcome::Failed {
			kind,
			reason: reason.into(),
		}
	}

	pub fn is_executed(&self) -> bool {
		matches!(self, Outcome::Executed(_))
	}

	pub fn failure_kind(&self) -> Option<FailureKind> {
		match self {
			Outcome::Executed(_) => None,
			Outcome::Failed { kind, .. } => Some(*kind),
		}
	}

	/// Writes the outcome onto `command`.
	///
	/// Returns `false` without touching the command when it is already
	/// terminal.
	pub fn apply(self, command: &mut Command, at: DateTime<Utc>) -> bool {
		match self {
			Outcome::Executed(result) => command.mark_executed(result, at),
			Outcome::Failed { reason, .. } => command.mark_failed(reason, at),
		}
	}
}

/// Resolves commands to handlers and runs them under a deadline.
#[derive(Debug, Clone)]
pub struct Dispatcher {
	registry: Registry,
	default_timeout: Duration,
}

impl Dispatcher {
	pub fn new(registry: Registry) -> Self {
		Self {
			registry,
			default_timeout: DEFAULT_HANDLER_TIMEOUT,
		}
	}

	pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
		self.default_timeout = timeout;
		self
	}

	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	pub fn default_timeout(&self) -> Duration {
		self.default_timeout
	}

	pub async fn dispatch(&self, session: &SessionHandle, command: &Command) -> Outcome {
		let registration = match self.registry.resolve(&command.kind) {
			Resolution::Handler(registration) => registration,
			Resolution::Unknown(kind) => {
				warn!(target = "cmdq.dispatch", kind, "no handler registered");
				return Outcome::failed(FailureKind::UnknownCommandType, format!("unknown command type: {kind}"));
			}
		};

		let deadline = registration.timeout.unwrap_or(self.default_timeout);
		let started = Instant::now();
		let call = AssertUnwindSafe(registration.handler.handle(session, &command.payload)).catch_unwind();

		let outcome = match tokio::time::timeout(deadline, call).await {
			Err(_) => Outcome::failed(
				FailureKind::HandlerTimeout,
				format!("handler timed out after {}ms", deadline.as_millis()),
			),
			Ok(Err(panic)) => Outcome::failed(FailureKind::HandlerFault, format!("handler panicked: {}", panic_message(&*panic))),
			Ok(Ok(Err(fault))) => Outcome::failed(FailureKind::HandlerFault, format!("{fault:#}")),
			Ok(Ok(Ok(HandlerResult::Failure(reason)))) => Outcome::failed(FailureKind::Rejected, reason),
			Ok(Ok(Ok(HandlerResult::Success(result)))) => Outcome::Executed(result),
		};

		debug!(
			target = "cmdq.dispatch",
			kind = %command.kind,
			elapsed_ms = started.elapsed().as_millis() as u64,
			failure = outcome.failure_kind().map(|kind| kind.as_str()),
			"handler finished"
		);
		outcome
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(msg) = panic.downcast_ref::<&str>() {
		(*msg).to_string()
	} else if let Some(msg) = panic.downcast_ref::<String>() {
		msg.clone()
	} else {
		"unknown panic payload".to_string()
	}
}
