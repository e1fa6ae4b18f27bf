//! Persisted command queue execution engine.
//!
//! A [`CommandLoop`] polls a [`CommandStore`], hands every pending command to
//! the [`Dispatcher`] one at a time, and writes each outcome back before the
//! next command starts. Handlers are looked up by command type in a
//! [`Registry`] and borrow the single [`SessionHandle`] owned by a
//! [`SessionManager`].
//!
//! # Main Types
//!
//! - [`JsonFileStore`] - atomic JSON file persistence of the queue
//! - [`Registry`] / [`Handler`] - pluggable per-type actions
//! - [`Dispatcher`] - handler invocation under a deadline, fault isolation
//! - [`CommandLoop`] - the polling scheduler, stopped through a [`StopHandle`]

pub mod dispatch;
pub mod error;
pub mod handler;
pub mod scheduler;
pub mod session;
pub mod store;

pub use cmdq_protocol::{Command, CommandStatus, Payload, QueueDocument, catalog};
pub use dispatch::{Dispatcher, FailureKind, Outcome};
pub use error::{Error, Result};
pub use handler::{Handler, HandlerResult, Registry, Resolution};
pub use scheduler::{CommandLoop, LoopConfig, LoopState, LoopSummary, PassReport, StopHandle};
pub use session::{Detached, SessionHandle, SessionManager};
pub use store::{CommandStore, JsonFileStore};
