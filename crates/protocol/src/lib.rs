//! Wire types for the persisted command queue.
//!
//! The queue is a single JSON document with a `commands` array. Each entry
//! carries a `type` tag, free-form type-specific fields, and (once processed)
//! a terminal status with its result or error.
//!
//! # Main Types
//!
//! - [`QueueDocument`] - the whole persisted document
//! - [`Command`] - one requested action
//! - [`CommandStatus`] - `pending`, `executed` or `failed`

pub mod catalog;
pub mod queue;
mod timestamp;

pub use queue::{Command, CommandStatus, Payload, QueueDocument};
