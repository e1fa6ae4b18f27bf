//! The polling command loop.
//!
//! One pass loads the queue, runs every pending command in stored order and
//! writes each transition onto the stored queue before the next command
//! starts. The write goes through [`CommandStore::update`], so commands a
//! producer appended in the meantime are kept. Passes repeat after a
//! fixed interval until [`StopHandle::stop`] is called. Stop is observed
//! between commands and between passes, never while a handler runs.
//!
//! When a save keeps failing after its retries, the outcome is parked as
//! unsaved and the pass ends. Later passes first write the parked outcome
//! back (without calling the handler again) before anything new starts.
//!
//! Store calls block on file I/O and locks, so they run on tokio's blocking
//! pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cmdq_protocol::{Command, CommandStatus, QueueDocument};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, Outcome};
use crate::error::Result;
use crate::session::{SessionHandle, SessionManager};
use crate::store::CommandStore;

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct LoopConfig {
	/// Sleep between passes.
	pub poll_interval: Duration,
	/// Extra save attempts after the first one fails.
	pub save_retries: u32,
	/// Base delay between save attempts, multiplied by the attempt number.
	pub retry_backoff: Duration,
}

impl Default for LoopConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(30),
			save_retries: 3,
			retry_backoff: Duration::from_millis(200),
		}
	}
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
	Idle,
	Polling,
	/// Running the command at this queue position.
	Dispatching(usize),
	Persisting,
	Stopped,
}

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
	pub executed: usize,
	pub failed: usize,
	/// Commands already terminal when the pass loaded the queue.
	pub skipped_terminal: usize,
	/// Outcomes whose save failed and that are parked for the next pass.
	pub unsaved: usize,
	/// Outcomes parked by an earlier pass and written back by this one.
	pub recovered: usize,
	/// The queue could not be loaded; nothing ran.
	pub load_failed: bool,
	/// Stop was requested before every pending command ran.
	pub interrupted: bool,
}

impl PassReport {
	pub fn processed(&self) -> usize {
		self.executed + self.failed
	}

	fn is_quiet(&self) -> bool {
		self.processed() == 0 && self.unsaved == 0 && self.recovered == 0 && !self.load_failed
	}
}

/// Totals over the lifetime of [`CommandLoop::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
	pub passes: usize,
	pub executed: usize,
	pub failed: usize,
	/// Outcomes still parked when the loop stopped.
	pub unsaved: usize,
}

impl LoopSummary {
	fn record(&mut self, report: &PassReport) {
		self.passes += 1;
		self.executed += report.executed;
		self.failed += report.failed;
	}
}

/// Requests a graceful stop of a [`CommandLoop`].
#[derive(Debug, Clone)]
pub struct StopHandle {
	tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
	pub fn stop(&self) {
		self.tx.send_replace(true);
	}

	pub fn is_stopped(&self) -> bool {
		*self.tx.borrow()
	}
}

/// One command's move to a terminal state, not yet written to the store.
#[derive(Debug, Clone)]
struct Transition {
	index: usize,
	/// The command as loaded, before the transition.
	before: Command,
	after: Command,
}

impl Transition {
	/// Applies the transition only onto a command identical to `before`.
	fn apply_to(&self, doc: &mut QueueDocument) -> bool {
		match doc.commands.get_mut(self.index) {
			Some(current) if *current == self.before => {
				*current = self.after.clone();
				true
			}
			_ => false,
		}
	}
}

enum WriteBack {
	Persisted,
	Discarded,
	Failed,
}

pub struct CommandLoop<S> {
	store: Arc<S>,
	dispatcher: Dispatcher,
	config: LoopConfig,
	state: LoopState,
	unsaved: Option<Transition>,
	stop: StopHandle,
	stop_rx: watch::Receiver<bool>,
}

impl<S: CommandStore + 'static> CommandLoop<S> {
	pub fn new(store: S, dispatcher: Dispatcher, config: LoopConfig) -> Self {
		let (tx, stop_rx) = watch::channel(false);
		Self {
			store: Arc::new(store),
			dispatcher,
			config,
			state: LoopState::Idle,
			unsaved: None,
			stop: StopHandle { tx: Arc::new(tx) },
			stop_rx,
		}
	}

	pub fn stop_handle(&self) -> StopHandle {
		self.stop.clone()
	}

	pub fn state(&self) -> LoopState {
		self.state
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	/// Returns `true` while an outcome is parked waiting for a successful save.
	pub fn has_unsaved(&self) -> bool {
		self.unsaved.is_some()
	}

	fn stop_requested(&self) -> bool {
		*self.stop_rx.borrow()
	}

	fn transition(&mut self, next: LoopState) {
		if self.state != next {
			debug!(target = "cmdq.scheduler", from = ?self.state, to = ?next, "state");
			self.state = next;
		}
	}

	/// Acquires a session, runs passes until stopped, then releases the session.
	pub async fn run<M>(&mut self, sessions: &mut M) -> Result<LoopSummary>
	where
		M: SessionManager + ?Sized,
	{
		let session = sessions.acquire().await?;
		info!(
			target = "cmdq.scheduler",
			session = session.label(),
			endpoint = session.endpoint(),
			"session acquired"
		);

		let summary = self.run_with(&session).await;

		let label = session.label().to_string();
		sessions.release(session).await?;
		info!(target = "cmdq.scheduler", session = %label, "session released");
		Ok(summary)
	}

	/// Runs passes against an already acquired session until stopped.
	pub async fn run_with(&mut self, session: &SessionHandle) -> LoopSummary {
		let mut summary = LoopSummary::default();
		info!(
			target = "cmdq.scheduler",
			interval_ms = self.config.poll_interval.as_millis() as u64,
			handlers = self.dispatcher.registry().len(),
			"command loop started"
		);

		while !self.stop_requested() {
			let report = self.run_once(session).await;
			summary.record(&report);

			if self.stop_requested() {
				break;
			}
			self.sleep_or_stop().await;
		}

		self.transition(LoopState::Stopped);
		if let Some(unsaved) = &self.unsaved {
			error!(
				target = "cmdq.scheduler",
				index = unsaved.index,
				kind = %unsaved.after.kind,
				status = %unsaved.after.status,
				"stopping with an outcome that was never persisted"
			);
			summary.unsaved = 1;
		}
		info!(
			target = "cmdq.scheduler",
			passes = summary.passes,
			executed = summary.executed,
			failed = summary.failed,
			"command loop stopped"
		);
		summary
	}

	async fn sleep_or_stop(&mut self) {
		self.transition(LoopState::Idle);
		let interval = self.config.poll_interval;
		tokio::select! {
			_ = tokio::time::sleep(interval) => {}
			// The loop owns a sender, so the channel never closes.
			_ = self.stop_rx.changed() => {}
		}
	}

	/// Performs one pass over the queue.
	pub async fn run_once(&mut self, session: &SessionHandle) -> PassReport {
		let mut report = PassReport::default();
		self.transition(LoopState::Polling);

		let mut doc = match self.blocking(|store| store.load()).await {
			Ok(doc) => doc,
			Err(err) => {
				warn!(target = "cmdq.scheduler", error = %err, "skipping cycle, queue could not be loaded");
				report.load_failed = true;
				self.transition(LoopState::Idle);
				return report;
			}
		};

		if let Some(parked) = self.unsaved.take() {
			self.transition(LoopState::Persisting);
			match self.persist(&mut doc, &parked).await {
				WriteBack::Persisted => {
					info!(target = "cmdq.scheduler", index = parked.index, "unsaved outcome persisted");
					report.recovered = 1;
				}
				WriteBack::Discarded => {}
				WriteBack::Failed => {
					self.unsaved = Some(parked);
					report.unsaved = 1;
					self.transition(LoopState::Idle);
					return report;
				}
			}
		}

		let pending = doc.pending_indices();
		report.skipped_terminal = doc.len() - pending.len();

		for index in pending {
			if self.stop_requested() {
				report.interrupted = true;
				break;
			}

			// `doc` is refreshed from the store after every write.
			let before = match doc.commands.get(index) {
				Some(command) if command.state() == CommandStatus::Pending => command.clone(),
				_ => continue,
			};
			self.transition(LoopState::Dispatching(index));
			info!(target = "cmdq.scheduler", index, kind = %before.kind, "executing command");

			let outcome = self.dispatcher.dispatch(session, &before).await;
			log_outcome(index, &before.kind, &outcome);
			match &outcome {
				Outcome::Executed(_) => report.executed += 1,
				Outcome::Failed { .. } => report.failed += 1,
			}
			let mut after = before.clone();
			outcome.apply(&mut after, Utc::now());
			let change = Transition { index, before, after };

			self.transition(LoopState::Persisting);
			if let WriteBack::Failed = self.persist(&mut doc, &change).await {
				self.unsaved = Some(change);
				report.unsaved = 1;
				break;
			}
		}

		self.transition(LoopState::Idle);
		if report.is_quiet() {
			debug!(target = "cmdq.scheduler", terminal = report.skipped_terminal, "no pending commands");
		} else {
			info!(
				target = "cmdq.scheduler",
				executed = report.executed,
				failed = report.failed,
				terminal = report.skipped_terminal,
				unsaved = report.unsaved,
				recovered = report.recovered,
				"cycle finished"
			);
		}
		report
	}

	/// Runs a store call on the blocking pool.
	async fn blocking<T, F>(&self, op: F) -> Result<T>
	where
		F: FnOnce(&S) -> Result<T> + Send + 'static,
		T: Send + 'static,
	{
		let store = Arc::clone(&self.store);
		tokio::task::spawn_blocking(move || op(&store)).await?
	}

	/// Writes `change` onto the stored queue with bounded retries and
	/// replaces `doc` with the queue as stored.
	///
	/// The change is dropped when the stored command no longer matches the
	/// one it was produced from.
	async fn persist(&mut self, doc: &mut QueueDocument, change: &Transition) -> WriteBack {
		let attempts = self.config.save_retries.saturating_add(1);
		for attempt in 1..=attempts {
			let pending = change.clone();
			let written = self
				.blocking(move |store| {
					let mut applied = false;
					let doc = store.update(&mut |on_disk| {
						applied = pending.apply_to(on_disk);
						applied
					})?;
					Ok((doc, applied))
				})
				.await;

			match written {
				Ok((stored, applied)) => {
					if stored.len() > doc.len() {
						debug!(target = "cmdq.scheduler", appended = stored.len() - doc.len(), "keeping commands appended during the pass");
					}
					*doc = stored;
					if applied {
						return WriteBack::Persisted;
					}
					warn!(
						target = "cmdq.scheduler",
						index = change.index,
						kind = %change.before.kind,
						"queue changed underneath the outcome, dropping it"
					);
					return WriteBack::Discarded;
				}
				Err(err) if attempt < attempts => {
					warn!(target = "cmdq.scheduler", attempt, error = %err, "queue save failed, retrying");
					tokio::time::sleep(self.config.retry_backoff.saturating_mul(attempt)).await;
				}
				Err(err) => {
					error!(target = "cmdq.scheduler", attempts, error = %err, "queue save failed, giving up");
				}
			}
		}
		WriteBack::Failed
	}
}

fn log_outcome(index: usize, kind: &str, outcome: &Outcome) {
	match outcome {
		Outcome::Executed(_) => info!(target = "cmdq.scheduler", index, kind, "command executed"),
		Outcome::Failed { kind: failure, reason } => warn!(
			target = "cmdq.scheduler",
			index,
			kind,
			failure = %failure,
			reason = %reason,
			"command failed"
		),
	}
}
