//! Durable storage of the command queue.
//!
//! [`JsonFileStore`] keeps the queue as one pretty-printed JSON document.
//! Saves go through a temporary file in the target directory that is synced
//! and renamed over the document, so readers only ever see a complete file.
//! Read-modify-write cycles ([`CommandStore::update`]) additionally hold an
//! exclusive advisory lock on a sidecar `<queue>.lock` file, so a producer
//! appending and the engine recording an outcome never overwrite each other.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use cmdq_protocol::{Command, QueueDocument};
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

/// Load/save contract used by the scheduler.
pub trait CommandStore: Send + Sync {
	/// Reads the queue. A missing document is an empty queue.
	fn load(&self) -> Result<QueueDocument>;

	/// Replaces the persisted queue with `doc`.
	fn save(&self, doc: &QueueDocument) -> Result<()>;

	/// Loads the queue, lets `modify` change it and saves it when `modify`
	/// returns `true`. Returns the document as it now stands.
	///
	/// Implementations shared between processes must make the whole cycle
	/// exclusive against other `update` calls.
	fn update(&self, modify: &mut dyn FnMut(&mut QueueDocument) -> bool) -> Result<QueueDocument> {
		let mut doc = self.load()?;
		if modify(&mut doc) {
			self.save(&doc)?;
		}
		Ok(doc)
	}

	/// Appends a pending command to the persisted queue.
	fn append(&self, command: Command) -> Result<usize> {
		let mut command = Some(command);
		let doc = self.update(&mut |doc| match command.take() {
			Some(command) => {
				doc.commands.push(command);
				true
			}
			None => false,
		})?;
		Ok(doc.len() - 1)
	}
}

/// Queue stored as a JSON file (`{"commands": [...]}`).
#[derive(Debug, Clone)]
pub struct JsonFileStore {
	path: PathBuf,
}

impl JsonFileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Sidecar file locked around read-modify-write cycles.
	pub fn lock_path(&self) -> PathBuf {
		let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "queue".into());
		name.push(".lock");
		self.dir().join(name)
	}

	fn dir(&self) -> PathBuf {
		match self.path.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
			_ => PathBuf::from("."),
		}
	}

	/// Blocks until the exclusive lock is held. Dropping the file releases it.
	fn lock(&self) -> Result<File> {
		let lock_path = self.lock_path();
		fs::create_dir_all(self.dir()).map_err(|e| self.persistence_error(e))?;
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(&lock_path)
			.map_err(|e| self.persistence_error(e))?;
		file.lock_exclusive().map_err(|source| Error::Lock { path: lock_path, source })?;
		Ok(file)
	}

	fn persistence_error(&self, source: std::io::Error) -> Error {
		Error::Persistence {
			path: self.path.clone(),
			source,
		}
	}
}

impl CommandStore for JsonFileStore {
	fn load(&self) -> Result<QueueDocument> {
		let bytes = match fs::read(&self.path) {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				debug!(target = "cmdq.store", path = %self.path.display(), "queue file missing, treating as empty");
				return Ok(QueueDocument::default());
			}
			Err(source) => {
				return Err(Error::Unreadable {
					path: self.path.clone(),
					source,
				});
			}
		};

		serde_json::from_slice(&bytes).map_err(|source| Error::MalformedQueue {
			path: self.path.clone(),
			source,
		})
	}

	fn save(&self, doc: &QueueDocument) -> Result<()> {
		let content = serde_json::to_vec_pretty(doc).map_err(Error::Serialize)?;

		let dir = self.dir();
		fs::create_dir_all(&dir).map_err(|e| self.persistence_error(e))?;

		// Same directory as the target so the final rename never crosses filesystems.
		let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.persistence_error(e))?;
		tmp.write_all(&content).map_err(|e| self.persistence_error(e))?;
		tmp.as_file().sync_all().map_err(|e| self.persistence_error(e))?;
		tmp.persist(&self.path).map_err(|e| self.persistence_error(e.error))?;

		debug!(target = "cmdq.store", path = %self.path.display(), commands = doc.len(), "queue saved");
		Ok(())
	}

	fn update(&self, modify: &mut dyn FnMut(&mut QueueDocument) -> bool) -> Result<QueueDocument> {
		let lock = self.lock()?;
		let mut doc = self.load()?;
		if modify(&mut doc) {
			self.save(&doc)?;
		}
		drop(lock);
		Ok(doc)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicBool, Ordering};

	use chrono::Utc;
	use cmdq_protocol::{CommandStatus, Payload};
	use serde_json::json;
	use tempfile::TempDir;

	use super::*;

	fn store_in(tmp: &TempDir) -> JsonFileStore {
		JsonFileStore::new(tmp.path().join("data").join("commands.json"))
	}

	#[test]
	fn missing_file_loads_empty_queue() {
		let tmp = TempDir::new().unwrap();
		let doc = store_in(&tmp).load().unwrap();
		assert!(doc.is_empty());
	}

	#[test]
	fn save_creates_parent_and_round_trips() {
		let tmp = TempDir::new().unwrap();
		let store = store_in(&tmp);

		let mut cmd = Command::new("x_post", json!({ "content": "hi" }).as_object().unwrap().clone());
		cmd.mark_executed(json!({ "success": true }), Utc::now());
		let doc = QueueDocument::new(vec![cmd, Command::new("x_follow", Payload::new())]);

		store.save(&doc).unwrap();
		let loaded = store.load().unwrap();

		assert_eq!(loaded.len(), 2);
		assert_eq!(loaded.commands[0].state(), CommandStatus::Executed);
		assert_eq!(loaded.commands[1].state(), CommandStatus::Pending);
	}

	#[test]
	fn save_writes_two_space_indented_json() {
		let tmp = TempDir::new().unwrap();
		let store = store_in(&tmp);
		store.save(&QueueDocument::new(vec![Command::new("screenshot", Payload::new())])).unwrap();

		let content = fs::read_to_string(store.path()).unwrap();
		assert!(content.starts_with("{\n  \"commands\": ["), "unexpected layout: {content}");
	}

	#[test]
	fn malformed_file_fails_and_is_left_untouched() {
		let tmp = TempDir::new().unwrap();
		let store = store_in(&tmp);
		fs::create_dir_all(store.path().parent().unwrap()).unwrap();
		let garbage = b"{\"commands\": [ {\"type\": \"x_post\", ";
		fs::write(store.path(), garbage).unwrap();

		let err = store.load().unwrap_err();
		assert!(matches!(err, Error::MalformedQueue { .. }), "unexpected error: {err}");
		assert!(err.is_load_failure());
		assert_eq!(fs::read(store.path()).unwrap(), garbage);
	}

	#[test]
	fn ill_typed_commands_field_is_malformed() {
		let tmp = TempDir::new().unwrap();
		let store = store_in(&tmp);
		fs::create_dir_all(store.path().parent().unwrap()).unwrap();
		fs::write(store.path(), r#"{"commands": "x_post"}"#).unwrap();

		assert!(matches!(store.load(), Err(Error::MalformedQueue { .. })));
	}

	#[test]
	fn append_adds_pending_command_at_end() {
		let tmp = TempDir::new().unwrap();
		let store = store_in(&tmp);

		assert_eq!(store.append(Command::new("x_login", Payload::new())).unwrap(), 0);
		assert_eq!(store.append(Command::new("x_post", Payload::new())).unwrap(), 1);

		let doc = store.load().unwrap();
		let kinds: Vec<_> = doc.commands.iter().map(|c| c.kind.as_str()).collect();
		assert_eq!(kinds, vec!["x_login", "x_post"]);
		assert_eq!(doc.pending_indices(), vec![0, 1]);
	}

	#[test]
	fn append_waits_for_a_held_update() {
		let tmp = TempDir::new().unwrap();
		let store = store_in(&tmp);
		store.append(Command::new("x_login", Payload::new())).unwrap();

		let (locked_tx, locked_rx) = std::sync::mpsc::channel();
		let holder = {
			let store = store.clone();
			std::thread::spawn(move || {
				store
					.update(&mut |doc| {
						locked_tx.send(()).unwrap();
						std::thread::sleep(std::time::Duration::from_millis(200));
						doc.commands[0].mark_executed(json!({}), Utc::now());
						true
					})
					.unwrap();
			})
		};
		locked_rx.recv().unwrap();

		assert_eq!(store.append(Command::new("x_post", Payload::new())).unwrap(), 1);
		holder.join().unwrap();

		let doc = store.load().unwrap();
		assert_eq!(doc.commands[0].state(), CommandStatus::Executed);
		assert_eq!(doc.commands[1].state(), CommandStatus::Pending);
		assert!(store.lock_path().ends_with("commands.json.lock"));
	}

	#[test]
	fn update_without_change_does_not_write() {
		let tmp = TempDir::new().unwrap();
		let store = store_in(&tmp);

		let doc = store.update(&mut |_| false).unwrap();

		assert!(doc.is_empty());
		assert!(!store.path().exists());
	}

	#[test]
	fn save_leaves_no_temporary_files_behind() {
		let tmp = TempDir::new().unwrap();
		let store = store_in(&tmp);
		for _ in 0..5 {
			store.save(&QueueDocument::new(vec![Command::new("x_post", Payload::new())])).unwrap();
		}

		let entries: Vec<_> = fs::read_dir(store.path().parent().unwrap()).unwrap().collect();
		assert_eq!(entries.len(), 1);
	}

	#[test]
	fn concurrent_readers_never_see_partial_documents() {
		let tmp = TempDir::new().unwrap();
		let store = store_in(&tmp);

		let small = QueueDocument::new(vec![Command::new("x_post", Payload::new())]);
		let big_payload = json!({ "content": "x".repeat(64 * 1024) }).as_object().unwrap().clone();
		let big = QueueDocument::new((0..16).map(|_| Command::new("x_post", big_payload.clone())).collect());
		store.save(&small).unwrap();

		let done = Arc::new(AtomicBool::new(false));
		let reader = {
			let done = Arc::clone(&done);
			let reader_store = store.clone();
			std::thread::spawn(move || {
				let mut reads = 0usize;
				loop {
					let doc = reader_store.load().expect("reader observed a partial document");
					assert!(doc.len() == 1 || doc.len() == 16, "unexpected length {}", doc.len());
					reads += 1;
					if done.load(Ordering::Relaxed) {
						return reads;
					}
				}
			})
		};

		for i in 0..100 {
			store.save(if i % 2 == 0 { &big } else { &small }).unwrap();
		}
		done.store(true, Ordering::Relaxed);

		let reads = reader.join().unwrap();
		assert!(reads > 0);
	}
}
