//! Integration tests for the `cmdq` binary.
//!
//! Each test works in its own temporary directory with an explicit config
//! file, so nothing outside the directory is read or written.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Value, json};
use tempfile::TempDir;

struct Workspace {
	dir: TempDir,
}

impl Workspace {
	fn new(config: Value) -> Self {
		let dir = TempDir::new().unwrap();
		std::fs::write(dir.path().join("config.json"), config.to_string()).unwrap();
		Self { dir }
	}

	fn path(&self) -> &Path {
		self.dir.path()
	}

	fn queue(&self) -> PathBuf {
		self.path().join("data").join("commands.json")
	}

	fn cmdq(&self, args: &[&str]) -> (bool, String, String) {
		let output = Command::new(env!("CARGO_BIN_EXE_cmdq"))
			.current_dir(self.path())
			.arg("--config")
			.arg(self.path().join("config.json"))
			.args(args)
			.env_remove("RUST_LOG")
			.output()
			.expect("failed to execute cmdq");
		let stdout = String::from_utf8_lossy(&output.stdout).to_string();
		let stderr = String::from_utf8_lossy(&output.stderr).to_string();
		(output.status.success(), stdout, stderr)
	}

	fn spawn(&self, args: &[&str]) -> std::process::Child {
		Command::new(env!("CARGO_BIN_EXE_cmdq"))
			.current_dir(self.path())
			.arg("--config")
			.arg(self.path().join("config.json"))
			.args(args)
			.env_remove("RUST_LOG")
			.stdout(std::process::Stdio::null())
			.stderr(std::process::Stdio::null())
			.spawn()
			.expect("failed to spawn cmdq")
	}

	fn queue_json(&self) -> Value {
		serde_json::from_slice(&std::fs::read(self.queue()).unwrap()).unwrap()
	}
}

#[test]
fn add_then_list_json() {
	let ws = Workspace::new(json!({}));

	let (ok, stdout, stderr) = ws.cmdq(&["add", "x_post", "--input", r#"{"content":"hello"}"#]);
	assert!(ok, "add failed: {stderr}");
	assert!(stdout.contains("#0"), "{stdout}");

	let (ok, stdout, stderr) = ws.cmdq(&["list", "--format", "json"]);
	assert!(ok, "list failed: {stderr}");
	let doc: Value = serde_json::from_str(&stdout).unwrap();
	assert_eq!(doc, json!({ "commands": [{ "type": "x_post", "content": "hello" }] }));
}

#[test]
fn add_rejects_non_object_input() {
	let ws = Workspace::new(json!({}));

	let (ok, _stdout, stderr) = ws.cmdq(&["add", "x_post", "--input", "42"]);
	assert!(!ok);
	assert!(stderr.contains("JSON object"), "{stderr}");
	assert!(!ws.queue().exists());
}

#[test]
fn list_of_missing_queue_is_empty() {
	let ws = Workspace::new(json!({}));

	let (ok, stdout, stderr) = ws.cmdq(&["list"]);
	assert!(ok, "list failed: {stderr}");
	assert!(stdout.contains("queue is empty"));
}

#[test]
fn malformed_config_exits_with_error() {
	let ws = Workspace::new(json!({ "pollIntervalMs": "soon" }));

	let (ok, _stdout, stderr) = ws.cmdq(&["list"]);
	assert!(!ok);
	assert!(stderr.contains("invalid config"), "{stderr}");
}

#[test]
fn run_once_without_handlers_fails_commands_as_unknown() {
	let ws = Workspace::new(json!({}));
	ws.cmdq(&["add", "x_follow", "--input", r#"{"username":"x"}"#]);

	let (ok, stdout, stderr) = ws.cmdq(&["run", "--once"]);
	assert!(ok, "run failed: {stderr}");
	assert!(stdout.contains("1 failed"), "{stdout}");

	let cmd = &ws.queue_json()["commands"][0];
	assert_eq!(cmd["status"], "failed");
	assert_eq!(cmd["error"], "unknown command type: x_follow");
	assert!(ws.path().join("screenshots").is_dir());
}

#[test]
fn run_once_with_malformed_queue_leaves_it_untouched() {
	let ws = Workspace::new(json!({}));
	std::fs::create_dir_all(ws.queue().parent().unwrap()).unwrap();
	std::fs::write(ws.queue(), "{ not json").unwrap();

	let (ok, _stdout, stderr) = ws.cmdq(&["run", "--once"]);
	assert!(!ok);
	assert!(stderr.contains("could not be loaded"), "{stderr}");
	assert_eq!(std::fs::read_to_string(ws.queue()).unwrap(), "{ not json");
}

#[cfg(unix)]
#[test]
fn run_once_executes_process_handlers() {
	let ws = Workspace::new(json!({
		"handlers": {
			"x_post": {
				"program": "sh",
				"args": ["-c", "cat >/dev/null; echo '{\"success\": true, \"posted\": true}'"]
			},
			"x_follow": {
				"program": "sh",
				"args": ["-c", "echo '{\"success\": false, \"error\": \"Already following or button not found\"}'"]
			},
			"screenshot": {
				"program": "sh",
				"args": ["-c", "echo 'TimeoutError: page.goto: Timeout 30000ms exceeded' >&2; exit 1"]
			}
		}
	}));
	ws.cmdq(&["add", "x_post", "--input", r#"{"content":"hi"}"#]);
	ws.cmdq(&["add", "x_follow", "--input", r#"{"username":"x"}"#]);
	ws.cmdq(&["add", "screenshot", "--input", r#"{"url":"https://example.com","filename":"a.png"}"#]);

	let (ok, stdout, stderr) = ws.cmdq(&["run", "--once"]);
	assert!(ok, "run failed: {stderr}");
	assert!(stdout.contains("1 executed"), "{stdout}");

	let doc = ws.queue_json();
	let post = &doc["commands"][0];
	assert_eq!(post["status"], "executed");
	assert_eq!(post["result"], json!({ "success": true, "posted": true }));
	assert!(post["executedAt"].is_string());

	let follow = &doc["commands"][1];
	assert_eq!(follow["status"], "failed");
	assert_eq!(follow["error"], "Already following or button not found");

	let shot = &doc["commands"][2];
	assert_eq!(shot["status"], "failed");
	assert!(shot["error"].as_str().unwrap().contains("Timeout 30000ms exceeded"));
	assert!(shot.get("result").is_none());

	let (ok, stdout, _stderr) = ws.cmdq(&["run", "--once"]);
	assert!(ok);
	assert!(stdout.contains("3 already done"), "{stdout}");
}

#[cfg(unix)]
#[test]
fn run_stops_on_sigterm() {
	use std::time::{Duration, Instant};

	let ws = Workspace::new(json!({ "pollIntervalMs": 100 }));
	let mut child = ws.spawn(&["run"]);

	// Wait for the loop to create the data directory before signalling.
	let deadline = Instant::now() + Duration::from_secs(10);
	while !ws.path().join("data").is_dir() && Instant::now() < deadline {
		std::thread::sleep(Duration::from_millis(20));
	}
	std::thread::sleep(Duration::from_millis(300));

	Command::new("kill").arg("-TERM").arg(child.id().to_string()).status().unwrap();

	let deadline = Instant::now() + Duration::from_secs(10);
	loop {
		if let Some(status) = child.try_wait().unwrap() {
			assert!(status.success(), "exited with {status}");
			break;
		}
		assert!(Instant::now() < deadline, "cmdq did not stop after SIGTERM");
		std::thread::sleep(Duration::from_millis(20));
	}
}

#[cfg(target_os = "linux")]
fn wait_for_pid(path: &Path) -> u32 {
	use std::time::{Duration, Instant};

	let deadline = Instant::now() + Duration::from_secs(10);
	loop {
		if let Some(pid) = std::fs::read_to_string(path).ok().and_then(|s| s.trim().parse().ok()) {
			return pid;
		}
		assert!(Instant::now() < deadline, "{} was never written", path.display());
		std::thread::sleep(Duration::from_millis(20));
	}
}

#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
	match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
		Ok(stat) => stat
			.rsplit_once(')')
			.is_some_and(|(_, rest)| !rest.trim_start().starts_with(['Z', 'X'])),
		Err(_) => false,
	}
}

#[cfg(target_os = "linux")]
#[test]
fn second_sigterm_exits_and_kills_browser_and_handler() {
	use std::time::{Duration, Instant};

	let ws = Workspace::new(json!({
		"pollIntervalMs": 100,
		"session": {
			"mode": "launch",
			"command": "sh",
			"args": ["-c", "echo $$ > browser.pid; echo 'DevTools listening on ws://127.0.0.1:9/devtools/browser/t' >&2; exec sleep 60"]
		},
		"handlers": {
			"x_post": { "program": "sh", "args": ["-c", "echo $$ > handler.pid; exec sleep 60"] }
		}
	}));
	ws.cmdq(&["add", "x_post", "--input", r#"{"content":"hi"}"#]);
	let mut child = ws.spawn(&["run"]);

	let handler = wait_for_pid(&ws.path().join("handler.pid"));
	let browser = wait_for_pid(&ws.path().join("browser.pid"));
	assert!(is_running(browser));

	let term = || {
		Command::new("kill").arg("-TERM").arg(child.id().to_string()).status().unwrap();
	};
	term();
	std::thread::sleep(Duration::from_millis(300));
	term();

	let deadline = Instant::now() + Duration::from_secs(10);
	let status = loop {
		if let Some(status) = child.try_wait().unwrap() {
			break status;
		}
		assert!(Instant::now() < deadline, "cmdq did not exit after the second SIGTERM");
		std::thread::sleep(Duration::from_millis(20));
	};
	assert_eq!(status.code(), Some(130));

	let deadline = Instant::now() + Duration::from_secs(10);
	while (is_running(browser) || is_running(handler)) && Instant::now() < deadline {
		std::thread::sleep(Duration::from_millis(20));
	}
	assert!(!is_running(browser), "browser {browser} outlived cmdq");
	assert!(!is_running(handler), "handler {handler} outlived cmdq");
	assert!(ws.queue_json()["commands"][0].get("status").is_none());
}
