//! Runtime pieces that connect the cmdq engine to the outside world.
//!
//! - **Sessions**: [`AttachSession`] reuses a running browser through its
//!   DevTools endpoint, [`LaunchSession`] starts one and discovers the
//!   endpoint from its stderr.
//! - **Handlers**: [`ProcessHandler`] runs an external program per command,
//!   feeding it the payload on stdin and reading a JSON answer from stdout.

pub mod error;
pub mod process;
pub mod session;

pub use error::{Error, Result};
pub use process::ProcessHandler;
pub use session::{AttachSession, LaunchSession, parse_devtools_line};
