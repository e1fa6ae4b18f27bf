
use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Root CLI for cmdq.
#[derive(Parser, Debug)]
#[command(name = "cmdq")]
#[command(about = "Run a persisted queue of browser automation commands")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Configuration file (default: $XDG_CONFIG_HOME/cmdq/config.json)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Poll the queue and execute pending commands until interrupted.
	Run(RunArgs),
	/// Show the commands in the queue.
	List(ListArgs),
	/// Append a pending command to the queue.
	Add(AddArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
	/// Process the pending commands once and exit.
	#[arg(long)]
	pub once: bool,

	/// Queue file to operate on.
	#[arg(long, value_name = "FILE")]
	pub queue: Option<PathBuf>,

	/// Delay between polling cycles in milliseconds.
	#[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
	pub interval_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
	/// Queue file to operate on.
	#[arg(long, value_name = "FILE")]
	pub queue: Option<PathBuf>,

	/// Output format.
	#[arg(short, long, value_enum, default_value = "text")]
	pub format: ListFormat,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
	/// Command type, for example x_post or screenshot.
	#[arg(value_name = "TYPE")]
	pub kind: String,

	/// JSON object with the command fields.
	#[arg(long, value_name = "JSON")]
	pub input: Option<String>,

	/// Queue file to operate on.
	#[arg(long, value_name = "FILE")]
	pub queue: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
	#[default]
	Text,
	Json,
}

/// Help colors in cargo's style.
fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}
