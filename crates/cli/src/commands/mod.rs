//! Subcommand implementations.

mod add;
mod list;
mod run;

use anyhow::Result;

use crate::cli::{Cli, Commands};
use crate::config::{Config, ConfigOverrides};

pub use add::parse_input;
pub use run::build_registry;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let mut config = Config::load(cli.config.as_deref())?;

	match cli.command {
		Commands::Run(args) => {
			config.apply(ConfigOverrides {
				queue_file: args.queue,
				poll_interval_ms: args.interval_ms,
			})?;
			run::execute(&config, args.once).await
		}
		Commands::List(args) => {
			config.apply(ConfigOverrides {
				queue_file: args.queue,
				..Default::default()
			})?;
			list::execute(&config, args.format)
		}
		Commands::Add(args) => {
			config.apply(ConfigOverrides {
				queue_file: args.queue,
				..Default::default()
			})?;
			add::execute(&config, &args.kind, args.input.as_deref())
		}
	}
}
