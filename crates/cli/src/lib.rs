#![deny(rust_2018_idioms)]
#![allow(clippy::missing_const_for_fn, clippy::future_not_send)]

use std::{env::var, fs::File, sync::Mutex};

use handover_supervisor::{
	generation::Command,
	signal,
	socket::PreparedSockets,
	supervisor::Supervisor,
};
use miette::{bail, IntoDiagnostic, Result};
use tracing::{debug, info, warn};

use crate::args::Args;

pub mod args;

async fn init() -> Result<Args> {
	let mut log_on = false;

	if var("RUST_LOG").is_ok() {
		match tracing_subscriber::fmt::try_init() {
			Ok(()) => {
				warn!(RUST_LOG=%var("RUST_LOG").unwrap(), "logging configured from RUST_LOG");
				log_on = true;
			}
			Err(e) => eprintln!("Failed to initialise logging with RUST_LOG, falling back\n{e}"),
		}
	}

	let args = args::get_args();
	let verbosity = args.verbose;

	if log_on {
		warn!("ignoring logging options from args");
	} else if verbosity > 0 {
		let log_file = if let Some(file) = &args.log_file {
			Some(File::create(file).into_diagnostic()?)
		} else {
			None
		};

		let mut builder = tracing_subscriber::fmt().with_env_filter(match verbosity {
			0 => unreachable!("checked by if earlier"),
			1 => "warn",
			2 => "info",
			3 => "debug",
			_ => "trace",
		});

		if verbosity > 2 {
			use tracing_subscriber::fmt::format::FmtSpan;
			builder = builder.with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);
		}

		match if let Some(writer) = log_file {
			builder.json().with_writer(Mutex::new(writer)).try_init()
		} else if verbosity > 3 {
			builder.pretty().try_init()
		} else {
			builder.try_init()
		} {
			Ok(()) => info!("logging initialised"),
			Err(e) => eprintln!("Failed to initialise logging, continuing with none\n{e}"),
		}
	}

	Ok(args)
}

/// Parses the command line, prepares the sockets, and supervises.
///
/// Returns only once the supervisor has finished: `Ok` after a graceful
/// shutdown, `Err` (rendered by miette, exiting non-zero) on any fatal
/// condition.
pub async fn run() -> Result<()> {
	let args = init().await?;
	debug!(version=%env!("CARGO_PKG_VERSION"), ?args, "constructing supervisor from CLI");

	let sockets = PreparedSockets::prepare(&args.listen)?;
	info!(count=%sockets.len(), "prepared listen sockets");

	let mut words = args.command.into_iter();
	let Some(prog) = words.next() else {
		bail!("missing command");
	};
	let command = Command {
		prog,
		args: words.collect(),
	};

	let supervisor = Supervisor::new(command, sockets);
	let _signals = signal::worker(supervisor.handle())?;

	info!("running supervisor loop");
	supervisor.run().await?;

	Ok(())
}
