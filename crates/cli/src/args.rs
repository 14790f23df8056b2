use std::{ffi::OsString, path::PathBuf};

use clap::{ArgAction, Parser};
use handover_supervisor::socket::SocketSpec;

use self::parser::SocketSpecValueParser;

mod parser;

const OPTSET_COMMAND: &str = "Command options";
const OPTSET_SOCKETS: &str = "Socket options";
const OPTSET_DEBUGGING: &str = "Debugging options";

/// Keep listening sockets open while the command that serves them is replaced.
#[derive(Debug, Clone, Parser)]
#[command(name = "handover", author, version, about, long_about = None)]
#[cfg_attr(debug_assertions, command(before_help = "⚠ DEBUG BUILD ⚠"))]
pub struct Args {
	/// Address to bind and hand to the command
	///
	/// The socket is bound once, at startup, and stays open for handover's
	/// whole lifetime; every generation of the command inherits it and is
	/// expected to accept on it rather than bind its own.
	///
	/// The value can be either of 'HOST:PORT' ('[bracketed]' for IPv6 hosts)
	/// or a bare 'PORT', which binds 127.0.0.1.
	///
	/// This option can be supplied multiple times, to bind multiple sockets.
	/// Their order defines the 'HANDOVER_FD<i>' numbering the command sees.
	#[arg(
		short = 'l',
		long,
		help_heading = OPTSET_SOCKETS,
		required = true,
		value_name = "ADDR",
		value_parser = SocketSpecValueParser,
	)]
	pub listen: Vec<SocketSpec>,

	/// Command to run and hand the sockets to
	///
	/// The first word is the program, everything after it is passed as
	/// arguments. The command is spawned directly, without a shell; its
	/// stdin, stdout, and stderr are handover's own.
	///
	/// Send SIGUSR2 to handover to replace the running command with a fresh
	/// invocation of the same command line (typically after deploying a new
	/// binary behind the same path).
	#[arg(
		help_heading = OPTSET_COMMAND,
		trailing_var_arg = true,
		num_args = 1..,
		required = true,
		value_name = "COMMAND",
	)]
	pub command: Vec<OsString>,

	/// Set diagnostic log level
	///
	/// This enables diagnostic logging, which is useful for investigating
	/// faulty reloads or signal delivery. Use multiple times to increase
	/// verbosity; goes up to '-vvvv'.
	#[arg(
		long,
		short,
		help_heading = OPTSET_DEBUGGING,
		action = ArgAction::Count,
	)]
	pub verbose: u8,

	/// Write diagnostic logs to a file
	///
	/// The log file is written in JSON format.
	#[arg(
		long,
		help_heading = OPTSET_DEBUGGING,
		value_name = "PATH",
	)]
	pub log_file: Option<PathBuf>,
}

pub fn get_args() -> Args {
	Args::parse()
}
