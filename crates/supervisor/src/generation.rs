//! Child process generations and the tasks that watch them.

use std::{ffi::OsString, fmt, process::ExitStatus};

use tokio::{
	process::{Child, Command as TokioCommand},
	select, spawn,
	sync::mpsc::{self, Sender},
};
use tracing::{debug, error, trace};

use crate::{error::CriticalError, socket::PreparedSockets};

/// The two generation identities.
///
/// The labels themselves are fixed for the supervisor's lifetime; only their
/// active/inactive roles swap on reload. Exactly one OS process is bound to
/// each non-empty slot at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
	/// The first slot, active at startup.
	A,
	/// The second slot, inactive at startup.
	B,
}

impl fmt::Display for Slot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::A => "a",
			Self::B => "b",
		})
	}
}

/// The command line to supervise: one program and its arguments.
///
/// The child's own behaviour is opaque to the supervisor; all that matters is
/// that it can build listeners from the inherited descriptor numbers and that
/// it eventually exits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
	/// Program to execute.
	pub prog: OsString,

	/// Arguments to the program.
	pub args: Vec<OsString>,
}

/// Final status of a generation's process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessEnd {
	/// The process ended successfully.
	Success,

	/// The process ended with a non-zero exit code.
	ExitError(i32),

	/// The process was terminated by a signal.
	ExitSignal(i32),

	/// The process ended in a way the OS did not report.
	Unknown,
}

impl From<ExitStatus> for ProcessEnd {
	fn from(status: ExitStatus) -> Self {
		if status.success() {
			return Self::Success;
		}

		if let Some(code) = status.code() {
			return Self::ExitError(code);
		}

		#[cfg(unix)]
		{
			use std::os::unix::process::ExitStatusExt;
			if let Some(sig) = status.signal() {
				return Self::ExitSignal(sig);
			}
		}

		Self::Unknown
	}
}

impl fmt::Display for ProcessEnd {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Success => f.write_str("success"),
			Self::ExitError(code) => write!(f, "exit code {code}"),
			Self::ExitSignal(sig) => write!(f, "signal {sig}"),
			Self::Unknown => f.write_str("unknown"),
		}
	}
}

/// Delivered to the event loop when a generation's process has ended.
///
/// Every exit produces a note, whatever the exit status; deciding whether the
/// exit was expected belongs to the event loop, not to the watcher task.
#[derive(Clone, Copy, Debug)]
pub struct ExitNote {
	/// Slot of the generation that ended.
	pub slot: Slot,

	/// How the process ended.
	pub status: ProcessEnd,
}

#[derive(Clone, Copy, Debug)]
enum Intervention {
	Stop,
}

/// One spawned instance of the supervised command, bound to a slot.
///
/// The child handle itself is owned by the generation's watcher task; the
/// event loop holds this value and reaches the process only through the
/// intervention channel.
#[derive(Debug)]
pub struct Generation {
	slot: Slot,
	pid: u32,
	intervene: Sender<Intervention>,
}

impl Generation {
	/// Spawns the command into `slot`, with the prepared descriptors
	/// inherited and their numbers exposed through the environment.
	///
	/// The child shares the supervisor's stdin, stdout, and stderr. On
	/// success a watcher task is started which pushes an [`ExitNote`] onto
	/// `exits` when the process ends.
	pub fn spawn(
		slot: Slot,
		command: &Command,
		sockets: &PreparedSockets,
		exits: Sender<ExitNote>,
	) -> Result<Self, CriticalError> {
		let mut cmd = TokioCommand::new(&command.prog);
		cmd.args(&command.args);
		for (name, value) in sockets.envs() {
			cmd.env(name, value);
		}

		debug!(%slot, ?command, fds=%sockets.len(), "spawning command");
		let mut child = cmd
			.spawn()
			.map_err(|err| CriticalError::Spawn { slot, err })?;
		let pid = child.id().ok_or(CriticalError::DeadOnArrival { slot })?;
		debug!(%slot, pid, "process spawned");

		let (int_s, mut int_r) = mpsc::channel(8);

		spawn(async move {
			trace!(%slot, pid, "starting task to watch on process");

			let status = loop {
				select! {
					end = child.wait() => match end {
						Ok(status) => break ProcessEnd::from(status),
						Err(err) => {
							error!(%err, "while waiting on process");
							break ProcessEnd::Unknown;
						}
					},
					Some(int) = int_r.recv() => match int {
						Intervention::Stop => deliver_stop(&mut child),
					},
				}
			};

			debug!(%slot, pid, %status, "process ended");
			exits.send(ExitNote { slot, status }).await.ok();
		});

		Ok(Self {
			slot,
			pid,
			intervene: int_s,
		})
	}

	/// The slot this generation is bound to.
	pub fn slot(&self) -> Slot {
		self.slot
	}

	/// The OS process id.
	pub fn id(&self) -> u32 {
		self.pid
	}

	/// Requests a graceful stop of this generation's process.
	///
	/// Advisory: the process is responsible for its own shutdown behaviour
	/// upon receiving the signal. Idempotent: stopping a process that has
	/// already ended, or is already stopping, has no effect.
	pub async fn stop(&self) {
		trace!(slot=%self.slot, "sending stop intervention");
		self.intervene.send(Intervention::Stop).await.ok();
	}
}

#[cfg(unix)]
fn deliver_stop(child: &mut Child) {
	use nix::{
		sys::signal::{kill, Signal},
		unistd::Pid,
	};

	if let Some(pid) = child.id() {
		trace!(pid, "delivering graceful stop");
		if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
			error!(%err, "while stopping process");
		}
	} else {
		trace!("process already gone, stop is a no-op");
	}
}

#[cfg(not(unix))]
fn deliver_stop(child: &mut Child) {
	if let Err(err) = child.start_kill() {
		error!(%err, "while stopping process");
	}
}
