//! The reload state machine and its event loop.

use std::{mem, time::Duration};

use tokio::{
	select, spawn,
	sync::mpsc::{self, Receiver, Sender},
	time::sleep,
};
use tracing::{debug, info, trace};

use crate::{
	error::CriticalError,
	generation::{Command, ExitNote, Generation, Slot},
	socket::PreparedSockets,
};

/// How long both generations overlap after a reload before the outgoing one
/// is told to stop.
///
/// The window lets the outgoing process finish in-flight work; it does not
/// wait for an actual drain. The stop is advisory and the outgoing process
/// owns its own shutdown behaviour.
pub const OVERLAP_WINDOW: Duration = Duration::from_secs(5);

/// Control messages accepted by the supervisor's event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
	/// Launch a replacement generation and retire the current one.
	Reload,

	/// Begin graceful shutdown of the supervisor.
	Terminate,

	/// Deliver a graceful stop to the active generation.
	Kill,

	/// The overlap window for the outgoing generation in `slot` has elapsed.
	Retire(Slot),
}

/// A clonable handle posting controls into a supervisor's event loop.
///
/// This is the only way anything outside the event loop influences the
/// supervisor; the OS signal worker uses exactly the same path as tests or
/// embedding code. Posting never mutates state directly, it only enqueues.
#[derive(Clone, Debug)]
pub struct Handle {
	controls: Sender<Control>,
}

impl Handle {
	/// Requests a reload: a new generation taking over the sockets.
	///
	/// Dropped with a note if a reload is already in flight or the
	/// supervisor is terminating.
	pub async fn reload(&self) {
		self.send(Control::Reload).await;
	}

	/// Begins graceful shutdown: the active generation is told to stop, and
	/// the supervisor exits cleanly once it has.
	pub async fn terminate(&self) {
		self.send(Control::Terminate).await;
	}

	/// Delivers a graceful stop to the active generation without beginning
	/// supervisor shutdown.
	pub async fn kill(&self) {
		self.send(Control::Kill).await;
	}

	async fn send(&self, control: Control) {
		trace!(?control, "posting control");
		self.controls.send(control).await.ok();
	}
}

/// Process-wide supervisor state, exclusively owned by the event loop.
#[derive(Debug)]
struct SupervisorState {
	active: Slot,
	inactive: Slot,
	current: Generation,
	outgoing: Option<Generation>,
	reloadable: bool,
	terminating: bool,
}

/// The supervisor: binds generations to sockets and runs the event loop.
///
/// All mutable state lives behind [`run`](Supervisor::run), which processes
/// events strictly one at a time; no two transitions ever run concurrently,
/// so none of the state needs locking.
#[derive(Debug)]
pub struct Supervisor {
	command: Command,
	sockets: PreparedSockets,
	controls: Receiver<Control>,
	control_s: Sender<Control>,
	exits: Receiver<ExitNote>,
	exit_s: Sender<ExitNote>,
}

impl Supervisor {
	/// Creates a supervisor over `command`, handing it `sockets`.
	///
	/// Nothing is spawned until [`run`](Supervisor::run).
	pub fn new(command: Command, sockets: PreparedSockets) -> Self {
		let (control_s, controls) = mpsc::channel(64);
		let (exit_s, exits) = mpsc::channel(8);

		Self {
			command,
			sockets,
			controls,
			control_s,
			exits,
			exit_s,
		}
	}

	/// A handle for posting controls into this supervisor's event loop.
	pub fn handle(&self) -> Handle {
		Handle {
			controls: self.control_s.clone(),
		}
	}

	/// Starts the first generation and runs the event loop to completion.
	///
	/// Returns `Ok(())` when the active generation exits during graceful
	/// shutdown, and a [`CriticalError`] for every fatal condition: a launch
	/// failure (including mid-reload, there is no rollback) or the active
	/// generation exiting while the supervisor was not terminating.
	pub async fn run(mut self) -> Result<(), CriticalError> {
		let mut state = self.start()?;

		loop {
			select! {
				Some(note) = self.exits.recv() => {
					if note.slot == state.active {
						if state.terminating {
							debug!(slot=%note.slot, status=%note.status, "active generation ended, shutdown complete");
							return Ok(());
						}

						return Err(CriticalError::ActiveExit {
							slot: note.slot,
							status: note.status,
						});
					}

					debug!(slot=%note.slot, status=%note.status, "outgoing generation ended");
					state.outgoing = None;
					state.reloadable = true;
				}

				Some(control) = self.controls.recv() => match control {
					Control::Reload => {
						if state.terminating {
							debug!("ignoring reload request during termination");
						} else if !state.reloadable {
							info!("another reload is already in progress");
						} else {
							self.reload(&mut state)?;
						}
					}
					Control::Terminate => {
						if !state.terminating {
							state.terminating = true;
							info!(slot=%state.active, "terminating, stopping active generation");
							state.current.stop().await;
						}
					}
					Control::Kill => {
						debug!(slot=%state.active, "stop requested for active generation");
						state.current.stop().await;
					}
					Control::Retire(slot) => {
						match &state.outgoing {
							Some(outgoing) if outgoing.slot() == slot => {
								debug!(%slot, "overlap over, stopping outgoing generation");
								outgoing.stop().await;
							}
							_ => trace!(%slot, "overlap over but generation already gone"),
						}
					}
				},

				else => return Ok(()),
			}
		}
	}

	fn start(&mut self) -> Result<SupervisorState, CriticalError> {
		let active = Slot::A;
		let current = Generation::spawn(active, &self.command, &self.sockets, self.exit_s.clone())?;
		info!(slot=%active, pid=current.id(), "started initial generation");

		Ok(SupervisorState {
			active,
			inactive: Slot::B,
			current,
			outgoing: None,
			reloadable: true,
			terminating: false,
		})
	}

	/// One reload, atomic from the event loop's perspective: launch into the
	/// inactive slot, swap roles, schedule the outgoing generation's stop.
	fn reload(&mut self, state: &mut SupervisorState) -> Result<(), CriticalError> {
		let next = Generation::spawn(
			state.inactive,
			&self.command,
			&self.sockets,
			self.exit_s.clone(),
		)?;
		info!(slot=%state.inactive, pid=next.id(), "reload: launched replacement generation");

		let outgoing = mem::replace(&mut state.current, next);
		state.reloadable = false;
		mem::swap(&mut state.active, &mut state.inactive);

		let retiring = outgoing.slot();
		state.outgoing = Some(outgoing);

		// The timer only posts back into the control queue; it never touches
		// state, and it is never cancelled once scheduled.
		let controls = self.control_s.clone();
		spawn(async move {
			sleep(OVERLAP_WINDOW).await;
			trace!(slot=%retiring, "overlap window elapsed");
			controls.send(Control::Retire(retiring)).await.ok();
		});

		Ok(())
	}
}
