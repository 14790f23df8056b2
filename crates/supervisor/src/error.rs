//! Error types.

use miette::Diagnostic;
use thiserror::Error;

use crate::{
	generation::{ProcessEnd, Slot},
	socket::SocketSpec,
};

/// Errors which are not recoverable and stop handover execution.
///
/// Every variant is fatal: the supervisor controls the service's only
/// listening sockets, so failure must be loud and immediate. Recoverable
/// conditions (a retiring generation ending, a reload request arriving while
/// another is in flight) are not errors and are handled inside the event
/// loop.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum CriticalError {
	/// A listen socket could not be created or bound.
	#[error("socket({spec}): {err}")]
	#[diagnostic(code(handover::socket))]
	Socket {
		/// The listen address concerned.
		spec: SocketSpec,

		/// The error which occurred.
		#[source]
		err: std::io::Error,
	},

	/// A bound descriptor could not be made inheritable.
	#[error("prepare({about}): {err}")]
	#[diagnostic(code(handover::prepare))]
	Prepare {
		/// What it was about.
		about: &'static str,

		/// The error which occurred.
		#[source]
		err: std::io::Error,
	},

	/// Socket passing is not available on this platform.
	#[error("socket passing is not supported on this platform")]
	#[diagnostic(code(handover::unsupported))]
	Unsupported,

	/// The supervised command could not be started.
	#[error("spawning command for generation {slot} failed: {err}")]
	#[diagnostic(code(handover::spawn))]
	Spawn {
		/// The slot the generation was being launched into.
		slot: Slot,

		/// The error which occurred.
		#[source]
		err: std::io::Error,
	},

	/// The supervised command started but was gone before it could be watched.
	#[error("process for generation {slot} dead on arrival")]
	#[diagnostic(code(handover::spawn))]
	DeadOnArrival {
		/// The slot the generation was being launched into.
		slot: Slot,
	},

	/// A critical I/O error occurred.
	#[error("io({about}): {err}")]
	#[diagnostic(code(handover::io))]
	IoError {
		/// What it was about.
		about: &'static str,

		/// The error which occurred.
		#[source]
		err: std::io::Error,
	},

	/// The active generation exited while the supervisor was not terminating.
	///
	/// The active generation's health is the supervisor's own health: there
	/// is no restart policy, only a loud exit.
	#[error("active generation {slot} exited unexpectedly ({status})")]
	#[diagnostic(code(handover::active_exit))]
	ActiveExit {
		/// The slot the generation was bound to.
		slot: Slot,

		/// How the process ended.
		status: ProcessEnd,
	},
}
