//! Event source for signals sent to the supervisor process.
//!
//! SIGUSR2 requests a reload; SIGTERM and SIGINT begin graceful shutdown.
//! Once a termination signal has been delivered the worker returns, so
//! further reload or termination signals are no longer consumed: supervisor
//! shutdown is itself a handoff, not something to re-trigger.

use tokio::task::JoinHandle;
use tracing::debug;

use crate::{error::CriticalError, supervisor::Handle};

/// Installs the OS signal listeners and spawns the signal worker.
///
/// Listeners are installed synchronously, so a failure aborts startup before
/// any child process exists. Must be called from within a Tokio runtime.
pub fn worker(handle: Handle) -> Result<JoinHandle<()>, CriticalError> {
	imp_worker(handle)
}

#[cfg(unix)]
fn imp_worker(handle: Handle) -> Result<JoinHandle<()>, CriticalError> {
	use tokio::signal::unix::{signal, SignalKind};

	debug!("launching unix signal worker");

	macro_rules! listen {
		($sig:ident) => {{
			signal(SignalKind::$sig()).map_err(|err| CriticalError::IoError {
				about: concat!("setting ", stringify!($sig), " signal listener"),
				err,
			})?
		}};
	}

	let mut s_interrupt = listen!(interrupt);
	let mut s_terminate = listen!(terminate);
	let mut s_user2 = listen!(user_defined2);

	Ok(tokio::spawn(async move {
		loop {
			tokio::select! {
				_ = s_interrupt.recv() => {
					debug!("received SIGINT, terminating");
					handle.terminate().await;
					break;
				}
				_ = s_terminate.recv() => {
					debug!("received SIGTERM, terminating");
					handle.terminate().await;
					break;
				}
				_ = s_user2.recv() => {
					debug!("received SIGUSR2, requesting reload");
					handle.reload().await;
				}
			}
		}
	}))
}

#[cfg(not(unix))]
fn imp_worker(handle: Handle) -> Result<JoinHandle<()>, CriticalError> {
	debug!("launching ctrl-c signal worker");

	Ok(tokio::spawn(async move {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(%err, "while waiting for ctrl-c");
			return;
		}

		debug!("received ctrl-c, terminating");
		handle.terminate().await;
	}))
}
