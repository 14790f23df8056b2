//! Listen socket preparation: bind once, duplicate, make inheritable.

use std::{fmt, net::SocketAddr};

pub use imp::PreparedSocket;

use crate::error::CriticalError;

#[cfg(unix)]
#[path = "socket/unix.rs"]
mod imp;
#[cfg(not(unix))]
#[path = "socket/fallback.rs"]
mod imp;


/// Prefix of the environment variables carrying inherited descriptor numbers.
///
/// Children receive one `HANDOVER_FD<i>` variable per listen address, indexed
/// by listen-flag order, and are expected to build their listeners from those
/// descriptor numbers rather than binding their own.
pub const ENV_PREFIX: &str = "HANDOVER_FD";

/// A single TCP listen address, ordered as configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketSpec {
	/// The address to listen on.
	pub addr: SocketAddr,
}

impl From<SocketAddr> for SocketSpec {
	fn from(addr: SocketAddr) -> Self {
		Self { addr }
	}
}

impl fmt::Display for SocketSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.addr.fmt(f)
	}
}

/// The ordered set of prepared listen sockets.
///
/// Created once at startup and reused by every generation launched
/// afterwards; the descriptors are never closed or re-bound while the
/// supervisor lives.
#[derive(Debug)]
pub struct PreparedSockets {
	sockets: Vec<PreparedSocket>,
}

impl PreparedSockets {
	/// Binds and prepares every listen address, in order.
	///
	/// Fails on the first address that cannot be bound or whose descriptor
	/// cannot be made inheritable; both abort startup before any child
	/// process exists.
	pub fn prepare(specs: &[SocketSpec]) -> Result<Self, CriticalError> {
		let sockets = specs
			.iter()
			.map(|spec| PreparedSocket::prepare(*spec))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self { sockets })
	}

	/// The prepared sockets, in listen-flag order.
	pub fn sockets(&self) -> &[PreparedSocket] {
		&self.sockets
	}

	/// Environment variables exposing the inherited descriptor numbers.
	///
	/// The index is the position of the listen flag on the command line; it
	/// stays stable across every generation.
	pub fn envs(&self) -> Vec<(String, String)> {
		self.sockets
			.iter()
			.enumerate()
			.map(|(i, sock)| (format!("{ENV_PREFIX}{i}"), sock.inherited_fd().to_string()))
			.collect()
	}

	/// Number of prepared sockets.
	pub fn len(&self) -> usize {
		self.sockets.len()
	}

	/// Whether there are no sockets at all.
	pub fn is_empty(&self) -> bool {
		self.sockets.is_empty()
	}
}
