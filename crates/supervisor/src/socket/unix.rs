use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::{
	fcntl::{fcntl, FcntlArg, FdFlag},
	sys::socket::{
		bind, listen, setsockopt, socket, sockopt, AddressFamily, Backlog, SockFlag, SockType,
		SockaddrStorage,
	},
};
use tracing::trace;

use super::SocketSpec;
use crate::error::CriticalError;

/// One listen address and the two descriptors that serve it.
///
/// The bound listener stays private to the supervisor (close-on-exec set);
/// children inherit the duplicate, which has the flag cleared. The two are
/// independent descriptor-table entries backed by the same socket, so the
/// listener remains usable however a child treats its inherited copy.
#[derive(Debug)]
pub struct PreparedSocket {
	spec: SocketSpec,
	listener: OwnedFd,
	inheritable: OwnedFd,
}

impl PreparedSocket {
	pub(super) fn prepare(spec: SocketSpec) -> Result<Self, CriticalError> {
		let listener = create(spec).map_err(|err| CriticalError::Socket {
			spec,
			err: err.into(),
		})?;

		let inheritable = listener
			.try_clone()
			.map_err(|err| CriticalError::Prepare {
				about: "duplicating descriptor",
				err,
			})?;
		clear_cloexec(&inheritable).map_err(|err| CriticalError::Prepare {
			about: "clearing close-on-exec",
			err: err.into(),
		})?;

		trace!(
			addr=%spec.addr,
			listener=%listener.as_raw_fd(),
			inheritable=%inheritable.as_raw_fd(),
			"prepared listen socket",
		);

		Ok(Self {
			spec,
			listener,
			inheritable,
		})
	}

	/// The listen address this socket was bound from.
	pub fn spec(&self) -> SocketSpec {
		self.spec
	}

	/// The descriptor number children inherit.
	pub fn inherited_fd(&self) -> RawFd {
		self.inheritable.as_raw_fd()
	}
}

fn create(spec: SocketSpec) -> nix::Result<OwnedFd> {
	let addr = SockaddrStorage::from(spec.addr);
	let fam = if spec.addr.is_ipv4() {
		AddressFamily::Inet
	} else {
		AddressFamily::Inet6
	};

	let sock = socket(fam, SockType::Stream, SockFlag::SOCK_CLOEXEC, None)?;
	setsockopt(&sock, sockopt::ReuseAddr, &true)?;
	bind(sock.as_raw_fd(), &addr)?;
	listen(&sock, Backlog::MAXCONN)?;

	Ok(sock)
}

fn clear_cloexec(fd: &OwnedFd) -> nix::Result<()> {
	let flags = FdFlag::from_bits_retain(fcntl(fd, FcntlArg::F_GETFD)?);
	fcntl(fd, FcntlArg::F_SETFD(flags.difference(FdFlag::FD_CLOEXEC)))?;
	Ok(())
}
