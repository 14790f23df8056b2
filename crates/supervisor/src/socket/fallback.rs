use super::SocketSpec;
use crate::error::CriticalError;

/// One listen address and the descriptors that serve it.
///
/// Descriptor inheritance is only implemented on unix; this stand-in keeps
/// the crate compiling elsewhere and fails at preparation time.
#[derive(Debug)]
pub struct PreparedSocket {
	spec: SocketSpec,
	fd: i32,
}

impl PreparedSocket {
	pub(super) fn prepare(_spec: SocketSpec) -> Result<Self, CriticalError> {
		Err(CriticalError::Unsupported)
	}

	/// The listen address this socket was bound from.
	pub fn spec(&self) -> SocketSpec {
		self.spec
	}

	/// The descriptor number children inherit.
	pub fn inherited_fd(&self) -> i32 {
		self.fd
	}
}
