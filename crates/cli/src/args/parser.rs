use std::{
	ffi::OsStr,
	net::{IpAddr, Ipv4Addr, SocketAddr},
	num::{IntErrorKind, NonZero},
	str::FromStr,
};

use clap::{
	builder::TypedValueParser,
	error::{Error, ErrorKind},
};
use handover_supervisor::socket::SocketSpec;

#[cfg(test)]
#[path = "parser_test.rs"]
mod test;

#[derive(Clone)]
pub(crate) struct SocketSpecValueParser;

impl TypedValueParser for SocketSpecValueParser {
	type Value = SocketSpec;

	fn parse_ref(
		&self,
		_cmd: &clap::Command,
		_arg: Option<&clap::Arg>,
		value: &OsStr,
	) -> Result<Self::Value, Error> {
		let value = value
			.to_str()
			.ok_or_else(|| Error::raw(ErrorKind::ValueValidation, "invalid UTF-8"))?;

		let addr = if let Ok(addr) = SocketAddr::from_str(value) {
			addr
		} else {
			match NonZero::<u16>::from_str(value) {
				Ok(port) => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port.get()),
				Err(err) if *err.kind() == IntErrorKind::Zero => {
					return Err(Error::raw(
						ErrorKind::ValueValidation,
						"invalid port number: cannot be zero",
					))
				}
				Err(err) if *err.kind() == IntErrorKind::PosOverflow => {
					return Err(Error::raw(
						ErrorKind::ValueValidation,
						"invalid port number: greater than 65535",
					))
				}
				Err(_) => {
					return Err(Error::raw(
						ErrorKind::ValueValidation,
						"invalid listen address",
					))
				}
			}
		};

		Ok(SocketSpec { addr })
	}
}
