#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

use std::io;

pub mod buspirate;
pub mod eeprom24xx;
pub mod transport;

#[derive(Debug, Fail)]
pub enum Error {
	/// invalid argument; rejected before any wire traffic
	#[fail(display = "configuration error: {}", _0)]
	Configuration(String),
	/// no or malformed response within the operation's timeout
	#[fail(display = "protocol error in {}: {}", operation, detail)]
	Protocol {
		operation: &'static str,
		detail: String,
	},
	/// target beyond the end of the device; nothing was sent
	#[fail(display = "position {} out of range (device limit {})", target, max)]
	Bounds { target: usize, max: usize },
	/// transport failure; fatal for the session
	#[fail(display = "transport error: {}", _0)]
	Io(#[fail(cause)] io::Error),
}

impl Error {
	pub fn configuration<S: Into<String>>(detail: S) -> Error {
		Error::Configuration(detail.into())
	}

	pub fn protocol<S: Into<String>>(operation: &'static str, detail: S) -> Error {
		Error::Protocol {
			operation,
			detail: detail.into(),
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Io(e)
	}
}

impl From<serial::Error> for Error {
	fn from(e: serial::Error) -> Error {
		Error::Io(e.into())
	}
}

pub type AResult<T> = Result<T, Error>;
