//! Client for the Bus Pirate binary scripting mode.
//!
//! The adapter boots into an interactive terminal. Sending 0x00 repeatedly
//! drops it into raw bitbang mode (it answers "BBIO1"); from there 0x02
//! selects the binary I2C interface (it answers "I2C1"). Higher interface
//! modes never exit on their own: only the bitbang reset brings the adapter
//! back, which is also the recovery path when a previous session left it in
//! an unknown state.

mod i2c;
pub mod wire;

pub use self::i2c::{
	AckResult,
	Exchange,
	I2c,
	Peripherals,
	Speed,
};

use crate::transport::Transport;
use crate::{
	AResult,
	Error,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum DeviceMode {
	Unknown,
	Bitbang,
	I2c,
}

/// Owns the transport and tracks which mode the adapter is in. The mode only
/// ever advances through `reset_binary_mode` and `enter_i2c`; it never
/// regresses behind the host's back.
pub struct Controller<T: Transport> {
	transport: T,
	mode: DeviceMode,
}

impl<T: Transport> Controller<T> {
	pub fn new(transport: T) -> Controller<T> {
		Controller {
			transport,
			mode: DeviceMode::Unknown,
		}
	}

	pub fn mode(&self) -> DeviceMode {
		self.mode
	}

	/// Force the adapter into raw bitbang mode. Retried up to a fixed bound:
	/// an adapter still inside a half-finished command from an earlier session
	/// swallows the first few reset bytes before it resynchronizes.
	pub fn reset_binary_mode(&mut self) -> AResult<()> {
		for attempt in 0..wire::RESET_ATTEMPTS {
			self.transport.send(&[wire::RESET_BITBANG])?;
			if self.transport.expect(wire::BITBANG_HANDSHAKE, wire::RESET_TIMEOUT)? {
				debug!("bitbang mode after {} reset attempt(s)", attempt + 1);
				self.mode = DeviceMode::Bitbang;
				return Ok(());
			}
		}
		Err(Error::protocol(
			"reset_binary_mode",
			format!("no bitbang handshake after {} attempts", wire::RESET_ATTEMPTS),
		))
	}

	/// Switch to the binary I2C interface. One-shot: on timeout the mode is
	/// left unchanged and the caller decides whether to reset and retry.
	pub fn enter_i2c(&mut self) -> AResult<()> {
		if self.mode == DeviceMode::I2c {
			return Ok(());
		}
		self.transport.send(&[wire::i2c::ENTER])?;
		if self.transport.expect(wire::i2c::HANDSHAKE, wire::i2c::ENTER_TIMEOUT)? {
			self.mode = DeviceMode::I2c;
			return Ok(());
		}
		Err(Error::protocol("enter_i2c", "no I2C handshake"))
	}

	#[cfg(test)]
	pub(crate) fn transport(&self) -> &T {
		&self.transport
	}

	/// I2C primitive interface. Requesting it outside I2C mode is a contract
	/// violation of the caller, not a device failure.
	pub fn i2c(&mut self) -> I2c<T> {
		assert!(
			self.mode == DeviceMode::I2c,
			"I2C primitives require I2C mode"
		);
		I2c::new(&mut self.transport)
	}
}
