use std::ffi::OsStr;
use std::io::{
	self,
	Read,
	Write,
};
use std::time::{
	Duration,
	Instant,
};

use serial::SerialPort;

use crate::AResult;

/// Byte channel to the adapter.
///
/// The adapter protocol is half-duplex with at most one outstanding request,
/// so every receive is bounded by a deadline. Running into the deadline is a
/// soft outcome (`Ok(false)`), distinct from a hard transport failure: the
/// protocol layers decide whether silence is an error or an expected answer
/// (write-cycle polling).
pub trait Transport {
	fn send(&mut self, data: &[u8]) -> AResult<()>;

	/// Fill `buf` completely. `Ok(false)` if the deadline elapsed first; `buf`
	/// may then be partially filled.
	fn recv_exact(&mut self, buf: &mut [u8], timeout: Duration) -> AResult<bool>;

	/// Consume incoming bytes until they end with `pattern`. `Ok(false)` if the
	/// deadline elapsed before a match.
	fn expect(&mut self, pattern: &[u8], timeout: Duration) -> AResult<bool>;
}

const PORT_SETTINGS: serial::PortSettings = serial::PortSettings {
	baud_rate: serial::Baud115200,
	char_size: serial::Bits8,
	parity: serial::ParityNone,
	stop_bits: serial::Stop1,
	flow_control: serial::FlowNone,
};

pub struct SerialTransport<P: SerialPort> {
	port: P,
}

/// `SerialTransport` over the platform serial port type.
pub type SystemTransport = SerialTransport<serial::SystemPort>;

impl SerialTransport<serial::SystemPort> {
	/// Open and configure the port (115200 8N1, no flow control).
	pub fn open<P: AsRef<OsStr> + ?Sized>(port: &P) -> AResult<SystemTransport> {
		let mut port = serial::open(port)?;
		port.configure(&PORT_SETTINGS)?;
		Ok(SerialTransport { port })
	}
}

impl<P: SerialPort> SerialTransport<P> {
	pub fn new(port: P) -> SerialTransport<P> {
		SerialTransport { port }
	}
}

impl<P: SerialPort> Transport for SerialTransport<P> {
	fn send(&mut self, data: &[u8]) -> AResult<()> {
		self.port.write_all(data)?;
		self.port.flush()?;
		Ok(())
	}

	fn recv_exact(&mut self, buf: &mut [u8], timeout: Duration) -> AResult<bool> {
		let deadline = Instant::now() + timeout;
		let mut filled = 0;
		while filled < buf.len() {
			let now = Instant::now();
			if now >= deadline {
				return Ok(false);
			}
			self.port.set_timeout(deadline - now)?;
			match self.port.read(&mut buf[filled..]) {
				Ok(0) => {
					return Err(io::Error::new(
						io::ErrorKind::UnexpectedEof,
						"serial port closed",
					).into());
				}
				Ok(n) => filled += n,
				Err(ref e)
					if e.kind() == io::ErrorKind::TimedOut
						|| e.kind() == io::ErrorKind::WouldBlock =>
				{
					return Ok(false);
				}
				Err(e) => return Err(e.into()),
			}
		}
		Ok(true)
	}

	fn expect(&mut self, pattern: &[u8], timeout: Duration) -> AResult<bool> {
		assert!(!pattern.is_empty());
		let deadline = Instant::now() + timeout;
		let mut window: Vec<u8> = Vec::with_capacity(pattern.len());
		loop {
			let now = Instant::now();
			if now >= deadline {
				return Ok(false);
			}
			self.port.set_timeout(deadline - now)?;
			let mut byte = [0u8; 1];
			match self.port.read(&mut byte) {
				Ok(0) => {
					return Err(io::Error::new(
						io::ErrorKind::UnexpectedEof,
						"serial port closed",
					).into());
				}
				Ok(_) => {
					if window.len() == pattern.len() {
						window.remove(0);
					}
					window.push(byte[0]);
					if window == pattern {
						return Ok(true);
					}
				}
				Err(ref e)
					if e.kind() == io::ErrorKind::TimedOut
						|| e.kind() == io::ErrorKind::WouldBlock =>
				{
					return Ok(false);
				}
				Err(e) => return Err(e.into()),
			}
		}
	}
}

#[cfg(test)]
pub(crate) mod script {
	use std::collections::VecDeque;
	use std::time::Duration;

	use crate::AResult;

	use super::Transport;

	pub enum Step {
		/// bytes the adapter answers with
		Reply(Vec<u8>),
		/// the adapter stays silent; the pending receive runs into its deadline
		Silence,
	}

	/// Scripted transport for unit tests: records everything sent, serves
	/// canned replies in order. Deadlines are never actually waited out.
	pub struct ScriptTransport {
		pub sent: Vec<u8>,
		steps: VecDeque<Step>,
		pending: VecDeque<u8>,
	}

	impl ScriptTransport {
		pub fn new(steps: Vec<Step>) -> ScriptTransport {
			ScriptTransport {
				sent: Vec::new(),
				steps: steps.into_iter().collect(),
				pending: VecDeque::new(),
			}
		}

		fn next_byte(&mut self) -> Option<u8> {
			while self.pending.is_empty() {
				match self.steps.pop_front() {
					Some(Step::Reply(bytes)) => self.pending.extend(bytes),
					// exhausted scripts act like a dead adapter
					Some(Step::Silence) | None => return None,
				}
			}
			self.pending.pop_front()
		}
	}

	impl Transport for ScriptTransport {
		fn send(&mut self, data: &[u8]) -> AResult<()> {
			self.sent.extend_from_slice(data);
			Ok(())
		}

		fn recv_exact(&mut self, buf: &mut [u8], _timeout: Duration) -> AResult<bool> {
			for slot in buf.iter_mut() {
				match self.next_byte() {
					Some(byte) => *slot = byte,
					None => return Ok(false),
				}
			}
			Ok(true)
		}

		fn expect(&mut self, pattern: &[u8], _timeout: Duration) -> AResult<bool> {
			let mut window: Vec<u8> = Vec::with_capacity(pattern.len());
			loop {
				if window.ends_with(pattern) {
					return Ok(true);
				}
				match self.next_byte() {
					Some(byte) => window.push(byte),
					None => return Ok(false),
				}
			}
		}
	}
}
