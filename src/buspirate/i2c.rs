use std::fmt;
use std::str;
use std::time::Duration;

use crate::transport::Transport;
use crate::{
	AResult,
	Error,
};

use super::wire;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Speed {
	Khz5,
	Khz50,
	Khz100,
	Khz400,
}

impl Speed {
	fn opcode(self) -> u8 {
		match self {
			Speed::Khz5 => wire::i2c::SPEED_5KHZ,
			Speed::Khz50 => wire::i2c::SPEED_50KHZ,
			Speed::Khz100 => wire::i2c::SPEED_100KHZ,
			Speed::Khz400 => wire::i2c::SPEED_400KHZ,
		}
	}
}

impl Default for Speed {
	fn default() -> Speed {
		Speed::Khz100
	}
}

impl fmt::Display for Speed {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let name = match self {
			Speed::Khz5 => "5khz",
			Speed::Khz50 => "50khz",
			Speed::Khz100 => "100khz",
			Speed::Khz400 => "400khz",
		};
		write!(f, "{}", name)
	}
}

impl str::FromStr for Speed {
	type Err = Error;

	fn from_str(s: &str) -> Result<Speed, Error> {
		match s {
			"5khz" => Ok(Speed::Khz5),
			"50khz" => Ok(Speed::Khz50),
			"100khz" => Ok(Speed::Khz100),
			"400khz" => Ok(Speed::Khz400),
			other => Err(Error::configuration(format!(
				"unknown bus speed {:?} (expected 5khz, 50khz, 100khz or 400khz)",
				other
			))),
		}
	}
}

/// Switchable adapter peripherals, one flag bit each in the configuration
/// opcode.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Peripherals {
	pub power: bool,
	pub pullup: bool,
	pub aux: bool,
	pub cs: bool,
}

impl Peripherals {
	pub fn off() -> Peripherals {
		Peripherals::default()
	}

	fn opcode(self) -> u8 {
		let mut op = wire::i2c::CONFIGURE_PERIPHERALS;
		if self.power {
			op |= wire::i2c::PERIPHERAL_POWER;
		}
		if self.pullup {
			op |= wire::i2c::PERIPHERAL_PULLUP;
		}
		if self.aux {
			op |= wire::i2c::PERIPHERAL_AUX;
		}
		if self.cs {
			op |= wire::i2c::PERIPHERAL_CS;
		}
		op
	}
}

/// Per-byte outcome of a bulk write; a NACK mid-stream means the slave
/// stopped accepting data.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AckResult {
	Ack,
	Nack,
}

/// Outcome of a write-then-read transaction.
///
/// `NoResponse` is the soft case: the adapter produced no status byte within
/// the timeout. It is deliberately not an error, so a caller polling a slave
/// through its internal write cycle can retry without tearing anything down.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Exchange {
	Completed(Vec<u8>),
	NoResponse,
}

impl Exchange {
	pub fn is_completed(&self) -> bool {
		match self {
			Exchange::Completed(_) => true,
			Exchange::NoResponse => false,
		}
	}
}

/// Low-level I2C primitives of the binary interface mode.
///
/// Every primitive is a "simplex command": one opcode byte out, one success
/// byte back within the operation's timeout class.
pub struct I2c<'a, T: Transport + 'a> {
	transport: &'a mut T,
}

impl<'a, T: Transport> I2c<'a, T> {
	pub(super) fn new(transport: &'a mut T) -> I2c<'a, T> {
		I2c { transport }
	}

	fn simplex_command(
		&mut self,
		opcode: u8,
		timeout: Duration,
		operation: &'static str,
	) -> AResult<()> {
		self.transport.send(&[opcode])?;
		if self.transport.expect(&[wire::SIMPLEX_SUCCESS], timeout)? {
			return Ok(());
		}
		Err(Error::protocol(operation, "no success acknowledgment"))
	}

	pub fn configure_peripherals(&mut self, peripherals: Peripherals) -> AResult<()> {
		self.simplex_command(
			peripherals.opcode(),
			wire::SIMPLEX_TIMEOUT,
			"configure_peripherals",
		)
	}

	pub fn set_speed(&mut self, speed: Speed) -> AResult<()> {
		self.simplex_command(speed.opcode(), wire::SIMPLEX_TIMEOUT, "set_speed")
	}

	pub fn send_start(&mut self) -> AResult<()> {
		self.simplex_command(
			wire::i2c::START,
			wire::i2c::START_STOP_TIMEOUT,
			"send_start",
		)
	}

	pub fn send_stop(&mut self) -> AResult<()> {
		self.simplex_command(wire::i2c::STOP, wire::i2c::START_STOP_TIMEOUT, "send_stop")
	}

	pub fn send_ack(&mut self) -> AResult<()> {
		self.simplex_command(wire::i2c::ACK, wire::i2c::ACK_NACK_TIMEOUT, "send_ack")
	}

	pub fn send_nack(&mut self) -> AResult<()> {
		self.simplex_command(wire::i2c::NACK, wire::i2c::ACK_NACK_TIMEOUT, "send_nack")
	}

	/// Read `count` bytes one request at a time. With `auto_ack` every byte
	/// but the last is acknowledged to keep the transaction open; with
	/// `auto_nack` the last byte is answered with NACK to terminate it.
	pub fn read(&mut self, count: usize, auto_ack: bool, auto_nack: bool) -> AResult<Vec<u8>> {
		let mut result = Vec::with_capacity(count);
		for i in 0..count {
			self.transport.send(&[wire::i2c::READ_BYTE])?;
			let mut byte = [0u8; 1];
			if !self.transport.recv_exact(&mut byte, wire::i2c::READ_TIMEOUT)? {
				return Err(Error::protocol(
					"read",
					format!("no data for byte {} of {}", i + 1, count),
				));
			}
			result.push(byte[0]);
			let last = i + 1 == count;
			if auto_ack && !last {
				self.send_ack()?;
			}
			if auto_nack && last {
				self.send_nack()?;
			}
		}
		Ok(result)
	}

	/// Stream up to 16 bytes onto the bus, one status byte back per data
	/// byte. The ordered ACK/NACK outcomes let the caller spot a slave that
	/// stopped listening mid-stream.
	pub fn bulk_write(&mut self, data: &[u8]) -> AResult<Vec<AckResult>> {
		if data.is_empty() || data.len() > wire::i2c::BULK_WRITE_MAX {
			return Err(Error::configuration(format!(
				"bulk write takes 1..={} bytes, got {}",
				wire::i2c::BULK_WRITE_MAX,
				data.len()
			)));
		}
		let prepare = wire::i2c::BULK_WRITE | (data.len() - 1) as u8;
		self.simplex_command(prepare, wire::i2c::PREPARE_WRITE_TIMEOUT, "bulk_write")?;

		let mut acks = Vec::with_capacity(data.len());
		for &byte in data {
			self.transport.send(&[byte])?;
			let mut status = [0u8; 1];
			if !self
				.transport
				.recv_exact(&mut status, wire::i2c::SLAVE_ACK_TIMEOUT)?
			{
				return Err(Error::protocol("bulk_write", "no ack/nack for data byte"));
			}
			acks.push(match status[0] {
				0 => AckResult::Ack,
				1 => AckResult::Nack,
				other => {
					return Err(Error::protocol(
						"bulk_write",
						format!("invalid ack/nack status 0x{:02x}", other),
					));
				}
			});
		}
		Ok(acks)
	}

	/// One framed transaction: write phase plus an immediately following read
	/// phase, both lengths big-endian. The whole frame goes out in a single
	/// send so the adapter never sees a torn command.
	pub fn write_then_read(
		&mut self,
		data: &[u8],
		expected: usize,
		status_timeout: Duration,
	) -> AResult<Exchange> {
		if data.len() > wire::i2c::WRITE_THEN_READ_MAX {
			return Err(Error::configuration(format!(
				"write-then-read payload limited to {} bytes, got {}",
				wire::i2c::WRITE_THEN_READ_MAX,
				data.len()
			)));
		}
		if expected > wire::i2c::WRITE_THEN_READ_MAX {
			return Err(Error::configuration(format!(
				"write-then-read can expect at most {} bytes, requested {}",
				wire::i2c::WRITE_THEN_READ_MAX,
				expected
			)));
		}

		let mut frame = Vec::with_capacity(5 + data.len());
		frame.push(wire::i2c::WRITE_THEN_READ);
		frame.extend_from_slice(&(data.len() as u16).to_be_bytes());
		frame.extend_from_slice(&(expected as u16).to_be_bytes());
		frame.extend_from_slice(data);
		self.transport.send(&frame)?;

		let mut status = [0u8; 1];
		if !self.transport.recv_exact(&mut status, status_timeout)? {
			return Ok(Exchange::NoResponse);
		}
		if status[0] == 0 {
			return Err(Error::protocol("write_then_read", "adapter reported write failure"));
		}
		if expected == 0 {
			return Ok(Exchange::Completed(Vec::new()));
		}

		let mut payload = vec![0u8; expected];
		if !self
			.transport
			.recv_exact(&mut payload, wire::i2c::WRITE_THEN_READ_DATA_TIMEOUT)?
		{
			return Err(Error::protocol(
				"write_then_read",
				format!("timed out waiting for {} response bytes", expected),
			));
		}
		Ok(Exchange::Completed(payload))
	}
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use crate::transport::script::{
		ScriptTransport,
		Step,
	};
	use crate::Error;

	use super::{
		AckResult,
		Exchange,
		I2c,
		Peripherals,
		Speed,
	};

	// the scripted transport never waits, any deadline will do
	const TIMEOUT: Duration = Duration::from_millis(10);

	fn scripted(steps: Vec<Step>) -> ScriptTransport {
		ScriptTransport::new(steps)
	}

	#[test]
	fn peripheral_flags_build_the_opcode() {
		let mut transport = scripted(vec![Step::Reply(vec![0x01])]);
		I2c::new(&mut transport)
			.configure_peripherals(Peripherals {
				power: true,
				pullup: true,
				aux: false,
				cs: false,
			})
			.unwrap();
		assert_eq!(transport.sent, vec![0x4c]);
	}

	#[test]
	fn peripherals_off_is_the_bare_opcode() {
		let mut transport = scripted(vec![Step::Reply(vec![0x01])]);
		I2c::new(&mut transport)
			.configure_peripherals(Peripherals::off())
			.unwrap();
		assert_eq!(transport.sent, vec![0x40]);
	}

	#[test]
	fn speed_opcodes() {
		let speeds = [
			(Speed::Khz5, 0x60),
			(Speed::Khz50, 0x61),
			(Speed::Khz100, 0x62),
			(Speed::Khz400, 0x63),
		];
		for &(speed, opcode) in speeds.iter() {
			let mut transport = scripted(vec![Step::Reply(vec![0x01])]);
			I2c::new(&mut transport).set_speed(speed).unwrap();
			assert_eq!(transport.sent, vec![opcode]);
		}
	}

	#[test]
	fn speed_parses_from_cli_notation() {
		assert_eq!("400khz".parse::<Speed>().unwrap(), Speed::Khz400);
		match "9600".parse::<Speed>() {
			Err(Error::Configuration(_)) => (),
			other => panic!("expected configuration error, got {:?}", other),
		}
	}

	#[test]
	fn simplex_timeout_is_a_protocol_error() {
		let mut transport = scripted(vec![Step::Silence]);
		match I2c::new(&mut transport).send_start() {
			Err(Error::Protocol { operation, .. }) => assert_eq!(operation, "send_start"),
			other => panic!("expected protocol error, got {:?}", other),
		}
	}

	#[test]
	fn read_interleaves_ack_and_nack() {
		let mut transport = scripted(vec![
			Step::Reply(vec![0xaa]),
			Step::Reply(vec![0x01]), // ack acknowledged
			Step::Reply(vec![0xbb]),
			Step::Reply(vec![0x01]), // nack acknowledged
		]);
		let data = I2c::new(&mut transport).read(2, true, true).unwrap();
		assert_eq!(data, vec![0xaa, 0xbb]);
		// read, ack, read, nack
		assert_eq!(transport.sent, vec![0x04, 0x06, 0x04, 0x07]);
	}

	#[test]
	fn read_without_flow_control_only_requests_bytes() {
		let mut transport = scripted(vec![
			Step::Reply(vec![0x11]),
			Step::Reply(vec![0x22]),
		]);
		let data = I2c::new(&mut transport).read(2, false, false).unwrap();
		assert_eq!(data, vec![0x11, 0x22]);
		assert_eq!(transport.sent, vec![0x04, 0x04]);
	}

	#[test]
	fn bulk_write_collects_per_byte_outcomes() {
		let mut transport = scripted(vec![
			Step::Reply(vec![0x01]), // prepare acknowledged
			Step::Reply(vec![0x00]), // first byte acked
			Step::Reply(vec![0x01]), // second byte nacked
		]);
		let acks = I2c::new(&mut transport)
			.bulk_write(&[0xde, 0xad])
			.unwrap();
		assert_eq!(acks, vec![AckResult::Ack, AckResult::Nack]);
		// opcode carries length - 1 in the low nibble
		assert_eq!(transport.sent, vec![0x11, 0xde, 0xad]);
	}

	#[test]
	fn bulk_write_rejects_bad_sizes_before_sending() {
		let mut transport = scripted(Vec::new());
		{
			let mut i2c = I2c::new(&mut transport);
			assert!(i2c.bulk_write(&[]).is_err());
			assert!(i2c.bulk_write(&[0u8; 17]).is_err());
		}
		assert!(transport.sent.is_empty());
	}

	#[test]
	fn bulk_write_treats_unknown_status_as_fatal() {
		let mut transport = scripted(vec![
			Step::Reply(vec![0x01]),
			Step::Reply(vec![0x07]),
		]);
		match I2c::new(&mut transport).bulk_write(&[0x55]) {
			Err(Error::Protocol { operation, .. }) => assert_eq!(operation, "bulk_write"),
			other => panic!("expected protocol error, got {:?}", other),
		}
	}

	#[test]
	fn write_then_read_frames_lengths_big_endian() {
		let mut transport = scripted(vec![
			Step::Reply(vec![0x01]),
			Step::Reply(vec![0x10, 0x20, 0x30]),
		]);
		let exchange = I2c::new(&mut transport)
			.write_then_read(&[0xa1], 3, TIMEOUT)
			.unwrap();
		assert_eq!(exchange, Exchange::Completed(vec![0x10, 0x20, 0x30]));
		assert_eq!(transport.sent, vec![0x08, 0x00, 0x01, 0x00, 0x03, 0xa1]);
	}

	#[test]
	fn write_then_read_status_timeout_is_soft() {
		let mut transport = scripted(vec![Step::Silence]);
		let exchange = I2c::new(&mut transport)
			.write_then_read(&[0xa0, 0x00, 0x00], 0, TIMEOUT)
			.unwrap();
		assert_eq!(exchange, Exchange::NoResponse);
	}

	#[test]
	fn write_then_read_failure_status_is_hard() {
		let mut transport = scripted(vec![Step::Reply(vec![0x00])]);
		match I2c::new(&mut transport).write_then_read(
			&[0xa0, 0x00, 0x00],
			0,
			TIMEOUT,
		) {
			Err(Error::Protocol { operation, .. }) => {
				assert_eq!(operation, "write_then_read")
			}
			other => panic!("expected protocol error, got {:?}", other),
		}
	}

	#[test]
	fn write_then_read_rejects_oversized_payloads() {
		let mut transport = scripted(Vec::new());
		{
			let mut i2c = I2c::new(&mut transport);
			let too_big = vec![0u8; 4097];
			assert!(i2c
				.write_then_read(&too_big, 0, TIMEOUT)
				.is_err());
			assert!(i2c
				.write_then_read(&[0xa1], 4097, TIMEOUT)
				.is_err());
		}
		assert!(transport.sent.is_empty());
	}
}
