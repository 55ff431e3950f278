//! Addressing and paging engine for 24XX serial EEPROMs behind the I2C
//! interface.
//!
//! The device keeps an internal address cursor that auto-increments on
//! sequential reads and a page buffer that cannot cross a page boundary in
//! one write cycle. `Memory` hides both: it maps a logical byte offset onto
//! the capacity-dependent wire encoding, splits writes at page boundaries,
//! polls the chip through its internal write cycle, and mirrors the device
//! cursor on the host so it stays trustworthy across failures.

mod address;
mod pages;

pub use self::address::{
	AddressTier,
	READ_OPCODE,
	WRITE_OPCODE,
};
pub use self::pages::{
	max_position,
	page_size,
};

use std::thread;
use std::time::{
	Duration,
	Instant,
};

use crate::buspirate::{
	wire,
	Controller,
	DeviceMode,
	Exchange,
	Peripherals,
	Speed,
};
use crate::transport::Transport;
use crate::{
	AResult,
	Error,
};

pub const DEFAULT_READ_CHUNK: usize = 4096;

// EEPROM write cycles finish within a few milliseconds; the deadline is
// deliberately generous, the delay keeps the poll from saturating the
// serial link
const WRITE_CYCLE_TIMEOUT: Duration = Duration::from_secs(1);
const WRITE_POLL_DELAY: Duration = Duration::from_millis(25);
const WRITE_POLL_STATUS_TIMEOUT: Duration = Duration::from_millis(200);

pub struct Memory<T: Transport> {
	controller: Controller<T>,
	capacity_kbits: u32,
	page_size: usize,
	max_position: usize,
	speed: Speed,
	peripherals: Peripherals,
	pos: usize,
	configured: bool,
}

impl<T: Transport> Memory<T> {
	/// Checks the geometry only; `configure` drives the device. Unknown
	/// capacities are rejected here, before anything touches the bus.
	pub fn new(
		controller: Controller<T>,
		capacity_kbits: u32,
		speed: Speed,
		power: bool,
		pullup: bool,
	) -> AResult<Memory<T>> {
		let page_size = pages::page_size(capacity_kbits).ok_or_else(|| {
			Error::configuration(format!("unknown EEPROM capacity: {} kbit", capacity_kbits))
		})?;
		Ok(Memory {
			controller,
			capacity_kbits,
			page_size,
			max_position: pages::max_position(capacity_kbits),
			speed,
			peripherals: Peripherals {
				power,
				pullup,
				aux: false,
				cs: false,
			},
			pos: 0,
			configured: false,
		})
	}

	pub fn position(&self) -> usize {
		self.pos
	}

	pub fn max_position(&self) -> usize {
		self.max_position
	}

	pub fn page_size(&self) -> usize {
		self.page_size
	}

	pub fn capacity_kbits(&self) -> u32 {
		self.capacity_kbits
	}

	pub fn is_configured(&self) -> bool {
		self.configured
	}

	pub fn address_tier(&self) -> AddressTier {
		AddressTier::for_max_position(self.max_position)
	}

	/// Bring the adapter and bus up: I2C mode, bus speed, peripherals, cursor
	/// to zero. Idempotent. The sequence is not transactional; if a step in
	/// the middle fails the device is left partially configured and the
	/// caller still runs `deconfigure`.
	pub fn configure(&mut self) -> AResult<()> {
		if self.configured {
			return Ok(());
		}
		if self.controller.mode() == DeviceMode::Unknown {
			self.controller.reset_binary_mode()?;
		}
		self.controller.enter_i2c()?;
		self.controller.i2c().set_speed(self.speed)?;
		self.controller.i2c().configure_peripherals(self.peripherals)?;
		self.configured = true;
		self.seek(0)?;
		Ok(())
	}

	/// Unconditional release: turns the supply and pull-ups off and drops the
	/// adapter back to raw bitbang mode. Callers run this even after another
	/// operation failed; it is safe after a partial `configure`.
	pub fn deconfigure(&mut self) -> AResult<()> {
		if self.controller.mode() == DeviceMode::I2c {
			self.controller.i2c().configure_peripherals(Peripherals::off())?;
			self.controller.reset_binary_mode()?;
		}
		self.configured = false;
		Ok(())
	}

	/// Move the device cursor. The host cursor follows only once the device
	/// acknowledged the address command; on failure it keeps the last
	/// confirmed offset.
	pub fn seek(&mut self, pos: usize) -> AResult<()> {
		if pos > self.max_position {
			return Err(Error::Bounds {
				target: pos,
				max: self.max_position,
			});
		}
		self.require_configured()?;
		let command = address::address_command(self.address_tier(), pos);
		match self.controller.i2c().write_then_read(
			&command,
			0,
			wire::i2c::WRITE_THEN_READ_STATUS_TIMEOUT,
		)? {
			Exchange::Completed(_) => {
				self.pos = pos;
				Ok(())
			}
			Exchange::NoResponse => Err(Error::protocol("seek", "address command not acknowledged")),
		}
	}

	/// Sequential read as a finite, one-shot chunk sequence; consuming it
	/// advances the cursor. Ends early at the end of memory with whatever was
	/// collected. `read_to_vec` is the collected convenience form.
	pub fn read<'a>(
		&'a mut self,
		count: usize,
		chunk_size: usize,
	) -> AResult<ChunkReader<'a, T>> {
		self.require_configured()?;
		if chunk_size == 0 || chunk_size > wire::i2c::WRITE_THEN_READ_MAX {
			return Err(Error::configuration(format!(
				"chunk size must be 1..={}, got {}",
				wire::i2c::WRITE_THEN_READ_MAX,
				chunk_size
			)));
		}
		Ok(ChunkReader {
			memory: self,
			remaining: count,
			chunk_size,
			failed: false,
		})
	}

	pub fn read_to_vec(&mut self, count: usize) -> AResult<Vec<u8>> {
		let mut buffer = Vec::new();
		for chunk in self.read(count, DEFAULT_READ_CHUNK)? {
			buffer.extend_from_slice(&chunk?);
		}
		Ok(buffer)
	}

	fn read_chunk(&mut self, want: usize) -> AResult<Vec<u8>> {
		match self.controller.i2c().write_then_read(
			&[address::READ_OPCODE],
			want,
			wire::i2c::WRITE_THEN_READ_STATUS_TIMEOUT,
		)? {
			Exchange::Completed(bytes) => {
				// the device auto-incremented its internal cursor; follow it,
				// clamped to the last valid offset
				let next = (self.pos + bytes.len()).min(self.max_position);
				self.seek(next)?;
				Ok(bytes)
			}
			Exchange::NoResponse => Err(Error::protocol("read", "read command not acknowledged")),
		}
	}

	/// Write `data` at the cursor, split at page boundaries, each chunk
	/// polled through the device's internal write cycle. The cursor advances
	/// per committed chunk: after a failure it marks the committed prefix and
	/// the write can be resumed from there.
	pub fn write(&mut self, data: &[u8]) -> AResult<usize> {
		self.require_configured()?;
		if self.pos + data.len() > self.max_position {
			return Err(Error::Bounds {
				target: self.pos + data.len(),
				max: self.max_position,
			});
		}

		let mut committed = 0;
		while committed < data.len() {
			// a write starting mid-page may only run up to the next page
			// boundary; the chip's page buffer wraps within the page otherwise
			let take = (self.page_size - self.pos % self.page_size).min(data.len() - committed);
			let chunk = &data[committed..committed + take];
			if let Err(e) = self.write_chunk(chunk) {
				warn!(
					"write aborted after {} committed byte(s), cursor at {}",
					committed, self.pos
				);
				return Err(e);
			}
			committed += take;
			debug!("committed {} / {} bytes", committed, data.len());
		}
		Ok(committed)
	}

	fn write_chunk(&mut self, chunk: &[u8]) -> AResult<()> {
		let tier = self.address_tier();
		let mut frame = address::address_command(tier, self.pos);
		frame.extend_from_slice(chunk);
		match self.controller.i2c().write_then_read(
			&frame,
			0,
			wire::i2c::WRITE_THEN_READ_STATUS_TIMEOUT,
		)? {
			Exchange::Completed(_) => (),
			Exchange::NoResponse => {
				return Err(Error::protocol("write", "page write not acknowledged"));
			}
		}

		// ack-poll: the chip ignores address commands while its internal
		// write cycle runs; keep probing the next offset until it answers
		let next = self.pos + chunk.len();
		let probe = address::address_command(tier, next);
		let deadline = Instant::now() + WRITE_CYCLE_TIMEOUT;
		loop {
			match self
				.controller
				.i2c()
				.write_then_read(&probe, 0, WRITE_POLL_STATUS_TIMEOUT)?
			{
				Exchange::Completed(_) => break,
				Exchange::NoResponse => {
					if Instant::now() >= deadline {
						return Err(Error::protocol("write", "write acknowledgment timeout"));
					}
					thread::sleep(WRITE_POLL_DELAY);
				}
			}
		}
		self.pos = next;
		Ok(())
	}

	fn require_configured(&self) -> AResult<()> {
		if self.configured {
			Ok(())
		} else {
			Err(Error::configuration("device is not configured"))
		}
	}
}

pub struct ChunkReader<'a, T: Transport + 'a> {
	memory: &'a mut Memory<T>,
	remaining: usize,
	chunk_size: usize,
	failed: bool,
}

impl<'a, T: Transport> Iterator for ChunkReader<'a, T> {
	type Item = AResult<Vec<u8>>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed || self.remaining == 0 || self.memory.pos >= self.memory.max_position {
			return None;
		}
		match self.memory.read_chunk(self.remaining.min(self.chunk_size)) {
			Ok(chunk) => {
				self.remaining -= chunk.len().min(self.remaining);
				Some(Ok(chunk))
			}
			Err(e) => {
				self.failed = true;
				Some(Err(e))
			}
		}
	}
}
