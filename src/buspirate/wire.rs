//! Binary-mode wire protocol constants.
//!
//! All opcodes are single bytes. Mode changes answer with a version string
//! ("BBIO1" for raw bitbang, "I2C1" for the I2C interface); everything else
//! acknowledges with a single 0x01 byte. Timeouts are fixed per protocol
//! phase and are not caller-configurable.

use std::time::Duration;

pub const RESET_BITBANG: u8 = 0x00;
pub const BITBANG_HANDSHAKE: &[u8] = b"BBIO1";
pub const SIMPLEX_SUCCESS: u8 = 0x01;

// a dirty adapter may be mid-transaction and needs several zero bytes
// before it falls back into the bitbang prompt
pub const RESET_ATTEMPTS: usize = 20;
pub const RESET_TIMEOUT: Duration = Duration::from_millis(50);

pub const SIMPLEX_TIMEOUT: Duration = Duration::from_millis(100);

pub mod i2c {
	use std::time::Duration;

	pub const ENTER: u8 = 0x02;
	pub const HANDSHAKE: &[u8] = b"I2C1";
	pub const ENTER_TIMEOUT: Duration = Duration::from_millis(200);

	pub const START: u8 = 0x02;
	pub const STOP: u8 = 0x03;
	pub const READ_BYTE: u8 = 0x04;
	pub const ACK: u8 = 0x06;
	pub const NACK: u8 = 0x07;
	pub const WRITE_THEN_READ: u8 = 0x08;
	// low nibble carries payload length - 1
	pub const BULK_WRITE: u8 = 0x10;
	pub const BULK_WRITE_MAX: usize = 16;

	pub const CONFIGURE_PERIPHERALS: u8 = 0x40;
	pub const PERIPHERAL_POWER: u8 = 0x08;
	pub const PERIPHERAL_PULLUP: u8 = 0x04;
	pub const PERIPHERAL_AUX: u8 = 0x02;
	pub const PERIPHERAL_CS: u8 = 0x01;

	pub const SPEED_5KHZ: u8 = 0x60;
	pub const SPEED_50KHZ: u8 = 0x61;
	pub const SPEED_100KHZ: u8 = 0x62;
	pub const SPEED_400KHZ: u8 = 0x63;

	pub const WRITE_THEN_READ_MAX: usize = 4096;

	pub const START_STOP_TIMEOUT: Duration = Duration::from_millis(500);
	pub const PREPARE_WRITE_TIMEOUT: Duration = Duration::from_millis(100);
	pub const ACK_NACK_TIMEOUT: Duration = Duration::from_millis(300);
	pub const READ_TIMEOUT: Duration = Duration::from_secs(1);
	pub const SLAVE_ACK_TIMEOUT: Duration = Duration::from_millis(500);
	pub const WRITE_THEN_READ_STATUS_TIMEOUT: Duration = Duration::from_secs(5);
	pub const WRITE_THEN_READ_DATA_TIMEOUT: Duration = Duration::from_millis(100);
}
