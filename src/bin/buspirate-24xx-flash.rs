#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

extern crate buspirate_24xx_flash;

use std::fmt;
use std::fs;
use std::io::{
	self,
	Write,
};
use std::process::exit;
use std::str;

use buspirate_24xx_flash::buspirate::{
	Controller,
	Speed,
};
use buspirate_24xx_flash::eeprom24xx::{
	max_position,
	page_size,
	AddressTier,
	Memory,
	DEFAULT_READ_CHUNK,
};
use buspirate_24xx_flash::transport::{
	SerialTransport,
	SystemTransport,
};
use buspirate_24xx_flash::{
	AResult,
	Error,
};

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: str::FromStr,
	<T as str::FromStr>::Err: fmt::Display,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => return Err(Error::configuration(format!("missing parameter {}", name))),
	};
	param.parse::<T>().map_err(|e| {
		Error::configuration(format!("invalid parameter {}: {}", name, e))
	})
}

// offsets come in as decimal or 0x-prefixed hex
fn parse_offset(raw: &str) -> AResult<usize> {
	let parsed = if raw.starts_with("0x") || raw.starts_with("0X") {
		usize::from_str_radix(&raw[2..], 16)
	} else {
		raw.parse::<usize>()
	};
	parsed.map_err(|e| Error::configuration(format!("invalid offset {:?}: {}", raw, e)))
}

fn offset_param(matches: &clap::ArgMatches) -> AResult<usize> {
	match matches.value_of("offset") {
		Some(raw) => parse_offset(raw),
		None => Ok(0),
	}
}

fn open_memory(matches: &clap::ArgMatches) -> AResult<Memory<SystemTransport>> {
	let device = match matches.value_of("DEVICE") {
		Some(d) => d,
		None => return Err(Error::configuration("missing parameter DEVICE")),
	};
	let capacity: u32 = get_param(matches, "capacity")?;
	let speed = match matches.value_of("speed") {
		Some(s) => s.parse::<Speed>()?,
		None => Speed::default(),
	};

	let transport = SerialTransport::open(device)?;
	let controller = Controller::new(transport);
	Memory::new(controller, capacity, speed, true, true)
}

fn print_hex(data: &[u8]) {
	for i in 0..data.len() {
		if 0 == i % 16 {
			print!("{:08x} ", i);
		} else if 0 == i % 8 {
			print!(" ");
		}
		print!(" {:02x}", data[i]);
		if 15 == i % 16 {
			println!();
		}
	}
	if 0 != data.len() % 16 {
		println!();
	}
	println!("{:08x}", data.len());
}

fn info(sub_m: &clap::ArgMatches) -> AResult<()> {
	let capacity: u32 = get_param(sub_m, "capacity")?;
	let page = page_size(capacity)
		.ok_or_else(|| Error::configuration(format!("unknown EEPROM capacity: {} kbit", capacity)))?;
	let max = max_position(capacity);

	println!("capacity:         {} kbit", capacity);
	println!("page size:        {} bytes", page);
	println!("highest offset:   0x{:x} ({} bytes)", max, max + 1);
	println!("address encoding: {:?}", AddressTier::for_max_position(max));

	Ok(())
}

fn run_dump(memory: &mut Memory<SystemTransport>, sub_m: &clap::ArgMatches) -> AResult<()> {
	memory.configure()?;
	let offset = offset_param(sub_m)?;
	memory.seek(offset)?;

	let length = match sub_m.value_of("length") {
		Some(_) => get_param(sub_m, "length")?,
		None => memory.max_position() + 1 - offset,
	};

	let mut image = Vec::with_capacity(length);
	for chunk in memory.read(length, DEFAULT_READ_CHUNK)? {
		image.extend_from_slice(&chunk?);
		info!("read {} / {} bytes", image.len(), length);
	}
	if image.len() < length {
		warn!("end of memory after {} bytes", image.len());
	}

	if sub_m.is_present("hex") {
		print_hex(&image);
	} else if let Some(path) = sub_m.value_of("output") {
		fs::write(path, &image)?;
	} else {
		io::stdout().write_all(&image)?;
	}

	Ok(())
}

fn dump(sub_m: &clap::ArgMatches) -> AResult<()> {
	let mut memory = open_memory(sub_m)?;
	let result = run_dump(&mut memory, sub_m);
	// release power and pull-ups even when the dump failed
	if let Err(e) = memory.deconfigure() {
		error!("failed to release the device: {}", e);
	}
	result
}

fn run_restore(
	memory: &mut Memory<SystemTransport>,
	offset: usize,
	image: &[u8],
) -> AResult<()> {
	memory.configure()?;
	memory.seek(offset)?;
	let start = memory.position();
	match memory.write(image) {
		Ok(committed) => {
			info!("wrote {} bytes at offset {}", committed, offset);
			Ok(())
		}
		Err(e) => {
			error!(
				"write failed, {} of {} bytes committed",
				memory.position() - start,
				image.len()
			);
			Err(e)
		}
	}
}

fn restore(sub_m: &clap::ArgMatches) -> AResult<()> {
	let offset = offset_param(sub_m)?;
	let path = match sub_m.value_of("INPUT") {
		Some(p) => p,
		None => return Err(Error::configuration("missing parameter INPUT")),
	};
	let image = fs::read(path)?;

	let mut memory = open_memory(sub_m)?;
	let result = run_restore(&mut memory, offset, &image);
	if let Err(e) = memory.deconfigure() {
		error!("failed to release the device: {}", e);
	}
	result
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@subcommand info =>
			(about: "show memory geometry for an EEPROM capacity")
			(@arg capacity: -c --capacity +required +takes_value "EEPROM capacity in kilobits (e.g. 256)")
		)
		(@subcommand dump =>
			(about: "read EEPROM contents")
			(@arg DEVICE: +required "serial port of the Bus Pirate (e.g. /dev/ttyUSB0)")
			(@arg capacity: -c --capacity +required +takes_value "EEPROM capacity in kilobits")
			(@arg speed: -s --speed +takes_value "bus speed: 5khz, 50khz, 100khz or 400khz (default 100khz)")
			(@arg offset: -o --offset +takes_value "start offset (decimal or 0x hex, default 0)")
			(@arg length: -n --length +takes_value "number of bytes to read (default: to end of memory)")
			(@arg output: -f --output +takes_value "write the binary dump to this file instead of stdout")
			(@arg hex: -x --hex "render a hex dump instead of raw binary")
		)
		(@subcommand restore =>
			(about: "write a binary image to the EEPROM")
			(@arg DEVICE: +required "serial port of the Bus Pirate (e.g. /dev/ttyUSB0)")
			(@arg capacity: -c --capacity +required +takes_value "EEPROM capacity in kilobits")
			(@arg speed: -s --speed +takes_value "bus speed: 5khz, 50khz, 100khz or 400khz (default 100khz)")
			(@arg offset: -o --offset +takes_value "start offset (decimal or 0x hex, default 0)")
			(@arg INPUT: +required "image file to write")
		)
	).get_matches();

	match matches.subcommand() {
		("info", Some(sub_m)) => info(sub_m),
		("dump", Some(sub_m)) => dump(sub_m),
		("restore", Some(sub_m)) => restore(sub_m),
		("", _) => Err(Error::configuration("no subcommand")),
		(cmd, _) => Err(Error::configuration(format!("not implemented subcommand {:?}", cmd))),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
