#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate i2c_eeprom;
use i2c_eeprom::*;

use std::process::exit;
use std::time::Duration;

use i2c_eeprom::eeprom::{
	DeviceConfig,
	EepromDevice,
	PresencePolicy,
};
use i2c_eeprom::i2c::{
	BusHandle,
	LinuxI2c,
};
use i2c_eeprom::util::Int;

// transport failure (as opposed to usage errors or a missing bus)
const EXIT_TRANSFER_FAILED: i32 = 2;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid paramater {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_param_or<T>(matches: &clap::ArgMatches, name: &str, default: T) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	if matches.is_present(name) {
		get_param(matches, name)
	} else {
		Ok(default)
	}
}

fn device_config(matches: &clap::ArgMatches) -> AResult<DeviceConfig> {
	let defaults = DeviceConfig::default();

	let address = get_param_or(matches, "address", Int(defaults.address as u32))?;
	ensure!(address.0 <= 0x7f, "address {} is not a 7-bit I2C address", address);
	let size = get_param_or(matches, "size", Int(defaults.capacity_bits))?;
	let settle_us = get_param_or(matches, "settle_us", Int(defaults.settle_delay.as_micros() as u32))?;
	let presence_policy = if matches.is_present("strict") {
		PresencePolicy::Strict
	} else {
		PresencePolicy::Permissive
	};

	Ok(DeviceConfig::new()
		.address(address.0 as u8)
		.capacity_bits(size.0)
		.settle_delay(Duration::from_micros(settle_us.0 as u64))
		.presence_policy(presence_policy))
}

fn open_bus(matches: &clap::ArgMatches) -> AResult<BusHandle<LinuxI2c>> {
	let index = get_param_or(matches, "bus", Int(1))?;
	Ok(BusHandle::open(index.0 as usize)?)
}

fn open_device(matches: &clap::ArgMatches, bus: &mut BusHandle<LinuxI2c>) -> AResult<EepromDevice> {
	let config = device_config(matches)?;
	let device = EepromDevice::new(bus, config)?;
	if !device.is_present() {
		warn!("EEPROM 0x{:02x} on I2C bus {} didn't respond to the presence probe", device.address(), bus.index());
	}
	Ok(device)
}

fn scan(matches: &clap::ArgMatches) -> AResult<()> {
	let mut bus = open_bus(matches)?;
	for address in bus.scan_addresses()? {
		println!("0x{:02x}", address);
	}
	bus.close();

	Ok(())
}

fn read(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let register: Int = get_param(sub_m, "REGISTER")?;

	let mut bus = open_bus(matches)?;
	let mut ee = open_device(matches, &mut bus)?;
	let outcome = ee.read_byte(&mut bus, register.0)?;
	bus.close();

	match outcome.into_result() {
		Ok(value) => println!("@{:03x}: {:02x}", register.0, value),
		Err(e) => {
			error!("Reading register {} failed: {}", register, e);
			exit(EXIT_TRANSFER_FAILED);
		},
	}

	Ok(())
}

fn write(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let register: Int = get_param(sub_m, "REGISTER")?;
	let data: Int = get_param(sub_m, "DATA")?;

	let mut bus = open_bus(matches)?;
	let mut ee = open_device(matches, &mut bus)?;
	let outcome = ee.write_byte(&mut bus, register.0, data.0)?;
	bus.close();

	println!("payload: {:02x?}, success: {}", outcome.value, outcome.success());
	if let Some(e) = outcome.error {
		error!("Writing register {} failed: {}", register, e);
		exit(EXIT_TRANSFER_FAILED);
	}

	Ok(())
}

fn verify(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let register: Int = get_param(sub_m, "REGISTER")?;
	let data: Int = get_param(sub_m, "DATA")?;

	let mut bus = open_bus(matches)?;
	let mut ee = open_device(matches, &mut bus)?;
	let verification = ee.verify_write(&mut bus, register.0, data.0, None)?;
	bus.close();

	if verification.is_verified() {
		println!("Register {} verified successfully", register);
	} else {
		eprintln!("Verification failed: {}", verification);
		exit(EXIT_TRANSFER_FAILED);
	}

	Ok(())
}

fn dump(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let mut bus = open_bus(matches)?;
	let mut ee = open_device(matches, &mut bus)?;

	let start: Int = get_param_or(sub_m, "START", Int(0))?;
	let default_len = (ee.max_register() + 1).saturating_sub(start.0);
	let len: Int = get_param_or(sub_m, "LEN", Int(default_len))?;

	let outcome = ee.read_range(&mut bus, start.0, len.0)?;
	bus.close();

	let data = &outcome.value;
	for (i, b) in data.iter().enumerate() {
		let register = start.0 as usize + i;
		if 0 == i || 0 == register % 16 {
			if 0 != i {
				println!();
			}
			print!("{:04x}:", register);
		}
		print!(" {:02x}", b);
	}
	if !data.is_empty() {
		println!();
	}

	if let Some(e) = outcome.error {
		error!("Dump stopped at register 0x{:x}: {}", start.0 as usize + data.len(), e);
		exit(EXIT_TRANSFER_FAILED);
	}

	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg bus: -b --bus +takes_value "I2C bus index, opens /dev/i2c-INDEX (default: 1)")
		(@arg address: -a --address +takes_value "I2C address of the EEPROM (default: 0x50)")
		(@arg size: -s --size +takes_value "EEPROM capacity in bits (default: 32768)")
		(@arg settle_us: --("settle-us") +takes_value "minimum delay after a write in microseconds (default: 1000)")
		(@arg strict: --strict "refuse to access an EEPROM that failed the presence probe")
		(@subcommand scan =>
			(about: "list responding I2C addresses")
		)
		(@subcommand read =>
			(about: "read a single register")
			(@arg REGISTER: +required "register to read")
		)
		(@subcommand write =>
			(about: "write a single register")
			(@arg REGISTER: +required "register to write")
			(@arg DATA: +required "byte to write")
		)
		(@subcommand verify =>
			(about: "write a single register and verify it by reading it back")
			(@arg REGISTER: +required "register to write")
			(@arg DATA: +required "byte to write")
		)
		(@subcommand dump =>
			(about: "hex dump of EEPROM content")
			(@arg START: "first register (default: 0)")
			(@arg LEN: "number of registers (default: up to the end)")
		)
	).get_matches();

	match matches.subcommand() {
		("scan", _) => {
			scan(&matches)
		},
		("read", Some(sub_m)) => {
			read(&matches, sub_m)
		},
		("write", Some(sub_m)) => {
			write(&matches, sub_m)
		},
		("verify", Some(sub_m)) => {
			verify(&matches, sub_m)
		},
		("dump", Some(sub_m)) => {
			dump(&matches, sub_m)
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
