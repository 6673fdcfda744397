//! Protocol for Microchip 24LCxx style I2C EEPROMs (e.g. 24LC32A, 32 Kbit
//! organized as 4096 x 8 bit)
//!
//! Control byte: 0b1010xxx, i.e. 7-bit addresses 0x50 - 0x57.
//!
//! Every access starts by writing the register address as two bytes, high
//! byte first (only the low 12 bits are used by the 32 Kbit part):
//! - random read: write [hi, lo], repeated start, read 1 byte
//! - byte write: write [hi, lo, data] in one transaction
//!
//! After a write the chip runs an internal write cycle and won't ACK anything
//! until it finished; a small transaction takes ~0.5ms on the wire, so by
//! default we wait at least 1ms after a write before touching the chip again.
//!
//! Page writes (32 byte pages) are not supported.

use std::fmt;
use std::time::{
	Duration,
	Instant,
};

use crate::i2c::{
	BusError,
	BusHandle,
	EEPROM_ADDRESS_RANGE,
	MAX_ADDRESS,
	Message,
	TransferError,
	Transport,
};
use crate::util::reliable_sleep;

mod error;
mod validate;

pub use self::error::{
	ConfigError,
	OperationError,
};

pub use self::validate::{
	ValidationError,
	ValidationReason,
	split_register,
};

pub const DEFAULT_ADDRESS: u8 = 0x50;
pub const DEFAULT_CAPACITY_BITS: u32 = 32768;
// two address bytes
pub const MAX_CAPACITY_BITS: u32 = 0x1_0000 * 8;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1);

/// What to do with operations on a device that failed its presence probe
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PresencePolicy {
	/// attempt the operation anyway; the transfer result tells what happened
	Permissive,
	/// reject with `OperationError::Absent` before touching the bus
	Strict,
}

impl Default for PresencePolicy {
	fn default() -> Self {
		PresencePolicy::Permissive
	}
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DeviceConfig {
	pub address: u8,
	pub capacity_bits: u32,
	pub settle_delay: Duration,
	pub presence_policy: PresencePolicy,
}

impl Default for DeviceConfig {
	fn default() -> Self {
		DeviceConfig {
			address: DEFAULT_ADDRESS,
			capacity_bits: DEFAULT_CAPACITY_BITS,
			settle_delay: DEFAULT_SETTLE_DELAY,
			presence_policy: PresencePolicy::default(),
		}
	}
}

impl DeviceConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn address(mut self, address: u8) -> Self {
		self.address = address;
		self
	}

	pub fn capacity_bits(mut self, capacity_bits: u32) -> Self {
		self.capacity_bits = capacity_bits;
		self
	}

	pub fn settle_delay(mut self, settle_delay: Duration) -> Self {
		self.settle_delay = settle_delay;
		self
	}

	pub fn presence_policy(mut self, presence_policy: PresencePolicy) -> Self {
		self.presence_policy = presence_policy;
		self
	}

	pub fn check(&self) -> Result<(), ConfigError> {
		ensure_config(self.address <= MAX_ADDRESS, ConfigError::Address {
			address: self.address,
		})?;
		ensure_config(
			self.capacity_bits > 0 && 0 == self.capacity_bits % 8 && self.capacity_bits <= MAX_CAPACITY_BITS,
			ConfigError::Capacity {
				capacity_bits: self.capacity_bits,
				max_capacity_bits: MAX_CAPACITY_BITS,
			},
		)
	}
}

fn ensure_config(cond: bool, err: ConfigError) -> Result<(), ConfigError> {
	if cond { Ok(()) } else { Err(err) }
}

/// Result of a single transfer: `value` is always filled in (for reads it is
/// garbage if the transfer failed), `error` tells whether it worked.
#[derive(Debug)]
pub struct Outcome<V> {
	pub value: V,
	pub error: Option<TransferError>,
}

impl<V> Outcome<V> {
	pub fn success(&self) -> bool {
		self.error.is_none()
	}

	pub fn into_result(self) -> Result<V, TransferError> {
		match self.error {
			None => Ok(self.value),
			Some(e) => Err(e),
		}
	}
}

/// All signals of a write-then-verify sequence
#[derive(Debug)]
pub struct Verification {
	pub register: u32,
	pub written: u8,
	pub read_back: u8,
	pub write_error: Option<TransferError>,
	pub read_error: Option<TransferError>,
}

impl Verification {
	/// read back worked but returned other data
	pub fn is_mismatch(&self) -> bool {
		self.read_error.is_none() && self.written != self.read_back
	}

	pub fn is_verified(&self) -> bool {
		self.write_error.is_none() && self.read_error.is_none() && self.written == self.read_back
	}
}

impl fmt::Display for Verification {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"register 0x{:03x}: write_success: {}, read_success: {}, wrote 0x{:02x}, read 0x{:02x}",
			self.register,
			self.write_error.is_none(),
			self.read_error.is_none(),
			self.written,
			self.read_back,
		)
	}
}

/// One EEPROM chip at a fixed address
///
/// Doesn't own the bus: every operation borrows the `BusHandle` and holds
/// its lock only for the duration of a single transfer.
#[derive(Debug)]
pub struct EepromDevice {
	address: u8,
	capacity_bits: u32,
	max_register: u32,
	settle_delay: Duration,
	presence_policy: PresencePolicy,
	present: bool,
	// chip address and time of the last successful write
	last_write: Option<(u8, Instant)>,
}

impl EepromDevice {
	/// Checks the declaration and probes register 0; a failed probe only
	/// clears `is_present()`.
	pub fn new<T: Transport>(bus: &mut BusHandle<T>, config: DeviceConfig) -> Result<Self, OperationError> {
		config.check()?;
		if !EEPROM_ADDRESS_RANGE.contains(&config.address) {
			warn!("EEPROM address 0x{:02x} outside of the usual 0x50 - 0x57 block", config.address);
		}

		let mut device = EepromDevice {
			address: config.address,
			capacity_bits: config.capacity_bits,
			max_register: config.capacity_bits / 8 - 1,
			settle_delay: config.settle_delay,
			presence_policy: config.presence_policy,
			present: false,
			last_write: None,
		};
		device.reprobe(bus)?;
		Ok(device)
	}

	pub fn address(&self) -> u8 {
		self.address
	}

	pub fn capacity_bits(&self) -> u32 {
		self.capacity_bits
	}

	/// highest addressable byte offset
	pub fn max_register(&self) -> u32 {
		self.max_register
	}

	pub fn settle_delay(&self) -> Duration {
		self.settle_delay
	}

	pub fn presence_policy(&self) -> PresencePolicy {
		self.presence_policy
	}

	pub fn is_present(&self) -> bool {
		self.present
	}

	/// read register 0 and update `is_present()`
	pub fn reprobe<T: Transport>(&mut self, bus: &mut BusHandle<T>) -> Result<bool, BusError> {
		let address = self.address;
		let outcome = self.transfer_read(bus, 0, address)?;
		self.present = match outcome.error {
			None => {
				debug!("EEPROM 0x{:02x}: present on I2C bus {}", address, bus.index());
				true
			},
			Some(e) => {
				error!("EEPROM 0x{:02x}: presence probe failed: {}", address, e);
				false
			},
		};
		Ok(self.present)
	}

	pub fn validate(&self, register: u32, data: u32) -> Result<(), ValidationError> {
		validate::validate(self.max_register, register, data)
	}

	fn check_presence(&self) -> Result<(), OperationError> {
		if PresencePolicy::Strict == self.presence_policy && !self.present {
			return Err(OperationError::Absent { address: self.address });
		}
		Ok(())
	}

	// the chip NACKs everything during its write cycle; other chips on the
	// bus aren't affected
	fn wait_write_cycle(&self, address: u8) {
		if let Some((written_address, last_write)) = self.last_write {
			if written_address != address {
				return;
			}
			let elapsed = last_write.elapsed();
			if elapsed < self.settle_delay {
				let remaining = self.settle_delay - elapsed;
				trace!("EEPROM 0x{:02x}: waiting {:?} for write cycle", address, remaining);
				reliable_sleep(remaining);
			}
		}
	}

	fn transfer_read<T: Transport>(&mut self, bus: &mut BusHandle<T>, register: u32, address: u8) -> Result<Outcome<u8>, BusError> {
		let reg = split_register(register);
		let mut buf = [0u8];

		self.wait_write_cycle(address);
		let result = {
			let mut guard = bus.lock()?;
			let mut messages = [Message::Write(&reg), Message::Read(&mut buf)];
			guard.transfer(address, &mut messages)
		};

		let value = buf[0];
		trace!("EEPROM 0x{:02x}: register 0x{:03x} -> 0x{:02x}", address, register, value);
		Ok(Outcome {
			value,
			error: result.err(),
		})
	}

	fn transfer_write<T: Transport>(&mut self, bus: &mut BusHandle<T>, register: u32, data: u8, address: u8) -> Result<Outcome<[u8; 3]>, BusError> {
		let reg = split_register(register);
		let payload = [reg[0], reg[1], data];
		debug!("EEPROM 0x{:02x}: reg: {:?}, data: 0x{:02x}, payload: {:?}", address, reg, data, payload);

		self.wait_write_cycle(address);
		let result = {
			let mut guard = bus.lock()?;
			let mut messages = [Message::Write(&payload)];
			guard.transfer(address, &mut messages)
		};
		if result.is_ok() {
			self.last_write = Some((address, Instant::now()));
		}

		Ok(Outcome {
			value: payload,
			error: result.err(),
		})
	}

	pub fn read_byte<T: Transport>(&mut self, bus: &mut BusHandle<T>, register: u32) -> Result<Outcome<u8>, OperationError> {
		let address = self.address;
		self.read_byte_at(bus, register, address)
	}

	/// like `read_byte`, but addressed to another chip of the same size
	pub fn read_byte_at<T: Transport>(&mut self, bus: &mut BusHandle<T>, register: u32, address: u8) -> Result<Outcome<u8>, OperationError> {
		self.validate(register, 0)?;
		self.check_presence()?;
		Ok(self.transfer_read(bus, register, address)?)
	}

	/// returns the payload `[hi, lo, data]` for retrying
	pub fn write_byte<T: Transport>(&mut self, bus: &mut BusHandle<T>, register: u32, data: u32) -> Result<Outcome<[u8; 3]>, OperationError> {
		let address = self.address;
		self.write_byte_at(bus, register, data, address)
	}

	pub fn write_byte_at<T: Transport>(&mut self, bus: &mut BusHandle<T>, register: u32, data: u32, address: u8) -> Result<Outcome<[u8; 3]>, OperationError> {
		self.validate(register, data)?;
		self.check_presence()?;
		Ok(self.transfer_write(bus, register, data as u8, address)?)
	}

	/// Write, pause for at least `delay` (default: the settle delay) and read
	/// the register back.
	pub fn verify_write<T: Transport>(&mut self, bus: &mut BusHandle<T>, register: u32, data: u32, delay: Option<Duration>) -> Result<Verification, OperationError> {
		let delay = delay.unwrap_or(self.settle_delay);

		let write = self.write_byte(bus, register, data)?;
		reliable_sleep(delay);
		let read = self.read_byte(bus, register)?;

		let verification = Verification {
			register,
			written: data as u8,
			read_back: read.value,
			write_error: write.error,
			read_error: read.error,
		};
		if !verification.is_verified() {
			error!("EEPROM 0x{:02x}: verify failed: {}", self.address, verification);
		}
		Ok(verification)
	}

	pub fn write_then_verify<T: Transport>(&mut self, bus: &mut BusHandle<T>, register: u32, data: u32, delay: Option<Duration>) -> Result<bool, OperationError> {
		Ok(self.verify_write(bus, register, data, delay)?.is_verified())
	}

	/// Read `len` registers one by one, stopping at the first failed transfer
	/// (`value` then holds the bytes read so far).
	pub fn read_range<T: Transport>(&mut self, bus: &mut BusHandle<T>, start: u32, len: u32) -> Result<Outcome<Vec<u8>>, OperationError> {
		self.validate(start, 0)?;
		if 0 == len {
			return Ok(Outcome {
				value: Vec::new(),
				error: None,
			});
		}
		let last = start.saturating_add(len - 1);
		self.validate(last, 0)?;
		self.check_presence()?;

		let address = self.address;
		let mut value = Vec::with_capacity(len as usize);
		for register in start..=last {
			let outcome = self.transfer_read(bus, register, address)?;
			if let Some(e) = outcome.error {
				return Ok(Outcome {
					value,
					error: Some(e),
				});
			}
			value.push(outcome.value);
		}

		Ok(Outcome {
			value,
			error: None,
		})
	}
}
