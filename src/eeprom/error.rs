use failure::Fail;

use crate::i2c::BusError;

use super::ValidationError;

/// Device declaration that can't describe a 2-byte addressed EEPROM
#[derive(Clone, PartialEq, Eq, Debug, Fail)]
pub enum ConfigError {
	#[fail(display = "address 0x{:02x} is not a 7-bit I2C address", address)]
	Address {
		address: u8,
	},
	#[fail(display = "capacity of {} bits is not a positive multiple of 8 bits up to {} bits", capacity_bits, max_capacity_bits)]
	Capacity {
		capacity_bits: u32,
		max_capacity_bits: u32,
	},
}

/// Hard errors of EEPROM operations; transport failures are reported in the
/// operation outcome instead.
#[derive(Debug, Fail)]
pub enum OperationError {
	#[fail(display = "{}", _0)]
	Config(ConfigError),
	#[fail(display = "{}", _0)]
	Validation(ValidationError),
	#[fail(display = "{}", _0)]
	Bus(BusError),
	#[fail(display = "EEPROM at 0x{:02x} failed the presence probe (reprobe before use)", address)]
	Absent {
		address: u8,
	},
}

impl From<ConfigError> for OperationError {
	fn from(e: ConfigError) -> Self {
		OperationError::Config(e)
	}
}

impl From<ValidationError> for OperationError {
	fn from(e: ValidationError) -> Self {
		OperationError::Validation(e)
	}
}

impl From<BusError> for OperationError {
	fn from(e: BusError) -> Self {
		OperationError::Bus(e)
	}
}
