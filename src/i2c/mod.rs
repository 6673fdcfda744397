//! I2C bus access
//!
//! The core only needs a single primitive from the underlying transport: run a
//! sequence of write and read messages against one 7-bit address as a single
//! combined transaction (repeated start between messages, one stop at the
//! end). Everything else (discovery, EEPROM addressing) is built on top of
//! `Transport::transfer`.

use std::io;

mod bus;
mod error;
mod linux;
#[cfg(test)]
pub(crate) mod sim;

pub use self::bus::{
	BusGuard,
	BusHandle,
	EEPROM_ADDRESS_RANGE,
	Scan,
};

pub use self::error::{
	BusError,
	TransferError,
};

pub use self::linux::LinuxI2c;

/// Highest valid 7-bit address
pub const MAX_ADDRESS: u8 = 0x7f;

/// A single message of a combined transfer
#[derive(PartialEq, Eq, Debug)]
pub enum Message<'a> {
	Write(&'a [u8]),
	Read(&'a mut [u8]),
}

impl<'a> Message<'a> {
	pub fn is_read(&self) -> bool {
		match self {
			Message::Write(_) => false,
			Message::Read(_) => true,
		}
	}

	pub fn len(&self) -> usize {
		match self {
			Message::Write(data) => data.len(),
			Message::Read(buf) => buf.len(),
		}
	}
}

pub trait Transport {
	/// run all messages as one transaction addressed to `address`
	///
	/// a missing ACK is reported as error like any other failure.
	fn transfer(&mut self, address: u8, messages: &mut [Message]) -> io::Result<()>;

	// exclusive access across owners of the same adapter; held for the
	// lifetime of a `BusGuard`
	fn acquire(&mut self) -> io::Result<()> {
		Ok(())
	}

	fn release(&mut self) -> io::Result<()> {
		Ok(())
	}
}

/// Transports that can be (re)opened from a bus index alone
pub trait OpenTransport: Transport + Sized {
	fn open_index(index: usize) -> io::Result<Self>;
}

impl<'a, T: ?Sized + Transport> Transport for &'a mut T {
	fn transfer(&mut self, address: u8, messages: &mut [Message]) -> io::Result<()> {
		T::transfer(*self, address, messages)
	}

	fn acquire(&mut self) -> io::Result<()> {
		T::acquire(*self)
	}

	fn release(&mut self) -> io::Result<()> {
		T::release(*self)
	}
}
